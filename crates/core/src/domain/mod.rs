pub mod discount;
pub mod menu;
pub mod order;
pub mod recommendation;
