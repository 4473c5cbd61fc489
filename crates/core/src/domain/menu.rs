use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

const POPULARITY_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MenuItemId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuCategory {
    Appetizer,
    Main,
    Side,
    Dessert,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub name: String,
    pub price: Decimal,
    pub category: MenuCategory,
    /// Probability of the item being picked into a simulated order.
    pub popularity: f64,
    pub perishable: bool,
}

/// Immutable menu used by the simulator.
#[derive(Clone, Debug, PartialEq)]
pub struct MenuCatalog {
    items: Vec<MenuItem>,
}

impl MenuCatalog {
    pub fn new(items: Vec<MenuItem>) -> Result<Self, DomainError> {
        if items.is_empty() {
            return Err(DomainError::InvariantViolation(
                "menu catalog must contain at least one item".to_string(),
            ));
        }

        if let Some(item) = items.iter().find(|item| !(item.popularity > 0.0)) {
            return Err(DomainError::InvariantViolation(format!(
                "menu item `{}` must have a positive popularity weight",
                item.id.0
            )));
        }

        let total: f64 = items.iter().map(|item| item.popularity).sum();
        if total > 1.0 + POPULARITY_TOLERANCE {
            return Err(DomainError::InvariantViolation(format!(
                "menu popularity weights sum to {total:.4}, which exceeds 1.0"
            )));
        }

        Ok(Self { items })
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find(&self, id: &MenuItemId) -> Option<&MenuItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Highest possible order total when every item is picked once.
    pub fn max_order_total(&self) -> Decimal {
        self.items.iter().map(|item| item.price).sum()
    }
}

struct ItemSeed {
    id: &'static str,
    name: &'static str,
    price: i64,
    category: MenuCategory,
    popularity: f64,
    perishable: bool,
}

const DEFAULT_MENU: &[ItemSeed] = &[
    ItemSeed {
        id: "item_001",
        name: "Paneer Tikka",
        price: 280,
        category: MenuCategory::Appetizer,
        popularity: 0.15,
        perishable: true,
    },
    ItemSeed {
        id: "item_002",
        name: "Chicken Wings",
        price: 320,
        category: MenuCategory::Appetizer,
        popularity: 0.12,
        perishable: true,
    },
    ItemSeed {
        id: "item_003",
        name: "Dal Makhani",
        price: 250,
        category: MenuCategory::Main,
        popularity: 0.18,
        perishable: false,
    },
    ItemSeed {
        id: "item_004",
        name: "Butter Chicken",
        price: 380,
        category: MenuCategory::Main,
        popularity: 0.20,
        perishable: true,
    },
    ItemSeed {
        id: "item_005",
        name: "Garlic Naan",
        price: 50,
        category: MenuCategory::Side,
        popularity: 0.25,
        perishable: false,
    },
    ItemSeed {
        id: "item_006",
        name: "Gulab Jamun",
        price: 120,
        category: MenuCategory::Dessert,
        popularity: 0.10,
        perishable: false,
    },
];

impl Default for MenuCatalog {
    fn default() -> Self {
        let items = DEFAULT_MENU
            .iter()
            .map(|seed| MenuItem {
                id: MenuItemId(seed.id.to_owned()),
                name: seed.name.to_owned(),
                price: Decimal::from(seed.price),
                category: seed.category,
                popularity: seed.popularity,
                perishable: seed.perishable,
            })
            .collect();
        Self { items }
    }
}
