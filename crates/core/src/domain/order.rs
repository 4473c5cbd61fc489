use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::discount::{is_allowed_discount, DiscountClass};
use crate::domain::menu::MenuItemId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

/// Labelled historical order produced by the policy simulator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulatedOrder {
    pub order_id: OrderId,
    pub timestamp: NaiveDateTime,
    pub hour: u32,
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub is_lunch_peak: bool,
    pub is_dinner_peak: bool,
    pub is_month_end: bool,
    pub is_holiday_season: bool,
    pub inventory_level: u8,
    pub items: Vec<MenuItemId>,
    pub num_items: u32,
    pub total_price: Decimal,
    pub discount_applied: u8,
    pub final_price: Decimal,
    pub order_duration_minutes: u32,
}

impl SimulatedOrder {
    pub fn is_peak(&self) -> bool {
        self.is_lunch_peak || self.is_dinner_peak
    }

    pub fn discount_class(&self) -> DiscountClass {
        DiscountClass::from_discount(self.discount_applied)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !is_allowed_discount(self.discount_applied) {
            return Err(DomainError::InvariantViolation(format!(
                "order {} carries discount {} outside the policy levels",
                self.order_id.0, self.discount_applied
            )));
        }
        if self.final_price != final_price(self.total_price, self.discount_applied) {
            return Err(DomainError::InvariantViolation(format!(
                "order {} final price does not match its discount",
                self.order_id.0
            )));
        }
        if self.num_items as usize != self.items.len() {
            return Err(DomainError::InvariantViolation(format!(
                "order {} item count {} does not match {} item ids",
                self.order_id.0,
                self.num_items,
                self.items.len()
            )));
        }
        Ok(())
    }
}

pub fn final_price(total_price: Decimal, discount_pct: u8) -> Decimal {
    total_price * (Decimal::ONE - Decimal::from(discount_pct) / Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::final_price;

    #[test]
    fn final_price_applies_discount_exactly() {
        assert_eq!(final_price(Decimal::from(300), 15), Decimal::from(255));
        assert_eq!(final_price(Decimal::from(50), 0), Decimal::from(50));
        assert_eq!(final_price(Decimal::from(330), 25), Decimal::new(2475, 1));
    }
}
