use crate::domain::discount::DiscountClass;

const CLEARANCE_STOCK_BELOW: f64 = 50.0;
const CRITICAL_STOCK_BELOW: f64 = 30.0;

/// Human-readable justification for a predicted class.
pub fn reason_for(class: DiscountClass, is_peak: bool, stock_percentage: f64) -> &'static str {
    match class {
        DiscountClass::None if is_peak => "Peak demand period; no discount needed",
        DiscountClass::None => "Demand is healthy for current stock; no discount needed",
        DiscountClass::Small => "Off-peak hours with moderate inventory",
        DiscountClass::Medium if stock_percentage < CLEARANCE_STOCK_BELOW => {
            "Clearing stock during off-peak hours"
        }
        DiscountClass::Medium => "Off-peak incentive to lift demand",
        DiscountClass::Large if stock_percentage < CRITICAL_STOCK_BELOW => {
            "Critical inventory level; strong discount to clear stock"
        }
        DiscountClass::Large => "Strong off-peak opportunity",
    }
}
