use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Raw discount percentages that the ordering policy is allowed to apply.
pub const DISCOUNT_LEVELS: [u8; 6] = [0, 5, 10, 15, 20, 25];

/// Ordinal discount band predicted by the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountClass {
    None,
    Small,
    Medium,
    Large,
}

impl DiscountClass {
    pub const COUNT: usize = 4;
    pub const ALL: [Self; Self::COUNT] = [Self::None, Self::Small, Self::Medium, Self::Large];

    /// Label step function applied to raw discounts: 0, (0, 10], 15, everything above.
    pub fn from_discount(discount_pct: u8) -> Self {
        match discount_pct {
            0 => Self::None,
            1..=10 => Self::Small,
            15 => Self::Medium,
            _ => Self::Large,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::None => 0,
            Self::Small => 1,
            Self::Medium => 2,
            Self::Large => 3,
        }
    }

    pub fn from_index(index: usize) -> Result<Self, DomainError> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            DomainError::InvariantViolation(format!("discount class index {index} is out of range"))
        })
    }

    /// Percentage surfaced to callers for the band.
    pub fn representative_pct(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Small => 7,
            Self::Medium => 15,
            Self::Large => 22,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "No Discount",
            Self::Small => "Small (5-10%)",
            Self::Medium => "Medium (15%)",
            Self::Large => "Large (20-25%)",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

pub fn is_allowed_discount(discount_pct: u8) -> bool {
    DISCOUNT_LEVELS.contains(&discount_pct)
}

#[cfg(test)]
mod tests {
    use super::{is_allowed_discount, DiscountClass, DISCOUNT_LEVELS};

    #[test]
    fn label_step_function_matches_bands() {
        assert_eq!(DiscountClass::from_discount(0), DiscountClass::None);
        assert_eq!(DiscountClass::from_discount(5), DiscountClass::Small);
        assert_eq!(DiscountClass::from_discount(10), DiscountClass::Small);
        assert_eq!(DiscountClass::from_discount(15), DiscountClass::Medium);
        assert_eq!(DiscountClass::from_discount(20), DiscountClass::Large);
        assert_eq!(DiscountClass::from_discount(25), DiscountClass::Large);
    }

    #[test]
    fn label_step_function_is_monotonic_over_allowed_levels() {
        let classes: Vec<_> =
            DISCOUNT_LEVELS.iter().map(|level| DiscountClass::from_discount(*level)).collect();

        assert!(classes.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(classes.windows(2).all(|pair| pair[0].index() <= pair[1].index()));
    }

    #[test]
    fn representatives_fall_back_into_their_own_band() {
        for class in DiscountClass::ALL {
            let representative = class.representative_pct();
            if class == DiscountClass::Small || class == DiscountClass::Large {
                // Band midpoints are not policy levels themselves.
                assert!(!is_allowed_discount(representative));
            }
            assert_eq!(DiscountClass::from_discount(representative), class);
        }
    }

    #[test]
    fn index_round_trips_and_rejects_out_of_range() {
        for class in DiscountClass::ALL {
            assert_eq!(DiscountClass::from_index(class.index()).expect("in range"), class);
        }
        assert!(DiscountClass::from_index(4).is_err());
    }
}
