//! Feature contract shared by the trainer and the recommendation engine.
//!
//! Both sides build a [`FeatureContext`] and hand it to [`FeatureSchema::vectorize`], so
//! field order and scaling live in exactly one place. The schema fingerprint is stamped
//! into persisted artifacts and checked on load.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::domain::order::SimulatedOrder;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

pub const HOUR_SCALE: f64 = 23.0;
pub const INVENTORY_SCALE: f64 = 100.0;
/// Reference order total; larger orders saturate at 1.0.
pub const PRICE_SCALE: f64 = 1250.0;
pub const DURATION_SCALE: f64 = 45.0;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "hour",
    "day_of_week",
    "is_weekend",
    "is_lunch_peak",
    "is_dinner_peak",
    "is_month_end",
    "is_holiday_season",
    "inventory_level",
    "num_items",
    "total_price",
    "order_duration",
];

pub const FEATURE_COUNT: usize = 11;

pub fn is_lunch_peak_hour(hour: u32) -> bool {
    (12..=14).contains(&hour)
}

pub fn is_dinner_peak_hour(hour: u32) -> bool {
    (19..=22).contains(&hour)
}

pub fn is_peak_hour(hour: u32) -> bool {
    is_lunch_peak_hour(hour) || is_dinner_peak_hour(hour)
}

/// Calendar and service-window flags derived from a local timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSignals {
    pub hour: u32,
    /// Monday = 0.
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub is_lunch_peak: bool,
    pub is_dinner_peak: bool,
    pub is_month_end: bool,
    pub is_holiday_season: bool,
}

impl CalendarSignals {
    pub fn from_datetime(timestamp: NaiveDateTime) -> Self {
        let hour = timestamp.hour();
        Self { hour, ..Self::for_day(timestamp.date(), hour) }
    }

    pub fn for_day(date: NaiveDate, hour: u32) -> Self {
        let day_of_week = date.weekday().num_days_from_monday();
        Self {
            hour,
            day_of_week,
            is_weekend: day_of_week >= 5,
            is_lunch_peak: is_lunch_peak_hour(hour),
            is_dinner_peak: is_dinner_peak_hour(hour),
            is_month_end: date.day() >= 25,
            is_holiday_season: matches!(date.month(), 11 | 12),
        }
    }

    pub fn is_peak(&self) -> bool {
        self.is_lunch_peak || self.is_dinner_peak
    }
}

/// Raw, unscaled inputs for one feature vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureContext {
    pub calendar: CalendarSignals,
    pub inventory_level: f64,
    pub num_items: u32,
    pub total_price: f64,
    pub order_duration_minutes: f64,
}

impl FeatureContext {
    pub fn from_order(order: &SimulatedOrder) -> Self {
        Self {
            calendar: CalendarSignals::from_datetime(order.timestamp),
            inventory_level: f64::from(order.inventory_level),
            num_items: order.num_items,
            total_price: decimal_to_f64(order.total_price),
            order_duration_minutes: f64::from(order.order_duration_minutes),
        }
    }
}

fn decimal_to_f64(value: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Versioned description of the vector layout and its normalization constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub names: Vec<String>,
    pub hour_scale: f64,
    pub inventory_scale: f64,
    pub price_scale: f64,
    pub duration_scale: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaStamp {
    pub version: u32,
    pub fingerprint: String,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::current()
    }
}

impl FeatureSchema {
    pub fn current() -> Self {
        Self {
            version: FEATURE_SCHEMA_VERSION,
            names: FEATURE_NAMES.iter().map(|name| (*name).to_string()).collect(),
            hour_scale: HOUR_SCALE,
            inventory_scale: INVENTORY_SCALE,
            price_scale: PRICE_SCALE,
            duration_scale: DURATION_SCALE,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn vectorize(&self, context: &FeatureContext) -> FeatureVector {
        let calendar = &context.calendar;
        FeatureVector(vec![
            f64::from(calendar.hour) / self.hour_scale,
            f64::from(calendar.day_of_week),
            flag(calendar.is_weekend),
            flag(calendar.is_lunch_peak),
            flag(calendar.is_dinner_peak),
            flag(calendar.is_month_end),
            flag(calendar.is_holiday_season),
            context.inventory_level / self.inventory_scale,
            f64::from(context.num_items),
            (context.total_price / self.price_scale).clamp(0.0, 1.0),
            context.order_duration_minutes / self.duration_scale,
        ])
    }

    pub fn vectorize_order(&self, order: &SimulatedOrder) -> FeatureVector {
        self.vectorize(&FeatureContext::from_order(order))
    }

    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.version.to_le_bytes());
        for name in &self.names {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
        }
        for scale in [self.hour_scale, self.inventory_scale, self.price_scale, self.duration_scale]
        {
            hasher.update(&scale.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn stamp(&self) -> SchemaStamp {
        SchemaStamp { version: self.version, fingerprint: self.fingerprint() }
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}
