use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::discount::DiscountClass;
use crate::errors::DomainError;

pub const DEFAULT_AVG_SALES_7_DAYS: f64 = 100.0;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Inventory entry as received at the transport boundary. Every field is optional so
/// one bad entry can be rejected on its own instead of failing the whole request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryItemInput {
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub stock_percentage: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub num_items: Option<u32>,
    /// Set when the wire entry could not be decoded; such entries never validate.
    #[serde(skip)]
    pub decode_error: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InventoryItem {
    pub item_id: String,
    pub stock_percentage: f64,
    pub price: f64,
    pub num_items: Option<u32>,
}

impl InventoryItemInput {
    /// Decodes one wire entry, keeping a type error on the entry instead of failing the
    /// whole request.
    pub fn from_wire(value: Value) -> Self {
        let item_id = value.get("item_id").and_then(Value::as_str).map(str::to_owned);
        match serde_json::from_value::<Self>(value) {
            Ok(input) => input,
            Err(error) => Self {
                item_id,
                decode_error: Some(format!("entry could not be decoded: {error}")),
                ..Self::default()
            },
        }
    }

    pub fn validate(&self) -> Result<InventoryItem, DomainError> {
        if let Some(reason) = &self.decode_error {
            return Err(malformed(self.item_id.as_deref().unwrap_or("<missing>"), reason));
        }

        let item_id = self
            .item_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| malformed("<missing>", "item_id is required"))?;

        let stock_percentage =
            self.stock_percentage.ok_or_else(|| malformed(item_id, "stock_percentage is required"))?;
        if !(0.0..=100.0).contains(&stock_percentage) {
            return Err(malformed(item_id, "stock_percentage must be within 0..=100"));
        }

        let price = self.price.ok_or_else(|| malformed(item_id, "price is required"))?;
        if !price.is_finite() || price < 0.0 {
            return Err(malformed(item_id, "price must be a non-negative number"));
        }

        if self.num_items == Some(0) {
            return Err(malformed(item_id, "num_items must be greater than zero"));
        }

        Ok(InventoryItem {
            item_id: item_id.to_string(),
            stock_percentage,
            price,
            num_items: self.num_items,
        })
    }
}

fn malformed(item_id: &str, reason: &str) -> DomainError {
    DomainError::MalformedItemContext { item_id: item_id.to_string(), reason: reason.to_string() }
}

/// Live context for one prediction request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionContext {
    pub tenant_id: TenantId,
    pub current_time: DateTime<FixedOffset>,
    #[serde(default = "default_avg_sales")]
    pub avg_sales_7_days: f64,
    #[serde(default, deserialize_with = "lenient_inventory")]
    pub inventory: Vec<InventoryItemInput>,
}

fn default_avg_sales() -> f64 {
    DEFAULT_AVG_SALES_7_DAYS
}

fn lenient_inventory<'de, D>(deserializer: D) -> Result<Vec<InventoryItemInput>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<Value>::deserialize(deserializer)?;
    Ok(entries.into_iter().map(InventoryItemInput::from_wire).collect())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscountRecommendation {
    pub item_id: String,
    pub discount_percentage: u8,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub item_id: String,
    pub reason: String,
}

/// Engine output for one request: gated recommendations plus anything that was dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationBatch {
    pub tenant_id: TenantId,
    pub recommendations: Vec<DiscountRecommendation>,
    pub skipped: Vec<SkippedItem>,
    pub suppressed: usize,
    pub model_version: u64,
    pub generated_at: DateTime<Utc>,
}

/// Per-item decision before the confidence gate is applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemDecision {
    pub item_id: String,
    pub class: DiscountClass,
    pub probabilities: [f64; DiscountClass::COUNT],
    pub confidence: f64,
    pub is_peak: bool,
    pub reason: String,
}

impl ItemDecision {
    pub fn discount_percentage(&self) -> u8 {
        self.class.representative_pct()
    }

    pub fn into_recommendation(self) -> DiscountRecommendation {
        DiscountRecommendation {
            discount_percentage: self.discount_percentage(),
            item_id: self.item_id,
            confidence: self.confidence,
            reason: self.reason,
        }
    }
}
