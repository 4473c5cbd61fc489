//! Discount-class model
//!
//! A deterministic multi-class gradient boosted tree model over the shared feature
//! vector. Training is reproducible for a fixed seed and the fitted model serializes
//! to JSON without loss.

pub mod gbdt;
pub mod metrics;
pub mod split;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::discount::DiscountClass;
use crate::features::FeatureSchema;

pub use gbdt::{BoostingParams, GradientBoostedClassifier};
pub use metrics::{ClassMetrics, ClassificationReport, QualityTier};

pub const MODEL_FAMILY: &str = "gradient_boosted_trees";

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ClassifierError {
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("{rows} feature rows but {labels} labels")]
    LabelCountMismatch { rows: usize, labels: usize },
    #[error("label {label} is outside 0..{num_classes}")]
    LabelOutOfRange { label: usize, num_classes: usize },
    #[error("expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("feature {index} is not a finite number")]
    NonFiniteFeature { index: usize },
    #[error("classifier produced {actual} class scores, expected {expected}")]
    ClassCountMismatch { expected: usize, actual: usize },
    #[error("invalid hyperparameters: {0}")]
    InvalidParams(String),
    #[error("fit cancelled after {completed_rounds} boosting round(s)")]
    Cancelled { completed_rounds: usize },
}

/// Probability model over the four discount classes.
pub trait DiscountClassifier: Send + Sync {
    fn family(&self) -> &'static str;

    fn predict_proba(
        &self,
        features: &[f64],
    ) -> Result<[f64; DiscountClass::COUNT], ClassifierError>;

    /// Highest-probability class; ties resolve to the lower class index.
    fn predict(&self, features: &[f64]) -> Result<DiscountClass, ClassifierError> {
        let probabilities = self.predict_proba(features)?;
        Ok(DiscountClass::ALL[argmax(&probabilities)])
    }

    fn hyperparameters(&self) -> serde_json::Value;

    fn feature_importances(&self) -> Vec<f64>;
}

impl DiscountClassifier for GradientBoostedClassifier {
    fn family(&self) -> &'static str {
        MODEL_FAMILY
    }

    fn predict_proba(
        &self,
        features: &[f64],
    ) -> Result<[f64; DiscountClass::COUNT], ClassifierError> {
        let probabilities = GradientBoostedClassifier::predict_proba(self, features)?;
        <[f64; DiscountClass::COUNT]>::try_from(probabilities.as_slice()).map_err(|_| {
            ClassifierError::ClassCountMismatch {
                expected: DiscountClass::COUNT,
                actual: probabilities.len(),
            }
        })
    }

    fn hyperparameters(&self) -> serde_json::Value {
        serde_json::to_value(self.params()).unwrap_or(serde_json::Value::Null)
    }

    fn feature_importances(&self) -> Vec<f64> {
        GradientBoostedClassifier::feature_importances(self)
    }
}

/// Index of the largest value, lowest index on ties.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (idx, value) in values.iter().enumerate().skip(1) {
        if *value > values[best] {
            best = idx;
        }
    }
    best
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Shared by the classifier and feature-name artifacts of one training run.
    pub model_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    pub test_accuracy: f64,
}

/// A fitted classifier together with the schema it was trained against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub classifier: GradientBoostedClassifier,
    pub schema: FeatureSchema,
    pub metadata: ModelMetadata,
}

#[cfg(test)]
mod tests {
    use super::{argmax, DiscountClassifier, ClassifierError};
    use crate::domain::discount::DiscountClass;

    struct Fixed([f64; DiscountClass::COUNT]);

    impl DiscountClassifier for Fixed {
        fn family(&self) -> &'static str {
            "fixed"
        }

        fn predict_proba(
            &self,
            _features: &[f64],
        ) -> Result<[f64; DiscountClass::COUNT], ClassifierError> {
            Ok(self.0)
        }

        fn hyperparameters(&self) -> serde_json::Value {
            serde_json::Value::Null
        }

        fn feature_importances(&self) -> Vec<f64> {
            Vec::new()
        }
    }

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), 1);
        assert_eq!(argmax(&[0.25, 0.25, 0.25, 0.25]), 0);
        assert_eq!(argmax(&[0.0, 0.0, 0.0, 1.0]), 3);
    }

    #[test]
    fn predict_maps_argmax_into_discount_class() {
        let classifier = Fixed([0.1, 0.2, 0.6, 0.1]);
        assert_eq!(classifier.predict(&[]).expect("fixed"), DiscountClass::Medium);
    }
}
