use std::sync::Arc;

use chrono::Utc;
use menuwise_core::config::AppConfig;
use menuwise_core::domain::discount::DiscountClass;
use menuwise_core::features::FeatureSchema;
use menuwise_core::ml::{ClassifierError, DiscountClassifier, ModelMetadata};
use menuwise_core::model_slot::ModelSource;
use uuid::Uuid;

use crate::state::AppState;

/// Returns the same distribution for every input.
pub struct FixedClassifier(pub [f64; DiscountClass::COUNT]);

impl DiscountClassifier for FixedClassifier {
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

pub fn test_config(dir: &tempfile::TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.model.classifier_path = dir.path().join("discount_classifier.json");
    config.model.feature_names_path = dir.path().join("feature_names.json");
    config.server.retrain_wait_secs = 5;
    config
}

pub fn test_state(dir: &tempfile::TempDir) -> AppState {
    AppState::new(test_config(dir))
}

pub fn install_fixed(state: &AppState, probabilities: [f64; DiscountClass::COUNT]) {
    state.engine.slot().install(
        Arc::new(FixedClassifier(probabilities)),
        FeatureSchema::current(),
        ModelMetadata {
            model_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            training_samples: 0,
            test_accuracy: 0.0,
        },
        ModelSource::Provided,
    );
}
