//! Shared handle to the currently active model.
//!
//! Readers take an `Arc` snapshot and keep using it even if a new model is installed
//! mid-request; installs swap the pointer under a short write lock.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::features::FeatureSchema;
use crate::ml::{DiscountClassifier, ModelMetadata, TrainedModel};
use crate::training::{ranked_importances, FeatureImportance};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSource {
    Artifacts { classifier_path: String },
    Retrain { job_id: Uuid },
    Provided,
}

pub struct LoadedModel {
    pub classifier: Arc<dyn DiscountClassifier>,
    pub schema: FeatureSchema,
    pub metadata: ModelMetadata,
    pub source: ModelSource,
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
}

/// Serializable summary of the active model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelInfo {
    pub version: u64,
    pub model_id: Uuid,
    pub family: &'static str,
    pub trained_at: DateTime<Utc>,
    pub loaded_at: DateTime<Utc>,
    pub training_samples: usize,
    pub test_accuracy: f64,
    pub schema_version: u32,
    pub schema_fingerprint: String,
    pub feature_names: Vec<String>,
    pub feature_importances: Vec<FeatureImportance>,
    pub hyperparameters: serde_json::Value,
    pub source: ModelSource,
}

impl LoadedModel {
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            version: self.version,
            model_id: self.metadata.model_id,
            family: self.classifier.family(),
            trained_at: self.metadata.trained_at,
            loaded_at: self.loaded_at,
            training_samples: self.metadata.training_samples,
            test_accuracy: self.metadata.test_accuracy,
            schema_version: self.schema.version,
            schema_fingerprint: self.schema.fingerprint(),
            feature_names: self.schema.names.clone(),
            feature_importances: ranked_importances(&self.schema, self.classifier.as_ref()),
            hyperparameters: self.classifier.hyperparameters(),
            source: self.source.clone(),
        }
    }
}

#[derive(Default)]
struct SlotState {
    current: Option<Arc<LoadedModel>>,
    installs: u64,
}

#[derive(Clone, Default)]
pub struct ModelSlot {
    inner: Arc<RwLock<SlotState>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<LoadedModel>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).current.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    /// Number of successful installs; the active model carries the latest value.
    pub fn version(&self) -> u64 {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).installs
    }

    pub fn install_trained(&self, model: TrainedModel, source: ModelSource) -> Arc<LoadedModel> {
        self.install(Arc::new(model.classifier), model.schema, model.metadata, source)
    }

    pub fn install(
        &self,
        classifier: Arc<dyn DiscountClassifier>,
        schema: FeatureSchema,
        metadata: ModelMetadata,
        source: ModelSource,
    ) -> Arc<LoadedModel> {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.installs += 1;
        let loaded = Arc::new(LoadedModel {
            classifier,
            schema,
            metadata,
            source,
            version: state.installs,
            loaded_at: Utc::now(),
        });
        state.current = Some(Arc::clone(&loaded));
        loaded
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{ModelSlot, ModelSource};
    use crate::domain::discount::DiscountClass;
    use crate::features::FeatureSchema;
    use crate::ml::{ClassifierError, DiscountClassifier, ModelMetadata};

    struct Uniform;

    impl DiscountClassifier for Uniform {
        fn family(&self) -> &'static str {
            "uniform"
        }

        fn predict_proba(
            &self,
            _features: &[f64],
        ) -> Result<[f64; DiscountClass::COUNT], ClassifierError> {
            Ok([0.25; DiscountClass::COUNT])
        }

        fn hyperparameters(&self) -> serde_json::Value {
            serde_json::json!({})
        }

        fn feature_importances(&self) -> Vec<f64> {
            vec![0.0; FeatureSchema::current().len()]
        }
    }

    fn metadata() -> ModelMetadata {
        ModelMetadata {
            model_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            training_samples: 10,
            test_accuracy: 0.5,
        }
    }

    #[test]
    fn empty_slot_has_no_model() {
        let slot = ModelSlot::new();
        assert!(!slot.is_loaded());
        assert_eq!(slot.version(), 0);
    }

    #[test]
    fn snapshots_survive_a_swap() {
        let slot = ModelSlot::new();
        let first =
            slot.install(Arc::new(Uniform), FeatureSchema::current(), metadata(), ModelSource::Provided);
        let snapshot = slot.current().expect("loaded");

        let second =
            slot.install(Arc::new(Uniform), FeatureSchema::current(), metadata(), ModelSource::Provided);

        assert_eq!(snapshot.version, first.version);
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(slot.current().map(|model| model.version), Some(2));
        assert_ne!(snapshot.metadata.model_id, second.metadata.model_id);
    }

    #[test]
    fn clones_share_the_same_slot() {
        let slot = ModelSlot::new();
        let handle = slot.clone();
        handle.install(Arc::new(Uniform), FeatureSchema::current(), metadata(), ModelSource::Provided);

        let info = slot.current().expect("loaded").info();
        assert_eq!(info.family, "uniform");
        assert_eq!(info.feature_names.len(), FeatureSchema::current().len());
    }
}
