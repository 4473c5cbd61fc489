//! Offline training pipeline: corpus -> feature matrix -> stratified split -> fit ->
//! held-out evaluation -> persisted artifacts.

use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::domain::discount::DiscountClass;
use crate::domain::order::SimulatedOrder;
use crate::features::FeatureSchema;
use crate::ml::metrics::{evaluate, ClassificationReport, QualityTier};
use crate::ml::split::stratified_split;
use crate::ml::{
    BoostingParams, ClassifierError, DiscountClassifier, GradientBoostedClassifier, ModelMetadata,
    TrainedModel,
};

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum TrainingError {
    #[error("training corpus is empty")]
    EmptyCorpus,
    #[error("training corpus row {index} is invalid: {reason}")]
    InvalidOrder { index: usize, reason: String },
    #[error("training corpus contains only {present} discount class(es); at least two are required")]
    DegenerateClasses { present: usize },
    #[error("discount class `{class}` has {count} sample(s); at least two are required for a stratified split")]
    InsufficientClassSamples { class: &'static str, count: usize },
    #[error("invalid training settings: {0}")]
    InvalidSettings(String),
    #[error("training was cancelled")]
    Cancelled,
    #[error("classifier fit failed: {0}")]
    Fit(#[from] ClassifierError),
    #[error("persisting trained model failed: {0}")]
    ArtifactStore(#[from] ArtifactError),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainerSettings {
    pub test_fraction: f64,
    pub params: BoostingParams,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self { test_fraction: DEFAULT_TEST_FRACTION, params: BoostingParams::default() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassCount {
    pub class: DiscountClass,
    pub label: String,
    pub count: usize,
    pub share: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub total_orders: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub class_distribution: Vec<ClassCount>,
    pub evaluation: ClassificationReport,
    /// Sorted by descending importance.
    pub feature_importances: Vec<FeatureImportance>,
    pub duration_ms: u128,
}

impl TrainingReport {
    pub fn quality(&self) -> QualityTier {
        self.evaluation.quality
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    pub report: TrainingReport,
}

#[derive(Clone, Debug, Default)]
pub struct Trainer {
    settings: TrainerSettings,
    schema: FeatureSchema,
}

impl Trainer {
    pub fn new(settings: TrainerSettings) -> Self {
        Self { settings, schema: FeatureSchema::current() }
    }

    pub fn settings(&self) -> &TrainerSettings {
        &self.settings
    }

    pub fn train(&self, orders: &[SimulatedOrder]) -> Result<TrainingOutcome, TrainingError> {
        self.train_until(orders, &|| false)
    }

    /// Trains unless `should_stop` turns true first; it is polled between boosting rounds.
    pub fn train_until(
        &self,
        orders: &[SimulatedOrder],
        should_stop: &dyn Fn() -> bool,
    ) -> Result<TrainingOutcome, TrainingError> {
        let started = Instant::now();
        if orders.is_empty() {
            return Err(TrainingError::EmptyCorpus);
        }
        if !(self.settings.test_fraction > 0.0 && self.settings.test_fraction < 1.0) {
            return Err(TrainingError::InvalidSettings(
                "test_fraction must be strictly between 0 and 1".to_string(),
            ));
        }
        self.settings.params.validate()?;

        for (index, order) in orders.iter().enumerate() {
            order
                .validate()
                .map_err(|error| TrainingError::InvalidOrder { index, reason: error.to_string() })?;
        }

        let labels: Vec<DiscountClass> = orders.iter().map(SimulatedOrder::discount_class).collect();
        let class_distribution = class_distribution(&labels);
        let present = class_distribution.iter().filter(|entry| entry.count > 0).count();
        if present < 2 {
            return Err(TrainingError::DegenerateClasses { present });
        }

        info!(
            event_name = "training.started",
            correlation_id = "training",
            orders = orders.len(),
            classes_present = present,
            n_estimators = self.settings.params.n_estimators,
            "training discount classifier"
        );

        let split = stratified_split(&labels, self.settings.test_fraction, self.settings.params.seed)
            .map_err(|underpopulated| TrainingError::InsufficientClassSamples {
                class: underpopulated.class.as_str(),
                count: underpopulated.count,
            })?;

        let rows: Vec<Vec<f64>> =
            orders.iter().map(|order| self.schema.vectorize_order(order).0).collect();
        let train_rows: Vec<Vec<f64>> = split.train.iter().map(|idx| rows[*idx].clone()).collect();
        let train_labels: Vec<usize> = split.train.iter().map(|idx| labels[*idx].index()).collect();

        let classifier = GradientBoostedClassifier::fit_until(
            &train_rows,
            &train_labels,
            DiscountClass::COUNT,
            self.settings.params.clone(),
            should_stop,
        )
        .map_err(|error| match error {
            ClassifierError::Cancelled { completed_rounds } => {
                info!(
                    event_name = "training.cancelled",
                    correlation_id = "training",
                    completed_rounds,
                    "training stopped before completion"
                );
                TrainingError::Cancelled
            }
            other => TrainingError::Fit(other),
        })?;

        let mut actual = Vec::with_capacity(split.test.len());
        let mut predicted = Vec::with_capacity(split.test.len());
        for idx in &split.test {
            actual.push(labels[*idx]);
            predicted.push(DiscountClassifier::predict(&classifier, &rows[*idx])?);
        }
        let evaluation = evaluate(&actual, &predicted);
        let feature_importances = ranked_importances(&self.schema, &classifier);

        if evaluation.quality == QualityTier::Poor {
            warn!(
                event_name = "training.quality.poor",
                correlation_id = "training",
                accuracy = evaluation.accuracy,
                "held-out accuracy is below the acceptable tier"
            );
        }

        let report = TrainingReport {
            total_orders: orders.len(),
            train_size: split.train.len(),
            test_size: split.test.len(),
            class_distribution,
            feature_importances,
            duration_ms: started.elapsed().as_millis(),
            evaluation,
        };

        info!(
            event_name = "training.completed",
            correlation_id = "training",
            accuracy = report.evaluation.accuracy,
            macro_f1 = report.evaluation.macro_f1,
            quality = report.quality().as_str(),
            duration_ms = report.duration_ms as u64,
            "discount classifier trained"
        );

        let model = TrainedModel {
            classifier,
            schema: self.schema.clone(),
            metadata: ModelMetadata {
                model_id: Uuid::new_v4(),
                trained_at: Utc::now(),
                training_samples: split.train.len(),
                test_accuracy: report.evaluation.accuracy,
            },
        };

        Ok(TrainingOutcome { model, report })
    }

    /// Trains and writes both artifacts. Nothing is written when training fails.
    pub fn train_and_persist(
        &self,
        orders: &[SimulatedOrder],
        store: &ArtifactStore,
    ) -> Result<TrainingOutcome, TrainingError> {
        let outcome = self.train(orders)?;
        store.save(&outcome.model)?;
        info!(
            event_name = "training.artifacts.saved",
            correlation_id = "training",
            model_id = %outcome.model.metadata.model_id,
            classifier_path = %store.classifier_path().display(),
            "trained model persisted"
        );
        Ok(outcome)
    }
}

fn class_distribution(labels: &[DiscountClass]) -> Vec<ClassCount> {
    DiscountClass::ALL
        .iter()
        .map(|class| {
            let count = labels.iter().filter(|label| *label == class).count();
            ClassCount {
                class: *class,
                label: class.label().to_string(),
                count,
                share: if labels.is_empty() { 0.0 } else { count as f64 / labels.len() as f64 },
            }
        })
        .collect()
}

pub fn ranked_importances(
    schema: &FeatureSchema,
    classifier: &dyn DiscountClassifier,
) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = schema
        .names
        .iter()
        .zip(classifier.feature_importances())
        .map(|(name, importance)| FeatureImportance { feature: name.clone(), importance })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Trainer, TrainerSettings, TrainingError};
    use crate::artifacts::ArtifactStore;
    use crate::domain::menu::MenuCatalog;
    use crate::domain::order::SimulatedOrder;
    use crate::features::FEATURE_COUNT;
    use crate::ml::BoostingParams;
    use crate::simulator::PolicySimulator;

    fn fast_settings() -> TrainerSettings {
        TrainerSettings {
            params: BoostingParams {
                n_estimators: 40,
                max_depth: 4,
                learning_rate: 0.3,
                min_samples_leaf: 20,
                ..BoostingParams::default()
            },
            ..TrainerSettings::default()
        }
    }

    fn corpus(days: u32) -> Vec<SimulatedOrder> {
        let anchor = NaiveDate::from_ymd_opt(2026, 4, 1).expect("date");
        PolicySimulator::new(MenuCatalog::default(), Some(42))
            .expect("simulator")
            .anchored_at(anchor)
            .simulate(days)
            .expect("window")
            .collect()
    }

    #[test]
    fn trains_on_simulated_corpus_with_reasonable_accuracy() {
        let orders = corpus(60);
        let outcome = Trainer::new(fast_settings()).train(&orders).expect("training succeeds");
        let report = &outcome.report;

        assert_eq!(report.total_orders, orders.len());
        assert_eq!(report.train_size + report.test_size, orders.len());
        assert_eq!(report.feature_importances.len(), FEATURE_COUNT);
        assert!(report
            .feature_importances
            .windows(2)
            .all(|pair| pair[0].importance >= pair[1].importance));
        assert!(report.evaluation.accuracy > 0.6, "accuracy {}", report.evaluation.accuracy);
        assert_eq!(outcome.model.metadata.training_samples, report.train_size);
    }

    #[test]
    fn empty_corpus_is_rejected() {
        assert_eq!(Trainer::default().train(&[]), Err(TrainingError::EmptyCorpus));
    }

    #[test]
    fn single_class_corpus_is_rejected() {
        let orders: Vec<SimulatedOrder> =
            corpus(5).into_iter().filter(|order| order.discount_applied == 0).collect();

        assert_eq!(
            Trainer::new(fast_settings()).train(&orders),
            Err(TrainingError::DegenerateClasses { present: 1 })
        );
    }

    #[test]
    fn invalid_rows_fail_loudly() {
        let mut orders = corpus(3);
        orders[1].discount_applied = 12;

        assert!(matches!(
            Trainer::new(fast_settings()).train(&orders),
            Err(TrainingError::InvalidOrder { index: 1, .. })
        ));
    }

    #[test]
    fn failed_training_leaves_no_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(
            dir.path().join("classifier.json"),
            dir.path().join("feature_names.json"),
        );

        let result = Trainer::default().train_and_persist(&[], &store);

        assert!(result.is_err());
        assert!(!store.exists());
    }

    #[test]
    fn successful_training_persists_loadable_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(
            dir.path().join("models/classifier.json"),
            dir.path().join("models/feature_names.json"),
        );

        let outcome = Trainer::new(fast_settings())
            .train_and_persist(&corpus(20), &store)
            .expect("training succeeds");
        let loaded = store.load().expect("artifacts load");

        assert_eq!(loaded, outcome.model);
    }

    #[test]
    fn stop_signal_cancels_between_rounds() {
        let orders = corpus(20);
        let polls = std::cell::Cell::new(0_usize);
        let result = Trainer::new(fast_settings()).train_until(&orders, &|| {
            polls.set(polls.get() + 1);
            polls.get() > 3
        });

        assert_eq!(result, Err(TrainingError::Cancelled));
        assert_eq!(polls.get(), 4);
    }
}
