use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::domain::discount::DiscountClass;
use crate::domain::recommendation::{
    InventoryItem, ItemDecision, PredictionContext, RecommendationBatch, SkippedItem,
};
use crate::features::{CalendarSignals, FeatureContext};
use crate::ml::{argmax, TrainedModel};
use crate::model_slot::{LoadedModel, ModelSlot, ModelSource};
use crate::recommendation::reasons::reason_for;
use crate::recommendation::{EngineState, RecommendationError};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.4;
pub const DEFAULT_NUM_ITEMS: u32 = 1;
pub const DEFAULT_ORDER_DURATION_MINUTES: u32 = 32;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationPolicy {
    /// Non-zero discounts are only surfaced above this confidence.
    pub confidence_threshold: f64,
    pub default_num_items: u32,
    pub default_order_duration_minutes: u32,
}

impl Default for RecommendationPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            default_num_items: DEFAULT_NUM_ITEMS,
            default_order_duration_minutes: DEFAULT_ORDER_DURATION_MINUTES,
        }
    }
}

/// Ungated per-item decisions for one request.
#[derive(Clone, Debug, PartialEq)]
pub struct Assessment {
    pub decisions: Vec<ItemDecision>,
    pub skipped: Vec<SkippedItem>,
    pub model_version: u64,
}

#[derive(Clone)]
pub struct RecommendationEngine {
    slot: ModelSlot,
    store: ArtifactStore,
    policy: RecommendationPolicy,
}

impl RecommendationEngine {
    pub fn new(store: ArtifactStore, policy: RecommendationPolicy) -> Self {
        Self::with_slot(ModelSlot::new(), store, policy)
    }

    pub fn with_slot(slot: ModelSlot, store: ArtifactStore, policy: RecommendationPolicy) -> Self {
        Self { slot, store, policy }
    }

    pub fn slot(&self) -> &ModelSlot {
        &self.slot
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn policy(&self) -> &RecommendationPolicy {
        &self.policy
    }

    pub fn state(&self) -> EngineState {
        match self.slot.current() {
            Some(model) => EngineState::Ready { model: Box::new(model.info()) },
            None => EngineState::NoModel,
        }
    }

    /// Re-reads the artifact pair. On failure the previously active model stays in place.
    pub fn reload(&self) -> Result<Arc<LoadedModel>, ArtifactError> {
        match self.store.load() {
            Ok(model) => {
                let source = ModelSource::Artifacts {
                    classifier_path: self.store.classifier_path().display().to_string(),
                };
                let loaded = self.install(model, source);
                info!(
                    event_name = "model.reload.succeeded",
                    correlation_id = "model",
                    model_version = loaded.version,
                    model_id = %loaded.metadata.model_id,
                    "model artifacts loaded"
                );
                Ok(loaded)
            }
            Err(error) => {
                warn!(
                    event_name = "model.reload.failed",
                    correlation_id = "model",
                    kept_version = self.slot.current().map(|model| model.version),
                    error = %error,
                    "model artifacts could not be loaded"
                );
                Err(error)
            }
        }
    }

    pub fn install(&self, model: TrainedModel, source: ModelSource) -> Arc<LoadedModel> {
        self.slot.install_trained(model, source)
    }

    pub fn assess(&self, context: &PredictionContext) -> Result<Assessment, RecommendationError> {
        let model = self.slot.current().ok_or(RecommendationError::ModelUnavailable)?;
        let calendar = CalendarSignals::from_datetime(context.current_time.naive_local());

        debug!(
            event_name = "recommendation.assess.start",
            correlation_id = %context.tenant_id.0,
            model_version = model.version,
            items = context.inventory.len(),
            avg_sales_7_days = context.avg_sales_7_days,
            hour = calendar.hour,
            "assessing inventory"
        );

        let mut decisions = Vec::with_capacity(context.inventory.len());
        let mut skipped = Vec::new();
        for input in &context.inventory {
            let item = match input.validate() {
                Ok(item) => item,
                Err(error) => {
                    let item_id = input.item_id.clone().unwrap_or_default();
                    warn!(
                        event_name = "recommendation.item.skipped",
                        correlation_id = %context.tenant_id.0,
                        item_id = %item_id,
                        error = %error,
                        "inventory entry rejected"
                    );
                    skipped.push(SkippedItem { item_id, reason: error.to_string() });
                    continue;
                }
            };

            match self.decide(&model, calendar, item) {
                Ok(decision) => decisions.push(decision),
                Err(skip) => {
                    warn!(
                        event_name = "recommendation.item.prediction_failed",
                        correlation_id = %context.tenant_id.0,
                        item_id = %skip.item_id,
                        error = %skip.reason,
                        "classifier rejected feature vector"
                    );
                    skipped.push(skip);
                }
            }
        }

        Ok(Assessment { decisions, skipped, model_version: model.version })
    }

    pub fn recommend(
        &self,
        context: &PredictionContext,
    ) -> Result<RecommendationBatch, RecommendationError> {
        let assessment = self.assess(context)?;
        let considered = assessment.decisions.len();

        let recommendations: Vec<_> = assessment
            .decisions
            .into_iter()
            .filter(|decision| self.passes_gate(decision))
            .map(ItemDecision::into_recommendation)
            .collect();
        let suppressed = considered - recommendations.len();

        info!(
            event_name = "recommendation.batch.completed",
            correlation_id = %context.tenant_id.0,
            model_version = assessment.model_version,
            recommended = recommendations.len(),
            suppressed,
            skipped = assessment.skipped.len(),
            "discount recommendations generated"
        );

        Ok(RecommendationBatch {
            tenant_id: context.tenant_id.clone(),
            recommendations,
            skipped: assessment.skipped,
            suppressed,
            model_version: assessment.model_version,
            generated_at: Utc::now(),
        })
    }

    fn passes_gate(&self, decision: &ItemDecision) -> bool {
        decision.class == DiscountClass::None
            || decision.confidence > self.policy.confidence_threshold
    }

    fn decide(
        &self,
        model: &LoadedModel,
        calendar: CalendarSignals,
        item: InventoryItem,
    ) -> Result<ItemDecision, SkippedItem> {
        let num_items = item.num_items.unwrap_or(self.policy.default_num_items);
        let features = model.schema.vectorize(&FeatureContext {
            calendar,
            inventory_level: item.stock_percentage,
            num_items,
            total_price: item.price * f64::from(num_items),
            order_duration_minutes: f64::from(self.policy.default_order_duration_minutes),
        });

        let probabilities = model
            .classifier
            .predict_proba(features.as_slice())
            .map_err(|error| SkippedItem { item_id: item.item_id.clone(), reason: error.to_string() })?;
        let class = DiscountClass::ALL[argmax(&probabilities)];
        let is_peak = calendar.is_peak();

        Ok(ItemDecision {
            reason: reason_for(class, is_peak, item.stock_percentage).to_string(),
            item_id: item.item_id,
            class,
            confidence: probabilities[class.index()],
            probabilities,
            is_peak,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use chrono::{DateTime, NaiveDate, Utc};
    use uuid::Uuid;

    use super::{RecommendationEngine, RecommendationPolicy};
    use crate::artifacts::ArtifactStore;
    use crate::domain::discount::DiscountClass;
    use crate::domain::menu::MenuCatalog;
    use crate::domain::recommendation::{InventoryItemInput, PredictionContext, TenantId};
    use crate::features::FeatureSchema;
    use crate::ml::{ClassifierError, DiscountClassifier, ModelMetadata};
    use crate::model_slot::ModelSource;
    use crate::recommendation::RecommendationError;
    use crate::simulator::PolicySimulator;
    use crate::training::{Trainer, TrainerSettings};

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

    fn engine_in(dir: &tempfile::TempDir) -> RecommendationEngine {
        RecommendationEngine::new(
            ArtifactStore::new(dir.path().join("classifier.json"), dir.path().join("names.json")),
            RecommendationPolicy::default(),
        )
    }

    fn with_fixed(engine: &RecommendationEngine, probabilities: [f64; DiscountClass::COUNT]) {
        engine.slot().install(
            Arc::new(Fixed(probabilities)),
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

    fn item(id: &str, stock: f64, price: f64) -> InventoryItemInput {
        InventoryItemInput {
            item_id: Some(id.to_string()),
            stock_percentage: Some(stock),
            price: Some(price),
            num_items: None,
            decode_error: None,
        }
    }

    fn context(time: &str, inventory: Vec<InventoryItemInput>) -> PredictionContext {
        PredictionContext {
            tenant_id: TenantId("tenant-a".to_string()),
            current_time: DateTime::parse_from_rfc3339(time).expect("timestamp"),
            avg_sales_7_days: 100.0,
            inventory,
        }
    }

    #[test]
    fn no_model_means_model_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine_in(&dir);

        let result = engine.recommend(&context("2026-03-10T15:00:00+00:00", vec![]));

        assert_eq!(result, Err(RecommendationError::ModelUnavailable));
        assert!(!engine.state().is_ready());
    }

    #[test]
    fn low_confidence_discounts_are_suppressed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine_in(&dir);
        with_fixed(&engine, [0.25, 0.35, 0.2, 0.2]);

        let batch = engine
            .recommend(&context("2026-03-10T15:00:00+00:00", vec![item("item_001", 60.0, 280.0)]))
            .expect("batch");

        assert!(batch.recommendations.is_empty());
        assert_eq!(batch.suppressed, 1);
    }

    #[test]
    fn threshold_is_exclusive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine_in(&dir);
        with_fixed(&engine, [0.2, 0.4, 0.2, 0.2]);

        let batch = engine
            .recommend(&context("2026-03-10T15:00:00+00:00", vec![item("item_001", 60.0, 280.0)]))
            .expect("batch");
        assert!(batch.recommendations.is_empty());

        with_fixed(&engine, [0.2, 0.41, 0.19, 0.2]);
        let batch = engine
            .recommend(&context("2026-03-10T15:00:00+00:00", vec![item("item_001", 60.0, 280.0)]))
            .expect("batch");
        assert_eq!(batch.recommendations[0].discount_percentage, 7);
        assert_eq!(batch.recommendations[0].reason, "Off-peak hours with moderate inventory");
    }

    #[test]
    fn no_discount_is_always_surfaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine_in(&dir);
        with_fixed(&engine, [0.3, 0.25, 0.25, 0.2]);

        let batch = engine
            .recommend(&context("2026-03-10T13:00:00+00:00", vec![item("item_002", 80.0, 320.0)]))
            .expect("batch");

        assert_eq!(batch.recommendations.len(), 1);
        let recommendation = &batch.recommendations[0];
        assert_eq!(recommendation.discount_percentage, 0);
        assert_eq!(recommendation.confidence, 0.3);
        assert_eq!(recommendation.reason, "Peak demand period; no discount needed");
    }

    #[test]
    fn malformed_items_are_skipped_without_failing_the_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine_in(&dir);
        with_fixed(&engine, [0.1, 0.1, 0.1, 0.7]);

        let mut missing_price = item("item_003", 20.0, 250.0);
        missing_price.price = None;
        let batch = engine
            .recommend(&context(
                "2026-03-10T16:00:00+00:00",
                vec![missing_price, item("item_004", 20.0, 380.0), item("item_005", 150.0, 50.0)],
            ))
            .expect("batch");

        assert_eq!(batch.recommendations.len(), 1);
        assert_eq!(batch.recommendations[0].item_id, "item_004");
        assert_eq!(batch.recommendations[0].discount_percentage, 22);
        assert_eq!(batch.skipped.len(), 2);
        assert_eq!(batch.skipped[0].item_id, "item_003");
        assert!(batch.skipped[0].reason.contains("price"));
    }

    #[test]
    fn failed_reload_keeps_the_active_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine_in(&dir);
        with_fixed(&engine, [0.7, 0.1, 0.1, 0.1]);
        fs::write(dir.path().join("classifier.json"), "garbage").expect("write");
        fs::write(dir.path().join("names.json"), "garbage").expect("write");

        assert!(engine.reload().is_err());
        assert_eq!(engine.state().model_version(), Some(1));
    }

    /// Model trained with the shipped defaults on 180 simulated days, as `train` and the
    /// retrain endpoint would produce it.
    fn trained_engine(dir: &tempfile::TempDir) -> RecommendationEngine {
        let orders: Vec<_> = PolicySimulator::new(MenuCatalog::default(), Some(42))
            .expect("simulator")
            .anchored_at(NaiveDate::from_ymd_opt(2026, 4, 1).expect("date"))
            .simulate(180)
            .expect("window")
            .collect();
        let engine = engine_in(dir);
        Trainer::new(TrainerSettings::default())
            .train_and_persist(&orders, engine.store())
            .expect("training succeeds");
        engine.reload().expect("artifacts load");
        engine
    }

    #[test]
    fn default_model_discounts_critical_stock_off_peak_and_holds_price_at_lunch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = trained_engine(&dir);

        // Tuesday afternoon, 20% stock left.
        let batch = engine
            .recommend(&context("2026-03-10T15:00:00+00:00", vec![item("item_001", 20.0, 280.0)]))
            .expect("batch");
        assert_eq!(batch.recommendations.len(), 1, "suppressed: {}", batch.suppressed);
        let off_peak = &batch.recommendations[0];
        assert!(
            [15, 22].contains(&off_peak.discount_percentage),
            "got {}% at confidence {}",
            off_peak.discount_percentage,
            off_peak.confidence
        );
        assert!(off_peak.confidence > 0.4);
        assert!(!off_peak.reason.contains("no discount needed"), "reason {}", off_peak.reason);

        // Tuesday lunch, 90% stock.
        let batch = engine
            .recommend(&context("2026-03-10T13:00:00+00:00", vec![item("item_002", 90.0, 320.0)]))
            .expect("batch");
        assert_eq!(batch.recommendations.len(), 1);
        let lunch = &batch.recommendations[0];
        assert_eq!(lunch.discount_percentage, 0);
        assert_eq!(lunch.reason, "Peak demand period; no discount needed");
        assert!(lunch.confidence > 0.5);
    }
}
