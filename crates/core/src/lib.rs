pub mod artifacts;
pub mod config;
pub mod domain;
pub mod errors;
pub mod features;
pub mod ml;
pub mod model_slot;
pub mod recommendation;
pub mod retrain;
pub mod simulator;
pub mod training;

pub use artifacts::{ArtifactError, ArtifactStore};
pub use domain::discount::{DiscountClass, DISCOUNT_LEVELS};
pub use domain::menu::{MenuCatalog, MenuCategory, MenuItem, MenuItemId};
pub use domain::order::{OrderId, SimulatedOrder};
pub use domain::recommendation::{
    DiscountRecommendation, InventoryItemInput, ItemDecision, PredictionContext,
    RecommendationBatch, SkippedItem, TenantId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use features::{CalendarSignals, FeatureContext, FeatureSchema, FeatureVector};
pub use ml::{BoostingParams, DiscountClassifier, GradientBoostedClassifier, TrainedModel};
pub use model_slot::{LoadedModel, ModelInfo, ModelSlot, ModelSource};
pub use recommendation::{EngineState, RecommendationEngine, RecommendationError, RecommendationPolicy};
pub use retrain::{RetrainJobRecord, RetrainJobState, RetrainRequest};
pub use simulator::PolicySimulator;
pub use training::{Trainer, TrainerSettings, TrainingError, TrainingOutcome, TrainingReport};
