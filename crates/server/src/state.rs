use std::sync::Arc;
use std::time::Duration;

use menuwise_core::config::AppConfig;
use menuwise_core::recommendation::RecommendationEngine;
use menuwise_core::training::Trainer;

use crate::retrain::{RetrainCoordinator, RetrainSettings};

#[derive(Clone)]
pub struct AppState {
    pub engine: RecommendationEngine,
    pub retrain: RetrainCoordinator,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let engine =
            RecommendationEngine::new(config.model.artifact_store(), config.recommendation.policy());
        Self::with_engine(config, engine)
    }

    pub fn with_engine(config: AppConfig, engine: RecommendationEngine) -> Self {
        let retrain = RetrainCoordinator::new(
            engine.clone(),
            Trainer::new(config.training.trainer_settings()),
            RetrainSettings::from_config(&config),
        );
        Self { engine, retrain, config: Arc::new(config) }
    }

    pub fn retrain_wait(&self) -> Duration {
        Duration::from_secs(self.config.server.retrain_wait_secs)
    }
}
