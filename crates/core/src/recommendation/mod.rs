pub mod engine;
pub mod reasons;

use serde::Serialize;
use thiserror::Error;

use crate::model_slot::ModelInfo;

pub use engine::{Assessment, RecommendationEngine, RecommendationPolicy};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecommendationError {
    #[error("no trained model is loaded")]
    ModelUnavailable,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EngineState {
    NoModel,
    Ready { model: Box<ModelInfo> },
}

impl EngineState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn model_version(&self) -> Option<u64> {
        match self {
            Self::NoModel => None,
            Self::Ready { model } => Some(model.version),
        }
    }
}
