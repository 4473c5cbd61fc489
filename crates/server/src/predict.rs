use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use menuwise_core::domain::recommendation::{
    DiscountRecommendation, PredictionContext, RecommendationBatch, SkippedItem,
};
use menuwise_core::errors::ApplicationError;
use menuwise_core::recommendation::RecommendationError;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{correlation_id, status_for, ApiError, ErrorBody};
use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PredictResponse {
    pub tenant_id: String,
    pub recommendations: Vec<DiscountRecommendation>,
    pub skipped_items: Vec<SkippedItem>,
    pub suppressed: usize,
    pub model_loaded: bool,
    pub model_version: u64,
    pub generated_at: DateTime<Utc>,
}

impl From<RecommendationBatch> for PredictResponse {
    fn from(batch: RecommendationBatch) -> Self {
        Self {
            tenant_id: batch.tenant_id.0,
            recommendations: batch.recommendations,
            skipped_items: batch.skipped,
            suppressed: batch.suppressed,
            model_loaded: true,
            model_version: batch.model_version,
            generated_at: batch.generated_at,
        }
    }
}

/// 503 body: the error envelope plus an explicit empty result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelUnavailableResponse {
    #[serde(flatten)]
    pub error: ErrorBody,
    pub tenant_id: String,
    pub recommendations: Vec<DiscountRecommendation>,
    pub model_loaded: bool,
}

pub async fn predict(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let correlation_id = correlation_id(&headers);

    let context: PredictionContext = match serde_json::from_slice(&body) {
        Ok(context) => context,
        Err(error) => {
            return ApiError::bad_request(format!("invalid prediction request: {error}"), &correlation_id)
                .into_response();
        }
    };
    if context.tenant_id.0.trim().is_empty() {
        return ApiError::bad_request("tenant_id must not be blank", &correlation_id).into_response();
    }

    match state.engine.recommend(&context) {
        Ok(batch) => {
            info!(
                event_name = "http.predict.completed",
                correlation_id = %correlation_id,
                tenant_id = %batch.tenant_id.0,
                recommended = batch.recommendations.len(),
                skipped = batch.skipped.len(),
                "prediction request served"
            );
            (StatusCode::OK, Json(PredictResponse::from(batch))).into_response()
        }
        Err(error @ RecommendationError::ModelUnavailable) => {
            let interface = ApplicationError::from(error).into_interface(correlation_id.as_str());
            warn!(
                event_name = "http.predict.model_unavailable",
                correlation_id = %correlation_id,
                tenant_id = %context.tenant_id.0,
                "prediction requested before a model was loaded"
            );
            let payload = ModelUnavailableResponse {
                error: ErrorBody::from_interface(&interface),
                tenant_id: context.tenant_id.0,
                recommendations: Vec::new(),
                model_loaded: false,
            };
            (status_for(&interface), Json(payload)).into_response()
        }
    }
}
