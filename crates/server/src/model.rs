use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use menuwise_core::domain::discount::DiscountClass;
use menuwise_core::errors::ApplicationError;
use menuwise_core::features::FeatureSchema;
use menuwise_core::ml::MODEL_FAMILY;
use menuwise_core::model_slot::ModelInfo;
use menuwise_core::retrain::{RetrainJobRecord, RetrainJobState, RetrainRequest};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{correlation_id, ApiError, ErrorBody};
use crate::state::AppState;

pub const RETRAIN_TOKEN_HEADER: &str = "x-retrain-token";
pub const MAX_RETRAIN_DAYS: u32 = 3650;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassDescriptor {
    pub class: DiscountClass,
    pub index: usize,
    pub label: &'static str,
    pub discount_percentage: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelInfoResponse {
    pub trained: bool,
    pub model_family: &'static str,
    pub classes: Vec<ClassDescriptor>,
    pub feature_names: Vec<String>,
    pub hyperparameters: serde_json::Value,
    pub schema_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelInfo>,
}

fn class_descriptors() -> Vec<ClassDescriptor> {
    DiscountClass::ALL
        .into_iter()
        .map(|class| ClassDescriptor {
            class,
            index: class.index(),
            label: class.label(),
            discount_percentage: class.representative_pct(),
        })
        .collect()
}

pub async fn info(State(state): State<AppState>) -> Json<ModelInfoResponse> {
    let response = match state.engine.slot().current() {
        Some(model) => {
            let info = model.info();
            ModelInfoResponse {
                trained: true,
                model_family: info.family,
                classes: class_descriptors(),
                feature_names: info.feature_names.clone(),
                hyperparameters: info.hyperparameters.clone(),
                schema_version: info.schema_version,
                trained_at: Some(info.trained_at),
                model: Some(info),
            }
        }
        // Untrained: describe what the next trained model will look like.
        None => {
            let schema = FeatureSchema::current();
            let params = state.config.training.trainer_settings().params;
            ModelInfoResponse {
                trained: false,
                model_family: MODEL_FAMILY,
                classes: class_descriptors(),
                feature_names: schema.names,
                hyperparameters: serde_json::to_value(params).unwrap_or(serde_json::Value::Null),
                schema_version: schema.version,
                trained_at: None,
                model: None,
            }
        }
    };
    Json(response)
}

pub async fn reload(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ModelInfo>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let engine = state.engine.clone();
    let reloaded = tokio::task::spawn_blocking(move || engine.reload())
        .await
        .map_err(|error| {
            ApiError(
                ApplicationError::Persistence(format!("reload task aborted: {error}"))
                    .into_interface(correlation_id.as_str()),
            )
        })?;

    match reloaded {
        Ok(model) => {
            info!(
                event_name = "http.model.reloaded",
                correlation_id = %correlation_id,
                model_version = model.version,
                "model reloaded on request"
            );
            Ok(Json(model.info()))
        }
        Err(error) => {
            Err(ApiError(ApplicationError::from(error).into_interface(correlation_id.as_str())))
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetrainBody {
    #[serde(default)]
    days: Option<u32>,
    #[serde(default)]
    seed: Option<u64>,
}

fn status_for_job(state: RetrainJobState) -> StatusCode {
    match state {
        RetrainJobState::Succeeded => StatusCode::OK,
        RetrainJobState::Pending | RetrainJobState::Running => StatusCode::ACCEPTED,
        RetrainJobState::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        RetrainJobState::TimedOut => StatusCode::GATEWAY_TIMEOUT,
    }
}

pub async fn retrain(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let correlation_id = correlation_id(&headers);

    let presented = headers.get(RETRAIN_TOKEN_HEADER).and_then(|value| value.to_str().ok());
    if !state.config.server.retrain_token_matches(presented) {
        return ApiError::unauthorized("missing or invalid retrain token", &correlation_id)
            .into_response();
    }

    let parsed = if body.iter().all(u8::is_ascii_whitespace) {
        Ok(RetrainBody::default())
    } else {
        serde_json::from_slice::<RetrainBody>(&body)
    };
    let body = match parsed {
        Ok(body) => body,
        Err(error) => {
            return ApiError::bad_request(format!("invalid retrain request: {error}"), &correlation_id)
                .into_response();
        }
    };

    let settings = state.retrain.settings();
    let days = body.days.unwrap_or(settings.default_days);
    if !(1..=MAX_RETRAIN_DAYS).contains(&days) {
        return ApiError::bad_request(
            format!("days must be within 1..={MAX_RETRAIN_DAYS}"),
            &correlation_id,
        )
        .into_response();
    }
    let request = RetrainRequest { days, seed: body.seed.or(settings.default_seed) };

    let queued = state.retrain.trigger(request).await;
    info!(
        event_name = "http.model.retrain_requested",
        correlation_id = %correlation_id,
        job_id = %queued.job_id,
        "retrain requested"
    );
    let record = state.retrain.wait_for(queued.job_id, state.retrain_wait()).await.unwrap_or(queued);
    job_response(record)
}

pub async fn retrain_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Response {
    let record = match Uuid::parse_str(&job_id) {
        Ok(id) => state.retrain.get(id).await,
        Err(_) => None,
    };
    match record {
        Some(record) => (StatusCode::OK, Json(record)).into_response(),
        None => {
            let body = ErrorBody {
                error: "not_found",
                message: "No retrain job exists with that id.",
                detail: Some(job_id),
                correlation_id: correlation_id(&headers),
            };
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    }
}

fn job_response(record: RetrainJobRecord) -> Response {
    (status_for_job(record.state), Json(record)).into_response()
}
