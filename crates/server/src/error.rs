use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use menuwise_core::errors::InterfaceError;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: &'static str,
    /// Only client errors carry detail; server-side failures keep it in the logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub correlation_id: String,
}

impl ErrorBody {
    pub fn from_interface(error: &InterfaceError) -> Self {
        let detail = match error {
            InterfaceError::BadRequest { message, .. }
            | InterfaceError::Unauthorized { message, .. } => Some(message.clone()),
            InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => None,
        };
        Self {
            error: error.error_class(),
            message: error.user_message(),
            detail,
            correlation_id: error.correlation_id().to_string(),
        }
    }
}

pub fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }

    pub fn unauthorized(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::Unauthorized {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }
}

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(
                event_name = "http.request.failed",
                correlation_id = %self.0.correlation_id(),
                error_class = self.0.error_class(),
                error = %self.0,
                "request failed"
            );
        } else {
            warn!(
                event_name = "http.request.rejected",
                correlation_id = %self.0.correlation_id(),
                error_class = self.0.error_class(),
                error = %self.0,
                "request rejected"
            );
        }
        (status, Json(ErrorBody::from_interface(&self.0))).into_response()
    }
}

/// Caller-supplied correlation id, or a fresh one.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
