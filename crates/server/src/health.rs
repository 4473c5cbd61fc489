use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<u64>,
    pub checked_at: String,
}

/// Liveness only: a missing model degrades the status but never fails the check.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let version = state.engine.slot().current().map(|model| model.version);

    let payload = HealthResponse {
        status: if version.is_some() { "ready" } else { "degraded" },
        model_loaded: version.is_some(),
        model_version: version,
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};

    use crate::health::health;
    use crate::testing::{install_fixed, test_state};

    #[tokio::test]
    async fn health_is_ok_without_a_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(&dir);

        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "degraded");
        assert!(!payload.model_loaded);
        assert_eq!(payload.model_version, None);
    }

    #[tokio::test]
    async fn health_reports_the_active_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(&dir);
        install_fixed(&state, [0.1, 0.1, 0.7, 0.1]);

        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.model_version, Some(1));
    }
}
