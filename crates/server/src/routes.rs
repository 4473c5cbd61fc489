use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::{health, model, predict};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/predict", post(predict::predict))
        .route("/model/info", get(model::info))
        .route("/model/reload", post(model::reload))
        .route("/model/retrain", post(model::retrain))
        .route("/model/retrain/{job_id}", get(model::retrain_status))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use menuwise_core::recommendation::RecommendationEngine;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::routes::router;
    use crate::state::AppState;
    use crate::testing::{install_fixed, test_config, test_state};

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("router should respond");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn predict_body(inventory: Value) -> Value {
        json!({
            "tenant_id": "tenant-7",
            "current_time": "2026-03-10T15:00:00+00:00",
            "avg_sales_7_days": 120.0,
            "inventory": inventory,
        })
    }

    #[tokio::test]
    async fn malformed_item_is_skipped_without_failing_the_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(&dir);
        install_fixed(&state, [0.05, 0.05, 0.8, 0.1]);

        let (status, body) = send(
            router(state),
            post_json(
                "/predict",
                predict_body(json!([
                    {"item_id": "item_001", "stock_percentage": 20.0, "price": 280.0},
                    {"stock_percentage": 55.0, "price": 310.0},
                    {"item_id": "item_003", "stock_percentage": 35.0, "price": 150.0, "num_items": 2},
                ])),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_loaded"], json!(true));
        assert_eq!(body["tenant_id"], json!("tenant-7"));
        let recommendations = body["recommendations"].as_array().expect("recommendations");
        assert_eq!(recommendations.len(), 2);
        assert_eq!(recommendations[0]["item_id"], json!("item_001"));
        assert_eq!(recommendations[0]["discount_percentage"], json!(15));
        assert_eq!(body["skipped_items"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn mistyped_item_field_is_skipped_without_failing_the_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(&dir);
        install_fixed(&state, [0.05, 0.05, 0.8, 0.1]);

        let (status, body) = send(
            router(state),
            post_json(
                "/predict",
                predict_body(json!([
                    {"item_id": "a", "stock_percentage": 20.0, "price": 280.0},
                    {"item_id": "b", "stock_percentage": "low", "price": 310.0},
                    {"item_id": "c", "stock_percentage": 35.0, "price": 150.0},
                ])),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let recommendations = body["recommendations"].as_array().expect("recommendations");
        let ids: Vec<_> = recommendations.iter().map(|r| r["item_id"].clone()).collect();
        assert_eq!(ids, vec![json!("a"), json!("c")]);
        let skipped = body["skipped_items"].as_array().expect("skipped items");
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0]["item_id"], json!("b"));
    }

    #[tokio::test]
    async fn predict_without_a_model_is_service_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");

        let (status, body) = send(
            router(test_state(&dir)),
            post_json(
                "/predict",
                predict_body(json!([{"item_id": "item_001", "stock_percentage": 20.0, "price": 280.0}])),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["model_loaded"], json!(false));
        assert_eq!(body["recommendations"], json!([]));
        assert_eq!(body["error"], json!("service_unavailable"));
        assert!(body.get("detail").is_none());
    }

    #[tokio::test]
    async fn invalid_predict_payloads_are_bad_requests() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(&dir);
        install_fixed(&state, [0.9, 0.05, 0.03, 0.02]);

        let malformed = Request::post("/predict")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        let (status, body) = send(router(state.clone()), malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("bad_request"));

        let missing_tenant = json!({"current_time": "2026-03-10T15:00:00+00:00", "inventory": []});
        let (status, _) = send(router(state.clone()), post_json("/predict", missing_tenant)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut blank_tenant = predict_body(json!([]));
        blank_tenant["tenant_id"] = json!("   ");
        let (status, body) = send(router(state), post_json("/predict", blank_tenant)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().is_some_and(|detail| detail.contains("tenant_id")));
    }

    #[tokio::test]
    async fn model_info_describes_the_untrained_state() {
        let dir = tempfile::tempdir().expect("tempdir");

        let (status, body) = send(
            router(test_state(&dir)),
            Request::get("/model/info").body(Body::empty()).expect("request"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["trained"], json!(false));
        assert_eq!(body["model_family"], json!("gradient_boosted_trees"));
        assert_eq!(body["classes"].as_array().map(Vec::len), Some(4));
        assert_eq!(body["feature_names"].as_array().map(Vec::len), Some(11));
        assert!(body.get("trained_at").is_none());
    }

    #[tokio::test]
    async fn reload_without_artifacts_is_service_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");

        let (status, body) = send(
            router(test_state(&dir)),
            Request::post("/model/reload").body(Body::empty()).expect("request"),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], json!("service_unavailable"));
    }

    #[tokio::test]
    async fn retrain_trains_publishes_and_reloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(&dir);
        config.training.n_estimators = 15;
        config.training.max_depth = 3;
        config.training.learning_rate = 0.3;
        config.server.retrain_wait_secs = 120;
        let state = AppState::new(config);

        let (status, body) = send(
            router(state.clone()),
            post_json("/model/retrain", json!({"days": 30, "seed": 11})),
        )
        .await;

        assert_eq!(status, StatusCode::OK, "retrain body: {body}");
        assert_eq!(body["state"], json!("succeeded"));
        assert_eq!(body["summary"]["model_version"], json!(1));
        assert!(state.engine.state().is_ready());
        assert!(state.engine.store().exists());

        let job_id = body["job_id"].as_str().expect("job id").to_string();
        let (status, polled) = send(
            router(state.clone()),
            Request::get(format!("/model/retrain/{job_id}")).body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(polled["state"], json!("succeeded"));

        let (status, reloaded) = send(
            router(state.clone()),
            Request::post("/model/reload").body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reloaded["version"], json!(2));

        let (_, info) = send(
            router(state),
            Request::get("/model/info").body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(info["trained"], json!(true));
        assert!(info["trained_at"].is_string());
    }

    #[tokio::test]
    async fn retrain_that_overruns_reports_timed_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(&dir);
        config.training.timeout_secs = 0;
        config.training.n_estimators = 10;
        config.server.retrain_wait_secs = 5;
        let state = AppState::new(config);

        let (status, body) =
            send(router(state.clone()), post_json("/model/retrain", json!({"days": 30}))).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT, "retrain body: {body}");
        assert_eq!(body["state"], json!("timed_out"));
        assert!(!state.engine.state().is_ready());
    }

    #[tokio::test]
    async fn retrain_rejects_bad_days_and_missing_tokens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(&dir);
        let (status, _) =
            send(router(state), post_json("/model/retrain", json!({"days": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut config = test_config(&dir);
        config.server.retrain_token = Some(SecretString::from("let-me-in"));
        let engine =
            RecommendationEngine::new(config.model.artifact_store(), config.recommendation.policy());
        let guarded = AppState::with_engine(config, engine);

        let (status, body) =
            send(router(guarded.clone()), post_json("/model/retrain", json!({"days": 5}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], json!("unauthorized"));

        let wrong = Request::post("/model/retrain")
            .header("x-retrain-token", "nope")
            .body(Body::empty())
            .expect("request");
        let (status, _) = send(router(guarded), wrong).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_retrain_jobs_are_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(&dir);

        let (status, body) = send(
            router(state.clone()),
            Request::get(format!("/model/retrain/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("not_found"));

        let (status, _) = send(
            router(state),
            Request::get("/model/retrain/not-a-uuid").body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
