//! Ingestion API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Path params use `:param` syntax (matchit 0.7 / axum 0.7).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{AcknowledgeRequest, AlertView, ClassifyResponse};
use crate::classifier::classify;
use crate::core_state::CoreState;
use crate::db::repository::get_attempts;
use crate::models::LabResult;

pub fn build_router(state: Arc<CoreState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/results", post(ingest_result))
        .route("/v1/alerts/:id", get(get_alert))
        .route("/v1/alerts/:id/acknowledge", post(acknowledge))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::config::APP_VERSION,
    }))
}

/// Classify a normalized lab result; open an escalation alert when critical.
async fn ingest_result(
    State(state): State<Arc<CoreState>>,
    Json(result): Json<LabResult>,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let verdict = classify(&result, &state.catalog, &state.classifier_config)?;

    if verdict.rule_missing {
        tracing::warn!(
            test_code = %result.test_code,
            result_id = %result.id,
            "No threshold rule for test code; flag for catalog maintenance"
        );
    }

    // Alert creation dispatches step 0 synchronously, and channel retry
    // backoff sleeps the calling thread; run it on the blocking pool so a
    // slow provider cannot stall the runtime.
    let alert_id = if verdict.is_critical {
        let state = state.clone();
        let result_id = result.id.clone();
        let verdict = verdict.clone();
        let id = tokio::task::spawn_blocking(move || -> Result<Uuid, ApiError> {
            let conn = state.open_db()?;
            Ok(state.engine.create_alert(&conn, &result_id, &verdict)?)
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
        Some(id)
    } else {
        None
    };

    Ok(Json(ClassifyResponse { verdict, alert_id }))
}

async fn get_alert(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<String>,
) -> Result<Json<AlertView>, ApiError> {
    let alert_id = parse_alert_id(&id)?;
    let conn = state.open_db()?;
    let alert = state.engine.get(&conn, &alert_id)?;
    let attempts = get_attempts(&conn, &alert_id)?;
    Ok(Json(AlertView::from_alert(alert, attempts)))
}

async fn acknowledge(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<String>,
    Json(req): Json<AcknowledgeRequest>,
) -> Result<Json<AlertView>, ApiError> {
    if req.acknowledged_by.trim().is_empty() {
        return Err(ApiError::BadRequest("acknowledged_by must not be empty".into()));
    }

    let alert_id = parse_alert_id(&id)?;
    let conn = state.open_db()?;
    let now = chrono::Utc::now().naive_utc();
    let alert = state.engine.acknowledge(&conn, &alert_id, req.acknowledged_by.trim(), &now)?;
    let attempts = get_attempts(&conn, &alert_id)?;
    Ok(Json(AlertView::from_alert(alert, attempts)))
}

fn parse_alert_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid alert id: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ThresholdCatalog;
    use crate::classifier::ClassifierConfig;
    use crate::dispatch::{NotificationDispatcher, RetryConfig};
    use crate::engine::AlertEngine;
    use crate::policy::EscalationPolicy;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> (Arc<CoreState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("critalert.db");
        // Create the schema up front.
        crate::db::open_database(&db_path).unwrap();

        let dispatcher = Arc::new(NotificationDispatcher::new(
            crate::dispatch::LogSender::all_channels(),
            RetryConfig { max_attempts: 1, base_delay_ms: 0 },
        ));
        let engine = Arc::new(AlertEngine::new(EscalationPolicy::builtin(), dispatcher));
        let state = Arc::new(CoreState::new(
            db_path,
            ThresholdCatalog::builtin(),
            ClassifierConfig::default(),
            engine,
        ));
        (state, dir)
    }

    fn result_body(test_code: &str, value: f64, unit: &str) -> String {
        serde_json::json!({
            "id": "RES-001",
            "patient_id": "PAT-001",
            "patient_age": 45,
            "test_code": test_code,
            "value": value,
            "unit": unit,
            "collected_at": "2026-03-01T09:30:00",
        })
        .to_string()
    }

    fn post_json(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (state, _dir) = test_state();
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn normal_result_classifies_without_alert() {
        let (state, _dir) = test_state();
        let app = build_router(state);

        let response = app
            .oneshot(post_json("/v1/results", result_body("GLU", 95.0, "mg/dL")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["verdict"]["is_critical"], false);
        assert!(json["alert_id"].is_null());
    }

    #[tokio::test]
    async fn critical_result_creates_alert() {
        let (state, _dir) = test_state();
        let app = build_router(state.clone());

        let response = app
            .oneshot(post_json("/v1/results", result_body("K", 6.8, "mmol/L")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["verdict"]["is_critical"], true);
        assert_eq!(json["verdict"]["severity"], "severe");
        let alert_id = json["alert_id"].as_str().unwrap().to_string();

        // The alert is live and queryable.
        let app = build_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/alerts/{alert_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["state"], "step_active");
        assert_eq!(json["step_index"], 0);
        assert!(!json["history"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_ingest_returns_same_alert() {
        let (state, _dir) = test_state();

        let first = build_router(state.clone())
            .oneshot(post_json("/v1/results", result_body("K", 6.8, "mmol/L")))
            .await
            .unwrap();
        let second = build_router(state)
            .oneshot(post_json("/v1/results", result_body("K", 6.8, "mmol/L")))
            .await
            .unwrap();

        let a = json_body(first).await;
        let b = json_body(second).await;
        assert_eq!(a["alert_id"], b["alert_id"]);
    }

    #[tokio::test]
    async fn unit_mismatch_returns_400() {
        let (state, _dir) = test_state();
        let app = build_router(state);

        let response = app
            .oneshot(post_json("/v1/results", result_body("K", 6.8, "mEq/dL")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "UNIT_MISMATCH");
    }

    #[tokio::test]
    async fn acknowledge_flow() {
        let (state, _dir) = test_state();

        let response = build_router(state.clone())
            .oneshot(post_json("/v1/results", result_body("K", 6.8, "mmol/L")))
            .await
            .unwrap();
        let alert_id = json_body(response).await["alert_id"].as_str().unwrap().to_string();

        let response = build_router(state.clone())
            .oneshot(post_json(
                &format!("/v1/alerts/{alert_id}/acknowledge"),
                serde_json::json!({"acknowledged_by": "Dr. Chen"}).to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["state"], "acknowledged");
        assert_eq!(json["acknowledged_by"], "Dr. Chen");

        // Idempotent second acknowledgment.
        let response = build_router(state)
            .oneshot(post_json(
                &format!("/v1/alerts/{alert_id}/acknowledge"),
                serde_json::json!({"acknowledged_by": "Dr. Patel"}).to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["acknowledged_by"], "Dr. Chen");
    }

    #[tokio::test]
    async fn acknowledge_unknown_alert_is_404() {
        let (state, _dir) = test_state();
        let app = build_router(state);

        let response = app
            .oneshot(post_json(
                &format!("/v1/alerts/{}/acknowledge", Uuid::new_v4()),
                serde_json::json!({"acknowledged_by": "Dr. Chen"}).to_string(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_alert_id_is_400() {
        let (state, _dir) = test_state();
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/alerts/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_acknowledger_is_400() {
        let (state, _dir) = test_state();

        let response = build_router(state.clone())
            .oneshot(post_json("/v1/results", result_body("K", 6.8, "mmol/L")))
            .await
            .unwrap();
        let alert_id = json_body(response).await["alert_id"].as_str().unwrap().to_string();

        let response = build_router(state)
            .oneshot(post_json(
                &format!("/v1/alerts/{alert_id}/acknowledge"),
                serde_json::json!({"acknowledged_by": "  "}).to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn slow_delivery_retries_do_not_stall_other_requests() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("critalert.db");
        crate::db::open_database(&db_path).unwrap();

        // Every channel attempt fails; backoff sleeps between the retries.
        let dispatcher = Arc::new(NotificationDispatcher::new(
            vec![Box::new(crate::dispatch::testing::FailingSender::new(
                crate::models::enums::Channel::Push,
            ))],
            RetryConfig { max_attempts: 3, base_delay_ms: 300 },
        ));
        let engine = Arc::new(AlertEngine::new(EscalationPolicy::builtin(), dispatcher));
        let state = Arc::new(CoreState::new(
            db_path,
            ThresholdCatalog::builtin(),
            ClassifierConfig::default(),
            engine,
        ));

        let ingest = tokio::spawn(
            build_router(state.clone())
                .oneshot(post_json("/v1/results", result_body("K", 6.8, "mmol/L"))),
        );
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // With one worker, a handler blocking the runtime would hold this up
        // until the retries finish.
        let health = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            build_router(state)
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()),
        )
        .await
        .expect("health must answer while delivery retries back off")
        .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        // Delivery failure still creates the alert.
        let response = ingest.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert!(json["alert_id"].is_string());
    }

    #[tokio::test]
    async fn unknown_test_code_flags_missing_rule() {
        let (state, _dir) = test_state();
        let app = build_router(state);

        let response = app
            .oneshot(post_json("/v1/results", result_body("XYZ", 1.0, "mg/dL")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["verdict"]["is_critical"], false);
        assert_eq!(json["verdict"]["rule_missing"], true);
    }
}
