//! Verity HTTP API
//!
//! Axum-based HTTP server for predictions, feedback and Prometheus scrapes.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function. The inner functions are directly testable without axum
//! dispatch machinery.
//!
//! Endpoints:
//! - POST /predict         : classify an article and store the verdict
//! - POST /feedback        : record user feedback for a stored prediction
//! - GET  /predictions/:id : fetch one stored prediction
//! - GET  /stats           : current aggregate snapshot as JSON
//! - GET  /metrics         : Prometheus text exposition
//! - GET  /health          : event store health
//! - GET  /version         : server version info

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use verity_core::{Aggregator, Classifier, EventStore, NewFeedback, PredictionId, VerityError};

use crate::metrics::{Metrics, MetricsExporter};
use crate::subsystems::feedback::submit_feedback;
use crate::subsystems::predict::{predict, PredictError};

/// Prometheus text format content type.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub store: Arc<dyn EventStore>,
    pub classifier: Arc<dyn Classifier>,
    pub metrics: Arc<Metrics>,
    pub exporter: MetricsExporter,
}

impl HttpState {
    pub fn new(
        store: Arc<dyn EventStore>,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self, prometheus::Error> {
        let metrics = Arc::new(Metrics::new()?);
        let exporter = MetricsExporter::new(Aggregator::new(store.clone()), metrics.clone());
        Ok(Self {
            store,
            classifier,
            metrics,
            exporter,
        })
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/feedback", post(feedback_handler))
        .route("/predictions/:id", get(prediction_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .with_state(state)
}

/// Start the HTTP server on `addr`.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    addr: &str,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Verity HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub title: String,
    pub text: String,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

fn error_body(msg: impl Into<String>) -> serde_json::Value {
    serde_json::to_value(ErrorResponse::new(msg)).unwrap_or_else(|_| serde_json::json!({}))
}

/// HTTP status for an event store failure.
pub fn store_error_status(err: &VerityError) -> StatusCode {
    match err {
        VerityError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        VerityError::NotFound { .. } => StatusCode::NOT_FOUND,
        VerityError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        VerityError::Config(_) | VerityError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

pub async fn predict_inner(
    state: &HttpState,
    req: PredictRequest,
) -> (StatusCode, serde_json::Value) {
    let _in_progress = state.metrics.track_request();

    match predict(
        state.store.as_ref(),
        state.classifier.as_ref(),
        &state.metrics,
        req.title,
        req.text,
    )
    .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            serde_json::to_value(outcome).unwrap_or_else(|_| serde_json::json!({})),
        ),
        Err(PredictError::InvalidInput(msg)) => (StatusCode::BAD_REQUEST, error_body(msg)),
        Err(PredictError::Classifier(e)) => {
            tracing::error!(error = %e, "Classification failed");
            (StatusCode::BAD_GATEWAY, error_body(e.to_string()))
        }
        Err(PredictError::Store(e)) => {
            tracing::error!(error = %e, "Failed to record prediction");
            (store_error_status(&e), error_body(e.to_string()))
        }
    }
}

pub async fn feedback_inner(
    state: &HttpState,
    feedback: NewFeedback,
) -> (StatusCode, serde_json::Value) {
    let _in_progress = state.metrics.track_request();

    match submit_feedback(state.store.as_ref(), &state.metrics, feedback).await {
        Ok(event) => (
            StatusCode::OK,
            serde_json::json!({
                "id": event.id,
                "prediction_id": event.prediction_id,
                "correct": event.correct,
                "rating": event.rating,
                "status": "recorded",
            }),
        ),
        Err(e) => {
            if e.is_storage() {
                tracing::error!(error = %e, "Failed to record feedback");
            }
            (store_error_status(&e), error_body(e.to_string()))
        }
    }
}

pub async fn prediction_inner(
    state: &HttpState,
    id: PredictionId,
) -> (StatusCode, serde_json::Value) {
    match state.store.get_prediction(id).await {
        Ok(Some(prediction)) => (
            StatusCode::OK,
            serde_json::to_value(prediction).unwrap_or_else(|_| serde_json::json!({})),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_body(VerityError::NotFound { prediction_id: id }.to_string()),
        ),
        Err(e) => (store_error_status(&e), error_body(e.to_string())),
    }
}

pub async fn stats_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    match state.exporter.aggregator().snapshot().await {
        Ok(snapshot) => (
            StatusCode::OK,
            serde_json::to_value(snapshot).unwrap_or_else(|_| serde_json::json!({})),
        ),
        Err(e) => (store_error_status(&e), error_body(e.to_string())),
    }
}

/// Inner scrape: always answers; store trouble degrades to the last snapshot.
pub async fn metrics_inner(state: &HttpState) -> (StatusCode, String) {
    match state.exporter.scrape().await {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("# encoding error: {}\n", e))
        }
    }
}

pub async fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    match state.store.health().await {
        Ok(detail) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": state.store.name(),
                "store_detail": detail,
                "classifier": state.classifier.name(),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "store": state.store.name(),
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "verity",
    })
}

// ============================================================================
// Axum handler wrappers (thin, delegating to inner functions)
// ============================================================================

fn rejection_response(rejection: JsonRejection) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(error_body(format!("Validation error: {}", rejection.body_text()))),
    )
}

pub async fn predict_handler(
    State(state): State<Arc<HttpState>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    let (status, body) = predict_inner(&state, req).await;
    (status, Json(body))
}

pub async fn feedback_handler(
    State(state): State<Arc<HttpState>>,
    payload: Result<Json<NewFeedback>, JsonRejection>,
) -> impl IntoResponse {
    let Json(feedback) = match payload {
        Ok(p) => p,
        Err(rejection) => return rejection_response(rejection),
    };
    let (status, body) = feedback_inner(&state, feedback).await;
    (status, Json(body))
}

pub async fn prediction_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<PredictionId>,
) -> impl IntoResponse {
    let (status, body) = prediction_inner(&state, id).await;
    (status, Json(body))
}

pub async fn stats_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = stats_inner(&state).await;
    (status, Json(body))
}

pub async fn metrics_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = metrics_inner(&state).await;
    (status, [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body)
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use verity_core::{Classification, ClassifierError, Label, MemoryEventStore};

    struct StubClassifier(Label);

    #[async_trait]
    impl Classifier for StubClassifier {
        async fn classify(
            &self,
            _title: &str,
            _text: &str,
        ) -> Result<Classification, ClassifierError> {
            Ok(Classification {
                label: self.0,
                confidence: 0.75,
            })
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn make_state(label: Label) -> HttpState {
        HttpState::new(
            Arc::new(MemoryEventStore::new()),
            Arc::new(StubClassifier(label)),
        )
        .unwrap()
    }

    fn predict_req(title: &str, text: &str) -> PredictRequest {
        PredictRequest {
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string());
        assert_eq!(v["service"], "verity");
    }

    #[test]
    fn test_store_error_status_mapping() {
        assert_eq!(
            store_error_status(&VerityError::validation("bad")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            store_error_status(&VerityError::NotFound { prediction_id: 1 }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            store_error_status(&VerityError::Storage(sqlx::Error::PoolClosed)),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_predict_inner_ok() {
        let state = make_state(Label::Fake);
        let (status, body) = predict_inner(&state, predict_req("Aliens", "They landed")).await;
        assert_eq!(status, StatusCode::OK, "{:?}", body);
        assert_eq!(body["prediction"], "FAKE");
        assert_eq!(body["confidence"], 0.75);
        assert_eq!(body["id"], 1);
        assert!(body["latency_seconds"].is_number());
        assert_eq!(state.metrics.requests_inprogress(), 0);
    }

    #[tokio::test]
    async fn test_predict_inner_blank_is_bad_request() {
        let state = make_state(Label::Real);
        let (status, body) = predict_inner(&state, predict_req("", " ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_feedback_inner_paths() {
        let state = make_state(Label::Real);
        let (_, body) = predict_inner(&state, predict_req("t", "x")).await;
        let id = body["id"].as_i64().unwrap();

        let (status, body) = feedback_inner(&state, NewFeedback::new(id, true, Some(4))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "recorded");
        assert_eq!(body["rating"], 4);

        let (status, _) = feedback_inner(&state, NewFeedback::new(id + 1, true, Some(4))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = feedback_inner(&state, NewFeedback::new(id, true, Some(6))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("rating"));
    }

    #[tokio::test]
    async fn test_prediction_inner_lookup() {
        let state = make_state(Label::Fake);
        predict_inner(&state, predict_req("Headline", "Body")).await;

        let (status, body) = prediction_inner(&state, 1).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Headline");
        assert_eq!(body["label"], "FAKE");

        let (status, _) = prediction_inner(&state, 2).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_inner_counts() {
        let state = make_state(Label::Real);
        predict_inner(&state, predict_req("a", "b")).await;
        predict_inner(&state, predict_req("c", "d")).await;
        feedback_inner(&state, NewFeedback::new(1, false, Some(2))).await;

        let (status, body) = stats_inner(&state).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_predictions"], 2);
        assert_eq!(body["real_count"], 2);
        assert_eq!(body["fake_count"], 0);
        assert_eq!(body["accuracy_pct"], 0.0);
        assert_eq!(body["average_rating"], 2.0);
    }

    #[tokio::test]
    async fn test_health_inner_memory_store() {
        let state = make_state(Label::Real);
        let (status, body) = health_inner(&state).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store"], "memory");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
