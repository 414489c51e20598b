//! DocQA API Gateway
//!
//! HTTP surface of the service. Handles:
//! - Document ingestion and listing
//! - Chat sessions and question answering
//! - Request validation and the response envelope
//! - Observability (logging, metrics, request ids)

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod response;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, StatusCode},
    middleware::from_fn,
    routing::{delete, get, post},
    Router,
};
use docqa_common::{
    completion::Completer,
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::Embedder,
    services::{ChatService, DocumentService},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub documents: Arc<DocumentService>,
    pub chat: Arc<ChatService>,
    /// Present when a Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the pipelines on top of an open pool and model gateways
    pub fn new(
        config: Arc<AppConfig>,
        db: DbPool,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
    ) -> Self {
        let repo = Repository::new(db.clone());

        let documents = DocumentService::new(
            repo.clone(),
            embedder.clone(),
            config.retrieval.flush_threshold,
        );
        let chat = ChatService::new(repo, embedder, completer, config.retrieval.top_k)
            .with_defaults(
                config.completion.default_model,
                config.completion.default_max_tokens,
            );

        Self {
            config,
            db,
            documents: Arc::new(documents),
            chat: Arc::new(chat),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let body_limit = state.config.server.max_upload_bytes;
    let timeout = state.config.request_timeout();

    let api_routes = Router::new()
        // Document endpoints
        .route("/document/ingest", post(handlers::documents::ingest_document))
        .route("/document/", get(handlers::documents::list_documents))
        .route(
            "/document/{document_id}",
            delete(handlers::documents::delete_document),
        )
        // Session endpoints
        .route("/session/", post(handlers::sessions::create_session))
        .route("/session/{session_id}", post(handlers::sessions::ask_question))
        .route(
            "/session/{session_id}/chats",
            get(handlers::sessions::list_chats),
        );

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::metrics::render))
        .nest("/v1", api_routes)
        .route_layer(from_fn(middleware::track_metrics))
        .layer(from_fn(middleware::log_requests))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(timeout_layer(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Requests running past `timeout` are answered with 408
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// `*` allows any origin, otherwise a comma separated allow-list
fn cors_layer(origins: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    if origins.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_slow_request_times_out_with_408() {
        let app: Router = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(timeout_layer(Duration::from_millis(20)));

        let request = Request::builder().uri("/slow").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
