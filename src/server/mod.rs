//! HTTP surface: streaming WebSocket endpoint, batch endpoint and health.

pub mod batch;
pub mod ws;

use crate::auth::ApiKeyAuth;
use crate::defaults;
use crate::error::{LivescribeError, Result};
use crate::session::SessionContext;
use axum::Json;
use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub session: Arc<SessionContext>,
    pub batch_auth: ApiKeyAuth,
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(session: SessionContext, batch_auth: ApiKeyAuth) -> Self {
        Self {
            session: Arc::new(session),
            batch_auth,
            trust_forwarded_for: false,
        }
    }

    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }
}

/// Router-level options that are not per-request state.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub cors_origins: Vec<String>,
    pub max_batch_body_bytes: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            max_batch_body_bytes: defaults::MAX_BATCH_BODY_BYTES,
        }
    }
}

/// JSON error body `{"error": ..}` with the error's HTTP status.
#[derive(Debug)]
pub struct ApiError(pub LivescribeError);

impl From<LivescribeError> for ApiError {
    fn from(error: LivescribeError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// `Authorization: Bearer <token>` value, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Allowed origins: the configured list plus local development origins.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .map(String::as_str)
        .chain(defaults::LOCAL_DEV_ORIGINS.iter().copied())
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ])
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    model: String,
    diarization: bool,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    let engines = &state.session.engines;
    Json(Health {
        status: "ok",
        model: engines.model_name().to_string(),
        diarization: engines.diarization_available(),
    })
}

/// Build the router with all routes.
pub fn build_router(state: AppState, options: &RouterOptions) -> Router {
    Router::new()
        .route("/ws", get(ws::stream_handler))
        .route(
            "/transcribe",
            post(batch::transcribe_handler)
                .layer(DefaultBodyLimit::max(options.max_batch_body_bytes)),
        )
        .route("/health", get(health))
        .layer(cors_layer(&options.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

/// Bind `address` and serve until Ctrl-C.
pub async fn serve(router: Router, address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(LivescribeError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc "));
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn api_error_uses_error_status() {
        let response = ApiError(LivescribeError::Decode {
            message: "bad".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError(LivescribeError::Unauthorized {
            message: "no".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
