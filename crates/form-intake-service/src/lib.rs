//! # Form-Intake HTTP Service
//!
//! HTTP server for receiving Typeform webhooks and staging them in the
//! bronze layer.
//!
//! This service provides:
//! - The Typeform webhook endpoint with signature verification
//! - A basic health check endpoint
//! - Request logging with correlation IDs
//!
//! The request lifecycle is a single linear pass: extract the claimed
//! signature and raw body, hand both to the core processor, and map the
//! outcome onto the HTTP contract (401 for authentication failures, 400 for
//! processing failures, 200 on success).

pub mod config;
pub mod secret_provider;
pub mod supabase_sink;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use form_intake_core::{
    webhook::{WebhookError, WebhookProcessor, WebhookRequest},
    Timestamp,
};
use serde::Serialize;
use std::future::IntoFuture;
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

pub use config::{ConfigError, ServiceConfig};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Processor handling webhook deliveries
    pub processor: Arc<WebhookProcessor>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServiceConfig, processor: Arc<WebhookProcessor>) -> Self {
        Self { config, processor }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(&state.config.webhook.endpoint_path, post(handle_webhook))
        .route("/health", get(handle_health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    state.config.server.timeout_seconds,
                )))
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size))
        .with_state(state)
}

/// Start HTTP server with graceful shutdown
pub async fn start_server(
    config: ServiceConfig,
    processor: Arc<WebhookProcessor>,
) -> Result<(), ServiceError> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let state = AppState::new(config, processor);
    let app = create_router(state);

    let listener =
        tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: address.clone(),
                message: e.to_string(),
            })?;

    info!("Starting HTTP server on {}", address);

    // Signals the outer drain race the moment a shutdown signal arrives.
    let (draining_tx, draining_rx) = tokio::sync::oneshot::channel();

    let shutdown_signal = async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C signal handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!(
                    "Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout",
                    shutdown_timeout.as_secs()
                );
            },
            _ = terminate => {
                info!(
                    "Received SIGTERM, initiating graceful shutdown with {}s timeout",
                    shutdown_timeout.as_secs()
                );
            },
        }

        let _ = draining_tx.send(());
    };

    // In-flight requests are allowed to complete; new connections are
    // refused as soon as the signal arrives. The drain itself is bounded by
    // `server.shutdown_timeout_seconds`.
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

    if run_until_drained(server.into_future(), draining_rx, shutdown_timeout).await? {
        info!("HTTP server shutdown complete");
    } else {
        warn!(
            "Graceful shutdown timed out after {}s; dropping remaining connections",
            shutdown_timeout.as_secs()
        );
    }

    Ok(())
}

/// Run the server future to completion, bounding the drain phase.
///
/// `draining` fires when a shutdown signal has been received. From that
/// moment the server gets `timeout` to finish in-flight requests; if it has
/// not completed by then, the server future is dropped and its remaining
/// connections with it.
///
/// Returns `true` when the server completed on its own and `false` when the
/// drain was cut short by the timeout.
async fn run_until_drained<F>(
    server: F,
    draining: tokio::sync::oneshot::Receiver<()>,
    timeout: Duration,
) -> Result<bool, ServiceError>
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    let mut server = std::pin::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            })?;
            Ok(true)
        }
        _ = async {
            // A dropped sender means the server ended without a signal; the
            // other branch wins in that case.
            let _ = draining.await;
            tokio::time::sleep(timeout).await;
        } => Ok(false),
    }
}

// ============================================================================
// Webhook Handler
// ============================================================================

/// Handle Typeform webhook deliveries.
///
/// The body is extracted as raw bytes exactly once, before any parsing,
/// because the signature is computed over the bytes as received and a body
/// stream can only be consumed once. All authentication failures produce an
/// indistinguishable 401; failures after authentication produce a 400 with
/// operator-facing detail.
#[instrument(skip(state, headers, body))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookHandlerError> {
    let signature = headers
        .get(&state.config.webhook.signature_header)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let request = WebhookRequest::new(signature, body);
    let receipt = state.processor.process(&request).await?;

    info!(
        external_event_id = %receipt.external_event_id,
        received_at = %receipt.received_at,
        "Webhook delivery accepted"
    );

    Ok(Json(WebhookResponse {
        ok: true,
        message: format!("event {} staged", receipt.external_event_id),
    }))
}

// ============================================================================
// Health Check Handler
// ============================================================================

/// Basic liveness check. No dependency probing: the sink is only touched by
/// real deliveries.
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Timestamp::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking.
///
/// Extracts or generates a correlation ID, logs request completion with
/// structured fields, and propagates the ID through the response headers.
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

// ============================================================================
// Response Types
// ============================================================================

/// Webhook success response
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    pub message: String,
}

/// Webhook error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub version: String,
}

// ============================================================================
// Error Types
// ============================================================================

/// Webhook handler errors with HTTP status code mapping.
///
/// - `401 Unauthorized`: missing or invalid signature, or missing secret.
///   The message is intentionally generic and the failure is not logged
///   with detail, so neither the response nor operator-accessible logs can
///   serve as a signature-guessing oracle.
/// - `400 Bad Request`: the request was authentic but could not be
///   processed (malformed JSON, missing required fields, sink rejection).
///   The message may carry underlying detail for operator diagnosis, and
///   the failure is logged server-side before responding.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Authentication failure
    #[error("Unauthorized")]
    Unauthorized,

    /// Processing failure on an authenticated request
    #[error("{0}")]
    Processing(WebhookError),
}

impl From<WebhookError> for WebhookHandlerError {
    fn from(error: WebhookError) -> Self {
        match error {
            WebhookError::Unauthorized => Self::Unauthorized,
            other => Self::Processing(other),
        }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::Processing(ref e) => {
                error!(
                    category = ?e.error_category(),
                    error = %e,
                    "Webhook processing failed"
                );
                (StatusCode::BAD_REQUEST, self.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}
