//! evrys ingestion service.
//!
//! Accepts CloudEvents over HTTP, validates them, appends them to the
//! configured store and announces each accepted event on the configured
//! notification bus. [`IngestService`] owns the listener and drives the
//! `Idle → Serving → Draining → Stopped` lifecycle; [`app`] builds the
//! router it serves.

pub mod api_events;
pub mod config;
pub mod service;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, routing::get, Extension, Json, Router};
use evrys_notify::Bus;
use evrys_store::{AppendOnly, Query};
use evrys_types::{Event, Notification};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::Span;

pub use service::{IngestService, Listener, ServeError, ServiceConfig, ServiceState};
pub use status::ApiError;

/// Maximum accepted request body (1 MiB).
pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Bound on announcing one appended event when none is configured.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(1);

/// Application state shared across all request handlers.
///
/// Handlers share one backend client through these handles; nothing is
/// copied per request.
#[derive(Clone)]
pub struct AppState {
    /// Append capability of the store.
    pub append: Arc<dyn AppendOnly>,
    /// Read capability, when the backend has one.
    pub query: Option<Arc<dyn Query>>,
    /// Where accepted events are announced, if anywhere.
    pub bus: Option<Arc<dyn Bus>>,
    /// How long an append waits for its notification to be published.
    pub notify_timeout: Duration,
    /// Parent span for everything the handlers log.
    pub span: Span,
}

/// Publishes the notification for an appended event.
///
/// The event is already durable, so failures are logged and never fail the
/// append. A bus that does not answer within `notify_timeout` is given up
/// on, which bounds the latency a down broker adds to every append.
pub async fn notify_appended(state: &AppState, event: &Event) {
    let Some(bus) = state.bus.as_ref() else {
        return;
    };

    let notification = Notification::from(event);
    match tokio::time::timeout(state.notify_timeout, bus.publish(&notification)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(
            parent: &state.span,
            event_id = %event.id,
            event_type = %event.event_type,
            error = %e,
            "failed to publish event notification"
        ),
        Err(_elapsed) => tracing::warn!(
            parent: &state.span,
            event_id = %event.id,
            event_type = %event.event_type,
            timeout_ms = state.notify_timeout.as_millis() as u64,
            "event notification timed out"
        ),
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/v1/events",
            get(api_events::iterate_handler).post(api_events::append_handler),
        )
        .route("/v1/events/{id}", get(api_events::get_event_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
