//! HTTP monitor for a running relay.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `GET /health`: `{ "ok": true, "pending": n, "failed": n }`, or 503 when
//!   the store cannot be read.
//! - `GET /outbox/stats`: per-status message counts plus relay counters.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use super::thread::RelayMetrics;
use crate::store::OutboxStore;

struct Monitor<S: ?Sized> {
    store: Arc<S>,
    metrics: Arc<RelayMetrics>,
}

impl<S: ?Sized> Clone for Monitor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Build an axum `Router` exposing relay health and outbox statistics.
pub fn router<S>(store: Arc<S>, metrics: Arc<RelayMetrics>) -> Router
where
    S: OutboxStore + ?Sized + 'static,
{
    Router::new()
        .route("/health", get(health_handler::<S>))
        .route("/outbox/stats", get(stats_handler::<S>))
        .with_state(Monitor { store, metrics })
}

/// Serve the monitor at the given address (e.g. `"0.0.0.0:9090"`).
pub async fn serve<S>(
    store: Arc<S>,
    metrics: Arc<RelayMetrics>,
    addr: &str,
) -> Result<(), std::io::Error>
where
    S: OutboxStore + ?Sized + 'static,
{
    let app = router(store, metrics);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health_handler<S>(State(monitor): State<Monitor<S>>) -> impl IntoResponse
where
    S: OutboxStore + ?Sized + 'static,
{
    match monitor.store.counts() {
        Ok(counts) => (
            StatusCode::OK,
            Json(json!({ "ok": true, "pending": counts.pending, "failed": counts.failed })),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ok": false, "error": err.to_string() })),
        ),
    }
}

async fn stats_handler<S>(State(monitor): State<Monitor<S>>) -> impl IntoResponse
where
    S: OutboxStore + ?Sized + 'static,
{
    match monitor.store.counts() {
        Ok(counts) => (
            StatusCode::OK,
            Json(json!({ "outbox": counts, "relay": monitor.metrics.snapshot() })),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": err.to_string() })),
        ),
    }
}
