//! HTTP binding of the request cycle.
//!
//! - `GET /`: run one request cycle, answer with its status code and trace
//! - `GET /metrics`: prometheus text exposition of the exported gauges
//! - `GET /status`: JSON snapshot of the concurrency gate

use crate::node::{CycleRequest, ServiceNode};
use crate::resilience::GateSnapshot;
use crate::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Registry, TextEncoder};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub node: Arc<ServiceNode>,
    pub request: Arc<CycleRequest>,
    pub registry: Registry,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .with_state(state)
}

/// Serve until `cancel` fires.
pub async fn serve(listener: TcpListener, app: Router, cancel: CancellationToken) -> Result<()> {
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            tracing::info!("shutdown received, stopping http server");
        })
        .await?;
    Ok(())
}

async fn handle(State(state): State<AppState>) -> (StatusCode, String) {
    // The cycle runs on its own task: hyper drops this future when the caller
    // disconnects, and an admitted request must still finish and be recorded.
    let node = Arc::clone(&state.node);
    let request = Arc::clone(&state.request);
    let cycle = tokio::spawn(async move {
        let resp = node.handle_request(&request).await;
        tracing::info!("{}", resp.trace);
        resp
    });

    match cycle.await {
        Ok(resp) => {
            let code =
                StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (code, resp.trace)
        }
        Err(e) => {
            tracing::warn!("request cycle aborted: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("request cycle aborted: {e}"),
            )
        }
    }
}

async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    match TextEncoder.encode_to_string(&state.registry.gather()) {
        Ok(s) => (StatusCode::OK, s),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unable to encode metrics: {e}"),
        ),
    }
}

async fn status(State(state): State<AppState>) -> Json<GateSnapshot> {
    Json(state.node.gate().snapshot())
}
