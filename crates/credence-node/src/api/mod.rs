//! HTTP API server for the Credence node.
//!
//! Registry, issuer, verifier and tenant-management routes share one router.
//! Authentication runs as middleware on every route; authorization happens in
//! the per-handler access extractors from [`crate::auth`].

mod issuer;
mod registry;
mod tenants;
mod verifier;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::auth::authenticate_request;
use crate::error::ApiError;
use crate::state::NodeState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

async fn handle_health(State(state): State<Arc<NodeState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
    })
}

/// Unwrap a JSON body, turning axum's rejection into our error shape.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request("malformed_body", rejection.body_text()))
}

pub fn build_router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .merge(registry::routes())
        .merge(issuer::routes())
        .merge(verifier::routes())
        .merge(tenants::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            authenticate_request,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_api_server(
    listener: tokio::net::TcpListener,
    state: Arc<NodeState>,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let local_addr: SocketAddr = listener.local_addr()?;
    tracing::info!(%local_addr, "HTTP API server started");
    axum::serve(listener, app).await?;
    Ok(())
}
