//! Sandbox backend for local development.
//!
//! An in-memory implementation of the console's step persistence API. The
//! wizard's HTTP client talks to it exactly as it would to the real backend,
//! which makes it the target of `escrow-stepper serve` and the integration
//! tests.

use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use server::SandboxServer;
pub use state::ApiState;

/// Build the API router with all routes
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/status", get(routes::health::status))
        // Flow definitions
        .route("/api/v1/flows", get(routes::flows::list))
        .route("/api/v1/flows/:key", get(routes::flows::get_one))
        // Approval requests
        .route(
            "/api/v1/workflow/requests",
            post(routes::workflow::submit).get(routes::workflow::list),
        )
        // Entity steps; collections may be nested
        .route(
            "/api/v1/*path",
            get(routes::entities::fetch)
                .post(routes::entities::post)
                .put(routes::entities::update),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the sandbox and serve until the process exits
pub async fn serve(state: ApiState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("Sandbox listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
