//! Read-only admin endpoint.
//!
//! # Routes
//! - `GET /admin/status`: version, network, in-flight interaction count
//! - `GET /admin/health`: ledger reachability and head block
//! - `GET /admin/interactions`: every tracked interaction
//! - `GET /admin/interactions/{id}`: one interaction
//! - `GET /admin/subscriptions`: hub and correlation table occupancy
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::interaction::InteractionRegistry;
use crate::ledger::Ledger;
use crate::lifecycle::Shutdown;
use crate::rendezvous::EventHub;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub ledger: Arc<dyn Ledger>,
    pub hub: EventHub,
    pub registry: InteractionRegistry,
    pub api_key: Arc<str>,
    pub network: Option<String>,
    pub chain_id: u64,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/health", get(get_health))
        .route("/admin/interactions", get(get_interactions))
        .route("/admin/interactions/{id}", get(get_interaction))
        .route("/admin/subscriptions", get(get_subscriptions))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve the admin router in the background until shutdown.
///
/// Binding happens before returning so an unusable address fails the caller.
pub async fn spawn_admin(
    state: AdminState,
    addr: SocketAddr,
    shutdown: &Shutdown,
) -> std::io::Result<JoinHandle<std::io::Result<()>>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin endpoint listening");

    let cancelled = shutdown.cancelled();
    Ok(tokio::spawn(async move {
        axum::serve(listener, setup_admin_router(state))
            .with_graceful_shutdown(cancelled)
            .await
    }))
}
