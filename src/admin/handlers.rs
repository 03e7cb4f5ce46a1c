use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::admin::AdminState;
use crate::interaction::InteractionStatus;
use crate::rendezvous::HubSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub network: Option<String>,
    pub chain_id: u64,
    pub in_flight: usize,
    pub tracked: usize,
}

#[derive(Serialize)]
pub struct LedgerHealth {
    pub healthy: bool,
    pub block_number: Option<u64>,
    pub error: Option<String>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        network: state.network.clone(),
        chain_id: state.chain_id,
        in_flight: state.registry.in_flight(),
        tracked: state.registry.len(),
    })
}

pub async fn get_health(State(state): State<AdminState>) -> (StatusCode, Json<LedgerHealth>) {
    match state.ledger.block_number().await {
        Ok(block) => (
            StatusCode::OK,
            Json(LedgerHealth {
                healthy: true,
                block_number: Some(block),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(LedgerHealth {
                healthy: false,
                block_number: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

pub async fn get_interactions(State(state): State<AdminState>) -> Json<Vec<InteractionStatus>> {
    Json(state.registry.list())
}

pub async fn get_interaction(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InteractionStatus>, StatusCode> {
    state.registry.get(id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_subscriptions(State(state): State<AdminState>) -> Json<HubSnapshot> {
    Json(state.hub.snapshot())
}
