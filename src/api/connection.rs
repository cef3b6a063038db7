//! Connection inspection endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::connection_manager::ConnectionInfo;
use crate::error::{AppError, Result};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct ConnectionListResponse {
    pub connections: Vec<ConnectionInfo>,
    pub total_connections: usize,
}

/// GET /api/v1/connections - List every registered connection
pub async fn list_connections(State(state): State<AppState>) -> Json<ConnectionListResponse> {
    let connections: Vec<ConnectionInfo> = state
        .connection_manager
        .snapshot()
        .iter()
        .map(|handle| ConnectionInfo::from(handle.as_ref()))
        .collect();
    let total = connections.len();

    Json(ConnectionListResponse {
        connections,
        total_connections: total,
    })
}

/// GET /api/v1/connections/{id} - Get one connection
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectionInfo>> {
    state
        .connection_manager
        .connection_info(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Connection {} not found", id)))
}
