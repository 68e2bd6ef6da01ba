use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::balancer::{ServerStats, Stats};
use crate::error::BalancerError;
use crate::load_balancer::{Server, ServerId};

/// Balancer error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub BalancerError);

impl From<BalancerError> for ApiError {
    fn from(e: BalancerError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BalancerError::NoHealthyServers
            | BalancerError::FailoverExhausted { .. }
            | BalancerError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BalancerError::NotFound(_) => StatusCode::NOT_FOUND,
            BalancerError::DuplicateId(_) => StatusCode::CONFLICT,
            BalancerError::InvalidWeight { .. } | BalancerError::Config(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub algorithm: String,
    pub servers: usize,
    pub healthy: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerView {
    pub id: ServerId,
    #[serde(flatten)]
    pub stats: ServerStats,
}

impl From<&Server> for ServerView {
    fn from(server: &Server) -> Self {
        Self {
            id: server.id.clone(),
            stats: ServerStats::from(server),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddServerRequest {
    pub id: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteResponse {
    pub session: String,
    pub server: ServerView,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let stats = state.balancer.stats();
    let status = if stats.healthy_count > 0 {
        "operational"
    } else {
        "unavailable"
    };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: status.to_string(),
        algorithm: stats.algorithm,
        servers: stats.server_count,
        healthy: stats.healthy_count,
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<Stats> {
    Json(state.balancer.stats())
}

pub async fn get_server(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<ServerView>, ApiError> {
    let id = ServerId::new(id);
    let server = state
        .balancer
        .server(&id)
        .ok_or(BalancerError::NotFound(id))?;
    Ok(Json(ServerView::from(&server)))
}

pub async fn add_server(
    State(state): State<AdminState>,
    Json(req): Json<AddServerRequest>,
) -> Result<(StatusCode, Json<ServerView>), ApiError> {
    if req.id.trim().is_empty() || req.host.trim().is_empty() {
        return Err(BalancerError::Config("id and host must not be empty".to_string()).into());
    }

    let mut server = Server::new(req.id, req.host, req.port).with_weight(req.weight);
    server.metadata = req.metadata;
    let id = server.id.clone();
    state.balancer.add_server(server)?;

    let added = state
        .balancer
        .server(&id)
        .ok_or(BalancerError::NotFound(id))?;
    Ok((StatusCode::CREATED, Json(ServerView::from(&added))))
}

pub async fn remove_server(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<ServerView>, ApiError> {
    let removed = state.balancer.remove_server(&ServerId::new(id)).await?;
    Ok(Json(ServerView::from(&removed)))
}

pub async fn route_session(
    State(state): State<AdminState>,
    Path(session): Path<String>,
) -> Result<Json<RouteResponse>, ApiError> {
    let server = state.balancer.get_server(&session).await?;
    Ok(Json(RouteResponse {
        session,
        server: ServerView::from(&server),
    }))
}
