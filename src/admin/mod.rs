//! Admin HTTP API.
//!
//! # Routes
//! ```text
//! GET    /admin/status            liveness and headline counts
//! GET    /admin/stats             per-server health
//! POST   /admin/servers           register a server
//! GET    /admin/servers/{id}      one server
//! DELETE /admin/servers/{id}      remove a server and its bindings
//! GET    /admin/route/{session}   server get_server picks for a session
//! ```
//!
//! Every route requires `Authorization: Bearer <api_key>`. Mapping balancer
//! errors to HTTP statuses happens here and nowhere else.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::balancer::LoadBalancer;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub balancer: Arc<LoadBalancer>,
    pub api_key: Arc<str>,
    pub started: Instant,
}

impl AdminState {
    pub fn new(balancer: Arc<LoadBalancer>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            balancer,
            api_key: api_key.into(),
            started: Instant::now(),
        }
    }
}

#[allow(deprecated)]
pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/servers", post(add_server))
        .route("/admin/servers/{id}", get(get_server).delete(remove_server))
        .route("/admin/route/{session}", get(route_session))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
