//! Admin API.
//!
//! Read access to the request log and its metrics, served on a separate
//! listener and protected by a bearer key.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::observability::request_log::RequestLogger;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub logger: Arc<RequestLogger>,
    pub api_key: Arc<str>,
    pub started: Instant,
}

impl AdminState {
    pub fn new(logger: Arc<RequestLogger>, api_key: &str) -> Self {
        Self {
            logger,
            api_key: Arc::from(api_key),
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/metrics", get(get_metrics))
        .route("/admin/logs", get(get_logs).delete(clear_logs))
        .route("/admin/logs/export", get(export_logs))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve_admin(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    tracing::info!("Admin API stopped");
    Ok(())
}
