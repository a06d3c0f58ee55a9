//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router around the application
//! - Wire up middleware (timeout, security guard, tracing)
//! - Bind server to listener
//! - Run the request log maintenance task
//! - Start the admin API when enabled

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::{StatusCode, Uri},
    middleware,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::{self, AdminState};
use crate::config::{GuardConfig, RequestLogConfig};
use crate::http::middleware::{guard_middleware, Guard};
use crate::http::request::RequestMeta;
use crate::lifecycle::Shutdown;
use crate::security::store::{build_store, CounterStore, StoreError};

/// HTTP server running the security pipeline in front of an application.
pub struct HttpServer {
    router: Router,
    config: GuardConfig,
    guard: Arc<Guard>,
}

impl HttpServer {
    /// Create a server for the built-in demo application, using the
    /// counter store selected by the configuration.
    pub async fn new(config: GuardConfig) -> Result<Self, StoreError> {
        let store = build_store(&config.rate_limit).await?;
        tracing::info!(store = store.name(), "Rate limit store ready");
        Ok(Self::with_app(config, default_app(), store))
    }

    /// Wrap an arbitrary application router.
    pub fn with_app(config: GuardConfig, app: Router, store: Arc<dyn CounterStore>) -> Self {
        let guard = Arc::new(Guard::new(&config, store));
        let router = Self::build_router(&config, app, Arc::clone(&guard));
        Self {
            router,
            config,
            guard,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GuardConfig, app: Router, guard: Arc<Guard>) -> Router {
        app.layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn_with_state(guard, guard_middleware))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn guard(&self) -> &Arc<Guard> {
        &self.guard
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = ?self.config.environment,
            "HTTP server starting"
        );

        spawn_maintenance(Arc::clone(&self.guard), self.config.request_log.clone(), shutdown);

        if self.config.admin.enabled {
            let state = AdminState::new(Arc::clone(self.guard.logger()), &self.config.admin.api_key);
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let rx = shutdown.subscribe();
            tokio::spawn(async move {
                if let Err(e) = admin::serve_admin(admin_listener, state, rx).await {
                    tracing::error!(error = %e, "Admin API failed");
                }
            });
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut rx = shutdown.subscribe();

        // Serve with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Periodically close stale log entries and purge expired counters.
fn spawn_maintenance(guard: Arc<Guard>, config: RequestLogConfig, shutdown: &Shutdown) {
    let mut rx = shutdown.subscribe();
    let stale_after = Duration::from_secs(config.stale_after_secs);
    let mut ticker = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs.max(1)));

    tokio::spawn(async move {
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    guard.logger().sweep_stale(stale_after);
                    match guard.limiter().store().purge_expired().await {
                        Ok(0) => {}
                        Ok(purged) => tracing::debug!(purged, "Purged expired rate limit counters"),
                        Err(e) => tracing::warn!(error = %e, "Counter purge failed"),
                    }
                }
                _ = rx.recv() => break,
            }
        }
        tracing::debug!("Maintenance task stopped");
    });
}

/// Minimal application used when the guard runs standalone.
pub fn default_app() -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/{*path}", get(api_echo).post(api_echo))
        .fallback(page)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn api_echo(Extension(meta): Extension<RequestMeta>, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "requestId": meta.request_id, "path": uri.path() })),
    )
}

async fn page(Extension(meta): Extension<RequestMeta>, uri: Uri) -> Html<String> {
    let csrf = meta.csrf_token.unwrap_or_default();
    Html(format!(
        "<!doctype html><html><head><title>{path}</title>\
         <style nonce=\"{nonce}\">body{{font-family:sans-serif}}</style></head>\
         <body><form method=\"post\"><input type=\"hidden\" name=\"csrf\" value=\"{csrf}\"></form>\
         <script nonce=\"{nonce}\">document.body.dataset.ready = \"1\";</script></body></html>",
        path = html_escape(uri.path()),
        nonce = meta.nonce,
    ))
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::store::InMemoryCounterStore;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_panicking_handler_still_closes_entry() {
        async fn boom() -> &'static str {
            panic!("handler exploded")
        }
        let app = Router::new().route("/boom", get(boom));
        let server = HttpServer::with_app(
            GuardConfig::default(),
            app,
            Arc::new(InMemoryCounterStore::new()),
        );
        let call = server
            .router()
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap());
        let joined = tokio::spawn(call).await;
        assert!(joined.unwrap_err().is_panic());

        let entry = &server.guard().logger().recent(1)[0];
        assert_eq!(entry.status_code, Some(499));
        assert_eq!(entry.error.as_deref(), Some("request aborted"));
        assert!(!entry.is_open());
    }

    #[tokio::test]
    async fn test_slow_handler_times_out_as_408() {
        async fn slow() -> &'static str {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }
        let mut config = GuardConfig::default();
        config.timeouts.request_secs = 1;
        let app = Router::new().route("/slow", get(slow));
        let server = HttpServer::with_app(config, app, Arc::new(InMemoryCounterStore::new()));
        let response = server
            .router()
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(server.guard().logger().recent(1)[0].status_code, Some(408));
    }

    #[tokio::test]
    async fn test_default_page_embeds_nonce() {
        let server = HttpServer::with_app(
            GuardConfig::default(),
            default_app(),
            Arc::new(InMemoryCounterStore::new()),
        );
        let response = server
            .router()
            .oneshot(Request::builder().uri("/about").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let nonce = response.headers()["x-nonce"].to_str().unwrap().to_string();
        let token = response.headers()["x-csrf-token"].to_str().unwrap().to_string();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains(&format!("nonce=\"{nonce}\"")));
        assert!(html.contains(&token));
    }
}
