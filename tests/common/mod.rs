//! Shared utilities for integration and load testing.

use std::net::SocketAddr;
use std::sync::Arc;

use request_guard::admin::{self, AdminState};
use request_guard::config::GuardConfig;
use request_guard::http::server::default_app;
use request_guard::security::InMemoryCounterStore;
use request_guard::{Guard, HttpServer, Shutdown};
use tokio::net::TcpListener;

/// A guard server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub guard: Arc<Guard>,
    pub shutdown: Arc<Shutdown>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the guard in front of the demo application.
pub async fn spawn_server(config: GuardConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::with_app(config, default_app(), Arc::new(InMemoryCounterStore::new()));
    let guard = Arc::clone(server.guard());
    let shutdown = Arc::new(Shutdown::new());

    let server_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let _ = server.run(listener, &server_shutdown).await;
    });

    TestServer {
        addr,
        guard,
        shutdown,
    }
}

/// Start the admin API for `guard` on an ephemeral port.
#[allow(dead_code)]
pub async fn spawn_admin(server: &TestServer, api_key: &str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AdminState::new(Arc::clone(server.guard.logger()), api_key);
    let rx = server.shutdown.subscribe();
    tokio::spawn(async move {
        let _ = admin::serve_admin(listener, state, rx).await;
    });
    addr
}

/// HTTP client that never routes through an environment proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
