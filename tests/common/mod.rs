//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use notes_gate::clock::ManualClock;
use notes_gate::notes::MemoryNoteStore;
use notes_gate::security::MemoryWindowStore;
use notes_gate::{HttpServer, ServiceConfig, Shutdown};
use tokio::net::TcpListener;

pub const SECRET: &str = "integration-secret";
pub const START_MS: u64 = 1_700_000_000_000;

/// Config with a secret and the default 15s / 10 request window.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.auth.secret = SECRET.into();
    config.instance.id = "api-it".into();
    config
}

/// A running server and the handles to drive it.
pub struct TestServer {
    pub addr: SocketAddr,
    pub clock: Arc<ManualClock>,
    pub client: reqwest::Client,
    // Dropping the coordinator stops the server.
    _shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn login(&self) -> String {
        let res = self.client.post(self.url("/login")).send().await.unwrap();
        assert_eq!(res.status(), 200);
        let json: serde_json::Value = res.json().await.unwrap();
        json["token"].as_str().unwrap().to_string()
    }
}

/// Start a server on an ephemeral port with a manual clock.
pub async fn start_server(config: ServiceConfig) -> TestServer {
    let clock = Arc::new(ManualClock::new(START_MS));
    let server = HttpServer::with_stores(
        config,
        clock.clone(),
        Arc::new(MemoryNoteStore::new()),
        Arc::new(MemoryWindowStore::new()),
    )
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.signal();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap();

    TestServer {
        addr,
        clock,
        client,
        _shutdown: shutdown,
    }
}
