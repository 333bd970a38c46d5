//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    routing::any,
    Router,
};
use hop_relay::{HttpServer, RelayConfig, Shutdown};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, Mutex};

/// One request as seen by a mock hop.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

struct MockHop {
    status: StatusCode,
    body: String,
    delay: Duration,
    tx: mpsc::UnboundedSender<CapturedRequest>,
}

async fn capture(
    State(hop): State<Arc<MockHop>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let _ = hop.tx.send(CapturedRequest {
        method,
        uri,
        headers,
        body,
    });
    tokio::time::sleep(hop.delay).await;
    (hop.status, hop.body.clone())
}

/// Start a downstream hop answering every request with `status` and `body`
/// after `delay`. Returns its address and a stream of received requests.
pub async fn start_mock_hop(
    status: StatusCode,
    body: impl Into<String>,
    delay: Duration,
) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let hop = Arc::new(MockHop {
        status,
        body: body.into(),
        delay,
        tx,
    });
    let app = Router::new()
        .route("/", any(capture))
        .route("/{*path}", any(capture))
        .with_state(hop);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, rx)
}

/// UDP endpoint standing in for the error collector.
pub struct ErrorCollector {
    socket: Mutex<UdpSocket>,
    pub addr: SocketAddr,
}

impl ErrorCollector {
    pub async fn start() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        Self {
            socket: Mutex::new(socket),
            addr,
        }
    }

    /// Destination as it appears in the errors-to header.
    pub fn destination(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Next report, or `None` if nothing arrives within `wait`.
    pub async fn next_report(&self, wait: Duration) -> Option<serde_json::Value> {
        let socket = self.socket.lock().await;
        let mut buf = vec![0u8; 65_536];
        match tokio::time::timeout(wait, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => serde_json::from_slice(&buf[..len]).ok(),
            _ => None,
        }
    }
}

/// Relay config suited to local tests: loopback only, fast failure.
pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.forwarding.use_system_proxy = false;
    config.forwarding.connect_attempts = 2;
    config.forwarding.retry_base_delay_ms = 10;
    config.forwarding.retry_max_delay_ms = 20;
    config.reporter.bind_address = "127.0.0.1:0".into();
    config.reporter.host_identity = Some("relay-under-test".into());
    config
}

/// Start a relay and return its address plus the shutdown handle.
pub async fn start_relay(config: RelayConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// A port with nothing listening on it.
pub fn closed_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
