//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use usage_proxy::config::{ProxyConfig, StoreKind};
use usage_proxy::lifecycle::startup::{load_registry, serve, Ready};
use usage_proxy::lifecycle::Shutdown;
use usage_proxy::store::{MemoryStore, StoreError, UsageStore};
use usage_proxy::{DestinationRecord, UsageRegistry};

/// Serve `router` on an ephemeral loopback port.
pub async fn start_backend(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Backend answering every request with `status` and `body`.
pub async fn start_fixed_backend(status: StatusCode, body: &'static str) -> SocketAddr {
    start_backend(Router::new().fallback(move || async move {
        (status, [("x-backend", "fixed")], body)
    }))
    .await
}

/// Backend describing the request it received as JSON.
pub async fn start_echo_backend() -> SocketAddr {
    async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
        let header = |name: &str| {
            headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(",")
        };
        Json(serde_json::json!({
            "method": method.as_str(),
            "uri": uri.to_string(),
            "host": header("host"),
            "custom": header("x-custom"),
            "body": String::from_utf8_lossy(&body),
        }))
    }

    start_backend(Router::new().fallback(echo)).await
}

/// Raw backend that reads one request, writes `head` (possibly empty) and
/// then stalls. The receiver resolves once the proxy closes the connection.
pub async fn start_stalling_backend(head: &'static str) -> (SocketAddr, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }

        if !head.is_empty() {
            let _ = socket.write_all(head.as_bytes()).await;
        }

        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = closed_tx.send(());
    });

    (addr, closed_rx)
}

/// A loopback port nothing listens on.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Store that remembers every write it receives.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    writes: Mutex<Vec<(u32, u64)>>,
    fail_writes: bool,
    write_delay: Option<Duration>,
}

impl RecordingStore {
    pub fn with_records(records: impl IntoIterator<Item = DestinationRecord>) -> Self {
        Self {
            inner: MemoryStore::with_records(records),
            ..Default::default()
        }
    }

    pub fn failing(records: impl IntoIterator<Item = DestinationRecord>) -> Self {
        Self {
            fail_writes: true,
            ..Self::with_records(records)
        }
    }

    /// Writes are acknowledged only after `delay`.
    pub fn slow(records: impl IntoIterator<Item = DestinationRecord>, delay: Duration) -> Self {
        Self {
            write_delay: Some(delay),
            ..Self::with_records(records)
        }
    }

    pub fn writes(&self) -> Vec<(u32, u64)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn stored(&self, identifier: u32) -> Option<u64> {
        self.inner.count(identifier)
    }
}

#[async_trait]
impl UsageStore for RecordingStore {
    async fn load_all(&self) -> Result<Vec<DestinationRecord>, StoreError> {
        self.inner.load_all().await
    }

    async fn upsert_count(&self, identifier: u32, count: u64) -> Result<(), StoreError> {
        self.writes.lock().unwrap().push((identifier, count));
        if self.fail_writes {
            return Err(std::io::Error::other("store offline").into());
        }
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.upsert_count(identifier, count).await
    }

    fn kind(&self) -> &'static str {
        "recording"
    }
}

/// A running proxy bound to an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub registry: Arc<UsageRegistry>,
    pub shutdown: Shutdown,
    server: Option<JoinHandle<()>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to return.
    pub async fn stop(mut self) {
        self.shutdown.trigger();
        if let Some(server) = self.server.take() {
            server.await.unwrap();
        }
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.store.kind = StoreKind::Memory;
    config.timeouts.upstream_secs = 5;
    config.timeouts.persist_secs = 2;
    config
}

/// Load `store` into a registry and serve the proxy in the background.
pub async fn start_proxy(store: Arc<dyn UsageStore>) -> TestProxy {
    start_proxy_with(test_config(), store).await
}

pub async fn start_proxy_with(config: ProxyConfig, store: Arc<dyn UsageStore>) -> TestProxy {
    let registry = Arc::new(
        load_registry(store.as_ref(), Duration::from_secs(5))
            .await
            .unwrap(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let ready = Ready {
        registry: Arc::clone(&registry),
        store,
    };
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        let _ = serve(listener, &config, ready, &server_shutdown).await;
    });

    TestProxy {
        addr,
        registry,
        shutdown,
        server: Some(server),
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Run `f` and give spawned side effects a moment to settle.
pub async fn settle<F: Future>(f: F) -> F::Output {
    let out = f.await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    out
}
