//! HTTP server setup and the forwarding handler.
//!
//! # Responsibilities
//! - Create the Axum router (`ANY /{port}` and `ANY /{port}/{*rest}`)
//! - Wire up middleware (request tracing)
//! - Forward each request to `localhost:<port>` and relay the response
//! - Count the forward once the relay is over

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::ProxyConfig;
use crate::http::request::{build_upstream_request, parse_identifier};
use crate::http::response::{ProxyError, RelayBody};
use crate::observability::metrics;
use crate::observability::tracing::trace_layer;
use crate::usage::UsageRecorder;

/// Outbound client used for loopback forwards.
pub type UpstreamClient = Client<HttpConnector, Body>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: UpstreamClient,
    pub recorder: UsageRecorder,
    pub upstream_timeout: Duration,
}

impl AppState {
    pub fn new(config: &ProxyConfig, recorder: UsageRecorder) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            recorder,
            upstream_timeout: Duration::from_secs(config.timeouts.upstream_secs),
        }
    }
}

/// HTTP server for the usage proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &ProxyConfig, recorder: UsageRecorder) -> Self {
        let state = AppState::new(config, recorder);
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(trace_layer())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();

    let response = match forward(&state, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}

/// Forward one request and wrap the backend response for counting.
async fn forward(state: &AppState, request: Request<Body>) -> Result<Response, ProxyError> {
    let port = parse_identifier(request.uri().path())?;

    tracing::debug!(port, method = %request.method(), "Proxying request");

    let upstream = build_upstream_request(port, request)?;

    let response = match tokio::time::timeout(state.upstream_timeout, state.client.request(upstream)).await {
        Ok(Ok(response)) => response,
        Ok(Err(source)) => {
            metrics::record_upstream_error("transport");
            return Err(ProxyError::Upstream { port, source });
        }
        Err(_) => {
            metrics::record_upstream_error("timeout");
            return Err(ProxyError::UpstreamTimeout {
                port,
                timeout: state.upstream_timeout,
            });
        }
    };

    let recorder = state.recorder.clone();
    let (parts, body) = response.into_parts();
    let body = RelayBody::new(body, move || {
        recorder.record(port);
    });

    Ok(Response::from_parts(parts, Body::new(body)))
}
