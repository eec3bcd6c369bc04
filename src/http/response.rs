//! Response handling.
//!
//! # Responsibilities
//! - Relay the backend response body and signal when the relay is over
//! - Map proxy failures to client-visible status codes
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Any backend status is relayed as-is; only transport failures become 500
//! - The completion hook fires once the handler has produced a response:
//!   on end of stream, or when the server drops the body unsent (the client
//!   went away). An upstream error mid-body cancels it.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hyper::body::{Body, Frame, SizeHint};

/// Failures the proxy reports to its clients.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid application ID '{0}'")]
    InvalidIdentifier(String),

    #[error("port {0} is outside the TCP port range")]
    PortOutOfRange(u32),

    #[error("failed to build request for port {port}: {source}")]
    Construct {
        port: u32,
        #[source]
        source: axum::http::Error,
    },

    #[error("request to port {port} failed: {source}")]
    Upstream {
        port: u32,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("request to port {port} timed out after {timeout:?}")]
    UpstreamTimeout { port: u32, timeout: Duration },
}

impl ProxyError {
    /// Status code returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short diagnostic sent as the response body.
    pub fn message(&self) -> &'static str {
        match self {
            ProxyError::InvalidIdentifier(_) => "Invalid application ID",
            ProxyError::PortOutOfRange(_) | ProxyError::Construct { .. } => "Error creating request",
            ProxyError::Upstream { .. } | ProxyError::UpstreamTimeout { .. } => {
                "Error forwarding request"
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match &self {
            ProxyError::InvalidIdentifier(_) => tracing::debug!(error = %self, "Rejected request"),
            ProxyError::PortOutOfRange(_) | ProxyError::Construct { .. } => {
                tracing::error!(error = %self, "Could not build upstream request")
            }
            ProxyError::Upstream { .. } | ProxyError::UpstreamTimeout { .. } => {
                tracing::error!(error = %self, "Upstream error")
            }
        }
        (self.status(), self.message()).into_response()
    }
}

type FinishHook = Box<dyn FnOnce() + Send>;

/// Response body that passes frames through and runs a hook when the
/// relay is over.
pub struct RelayBody<B> {
    inner: B,
    on_finish: Option<FinishHook>,
}

impl<B> RelayBody<B> {
    pub fn new(inner: B, on_finish: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner,
            on_finish: Some(Box::new(on_finish)),
        }
    }

    fn finish(&mut self) {
        if let Some(hook) = self.on_finish.take() {
            hook();
        }
    }
}

impl<B> Body for RelayBody<B>
where
    B: Body + Unpin,
    B::Error: std::fmt::Display,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                if this.on_finish.take().is_some() {
                    tracing::warn!(error = %e, "Upstream body failed mid-relay, request not counted");
                }
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for RelayBody<B> {
    fn drop(&mut self) {
        self.finish();
    }
}
