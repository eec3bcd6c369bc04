//! Per-request spans.
//!
//! Every inbound request gets a span carrying a fresh UUID so the log lines
//! of one forward (routing, upstream errors, usage miss) can be correlated.
//! The ID lives only in the span; it is never injected into the forwarded
//! headers.

use axum::http::Request;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

/// Span factory for [`TraceLayer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> ::tracing::Span {
        ::tracing::info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            method = %request.method(),
            uri = %request.uri(),
        )
    }
}

/// HTTP trace layer with request-ID spans.
pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan> {
    TraceLayer::new_for_http().make_span_with(RequestSpan)
}
