//! Inbound request handling.
//!
//! # Responsibilities
//! - Extract the destination port from the first path segment
//! - Prepare the request for forwarding to `localhost:<port>`
//!
//! # Design Decisions
//! - Only "positive integer" is checked; no port denylist or bounds beyond
//!   what a TCP port can physically be
//! - Method, headers and body stream pass through untouched; only the URI
//!   authority (and with it the Host header) changes

use axum::body::Body;
use axum::http::{header, Request, Uri, Version};

use crate::http::response::ProxyError;

/// Parse the destination identifier from a request path.
///
/// `/8080` and `/8080/api/items` both yield `8080`.
pub fn parse_identifier(path: &str) -> Result<u32, ProxyError> {
    let segment = path
        .strip_prefix('/')
        .unwrap_or(path)
        .split('/')
        .next()
        .unwrap_or_default();

    match segment.parse::<u32>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ProxyError::InvalidIdentifier(segment.to_string())),
    }
}

/// Loopback URI for `identifier`, keeping the original path and query.
pub fn upstream_uri(identifier: u32, original: &Uri) -> Result<Uri, ProxyError> {
    let port = u16::try_from(identifier).map_err(|_| ProxyError::PortOutOfRange(identifier))?;
    let path_and_query = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("http://localhost:{}{}", port, path_and_query)
        .parse::<Uri>()
        .map_err(|e| ProxyError::Construct {
            port: identifier,
            source: e.into(),
        })
}

/// Rebuild `request` so it targets the loopback destination.
///
/// The body is moved, not buffered. The inbound `Host` header is dropped so
/// the client sets it from the loopback authority.
pub fn build_upstream_request(
    identifier: u32,
    request: Request<Body>,
) -> Result<Request<Body>, ProxyError> {
    let (parts, body) = request.into_parts();
    let uri = upstream_uri(identifier, &parts.uri)?;

    let mut builder = Request::builder()
        .method(parts.method)
        .uri(uri)
        .version(Version::HTTP_11);

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            if name != header::HOST {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    builder.body(body).map_err(|source| ProxyError::Construct {
        port: identifier,
        source,
    })
}
