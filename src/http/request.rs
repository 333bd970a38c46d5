//! Inbound request helpers.
//!
//! # Responsibilities
//! - Expose the request ID assigned by the request-id layer
//! - Reconstruct the full URL of a request for use as the next referer
//! - Derive the resource identifier from the request path

use axum::http::{header, request::Parts, HeaderMap};

use crate::forwarding::DocumentPath;

/// Header carrying the per-request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// The request ID, or `"unknown"` if the layer did not run.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// `http://<host><path-and-query>` as the client addressed it.
pub fn request_url(parts: &Parts) -> String {
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("http://{}{}", host, path)
}

pub fn document_path(parts: &Parts) -> DocumentPath {
    DocumentPath::from_request_path(parts.uri.path())
}
