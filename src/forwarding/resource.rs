//! Resource identifiers for relayed documents.

use std::path::Path;

use percent_encoding::percent_decode_str;

/// The two views of a document identifier the relay needs.
///
/// Parsing identifiers is someone else's job; the relay only asks for the
/// path the next hop should receive and the content type to send it with.
pub trait ResourceIdentifier: Send + Sync {
    /// Canonical path, used as the next hop's request path.
    fn canonical_path(&self) -> String;

    /// MIME type, used as the next hop's `Content-Type`.
    fn mime_type(&self) -> String;
}

/// Identifier taken verbatim from an inbound request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPath {
    path: String,
}

impl DocumentPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Build from a raw (percent-encoded) request path.
    pub fn from_request_path(raw: &str) -> Self {
        Self::new(percent_decode_str(raw).decode_utf8_lossy())
    }
}

impl ResourceIdentifier for DocumentPath {
    fn canonical_path(&self) -> String {
        self.path.clone()
    }

    fn mime_type(&self) -> String {
        let extension = Path::new(&self.path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("xml") => "text/xml",
            Some("html") | Some("htm") => "text/html",
            Some("json") => "application/json",
            Some("txt") => "text/plain",
            Some("pdf") => "application/pdf",
            _ => "application/octet-stream",
        }
        .to_string()
    }
}
