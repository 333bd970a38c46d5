//! Relay entry point: one inbound request in, one immediate response out.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::Semaphore;

use crate::config::{HeaderNames, RelayConfig};
use crate::forwarding::chain::{classify, merge_defaults, Verdict};
use crate::forwarding::dispatch::{HopDispatcher, HopJob};
use crate::forwarding::report::ErrorReporter;
use crate::forwarding::resource::ResourceIdentifier;
use crate::observability::metrics;

/// Response header carrying the resource's canonical path.
pub const X_CANONICAL_RESOURCE: &str = "x-canonical-resource";

/// The parts of an inbound request the relay looks at.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Full URL of the request, recorded as the next hop's referer.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The immediate answer to the original caller.
#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for RelayResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Decides per request between answering directly and handing off to the
/// next hop.
#[derive(Clone)]
pub struct Relay {
    names: HeaderNames,
    default_headers: HeaderMap,
    dispatcher: Arc<HopDispatcher>,
    in_flight: Arc<Semaphore>,
}

impl Relay {
    pub fn new(config: &RelayConfig) -> Result<Self, reqwest::Error> {
        let reporter = ErrorReporter::new(&config.reporter);
        let dispatcher = HopDispatcher::new(&config.forwarding, reporter)?;
        Ok(Self::with_dispatcher(config, Arc::new(dispatcher)))
    }

    pub fn with_dispatcher(config: &RelayConfig, dispatcher: Arc<HopDispatcher>) -> Self {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    default_headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Ignoring invalid default header"),
            }
        }

        Self {
            names: config.headers.clone(),
            default_headers,
            dispatcher,
            in_flight: Arc::new(Semaphore::new(config.forwarding.max_in_flight.max(1))),
        }
    }

    /// Classify the request and answer it. A valid chain is dispatched on a
    /// detached task before this returns; no network I/O happens here.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn handle(
        &self,
        request: InboundRequest,
        resource: Arc<dyn ResourceIdentifier>,
    ) -> RelayResponse {
        let merged = merge_defaults(&self.default_headers, &request.headers);
        let verdict = classify(&merged, &self.names);
        metrics::record_verdict(verdict.label());

        match verdict {
            Verdict::Valid(chain) => {
                let canonical = resource.canonical_path();
                tracing::info!(
                    correlation_id = %chain.correlation_id(),
                    resource = %canonical,
                    hops = chain.remaining_hops(),
                    "Forwarding accepted"
                );
                let cookies = request
                    .headers
                    .get_all(header::COOKIE)
                    .iter()
                    .cloned()
                    .collect();
                self.spawn_hop(HopJob {
                    chain,
                    resource,
                    referer: request.url,
                    cookies,
                    body: request.body,
                });
                self.canonical_response(StatusCode::ACCEPTED, &canonical, Bytes::new())
            }
            Verdict::Unforwardable => {
                tracing::debug!("No forwarding requested, answering directly");
                self.canonical_response(StatusCode::OK, &resource.canonical_path(), request.body)
            }
            Verdict::Malformed(err) => {
                tracing::warn!(error = %err, "Rejecting malformed forwarding chain");
                let mut headers = HeaderMap::new();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                );
                RelayResponse {
                    status: StatusCode::BAD_REQUEST,
                    headers,
                    body: Bytes::from(format!("{}\n", err)),
                }
            }
        }
    }

    fn spawn_hop(&self, job: HopJob) {
        let dispatcher = self.dispatcher.clone();
        let in_flight = self.in_flight.clone();
        tokio::spawn(async move {
            let Ok(_permit) = in_flight.acquire_owned().await else {
                tracing::warn!("Hop pool closed, dropping hop");
                return;
            };
            dispatcher.run(job).await;
        });
    }

    fn canonical_response(&self, status: StatusCode, canonical: &str, body: Bytes) -> RelayResponse {
        let mut headers = self.default_headers.clone();
        match HeaderValue::from_str(canonical) {
            Ok(value) => {
                headers.insert(X_CANONICAL_RESOURCE, value);
            }
            Err(_) => tracing::warn!(resource = %canonical, "Canonical path is not a valid header value"),
        }
        RelayResponse {
            status,
            headers,
            body,
        }
    }
}
