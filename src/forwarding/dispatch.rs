//! Hop dispatch: one outbound request per forwardable inbound request.
//!
//! # Responsibilities
//! - Pop the current hop off the chain and build its request
//! - Send it with the per-hop timeout, retrying only failed connects
//! - Classify the result and hand failures to the error reporter
//!
//! # Design Decisions
//! - Runs inside a detached task; nothing here reaches the original caller
//! - Panics are caught and reported like any other internal failure
//! - The next hop receives the chain one entry shorter and relays it onward

use std::any::Any;
use std::error::Error as StdError;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures_util::FutureExt;
use thiserror::Error;
use url::Url;

use crate::config::ForwardingConfig;
use crate::forwarding::chain::ForwardingChain;
use crate::forwarding::codec::{encode_header_set, HeaderEntry};
use crate::forwarding::report::{ErrorReporter, ReportTarget};
use crate::forwarding::resource::ResourceIdentifier;
use crate::observability::metrics;
use crate::resilience::Backoff;

/// Statuses a hop may answer with and still count as delivered.
pub const SUCCESS_STATUSES: [StatusCode; 4] = [
    StatusCode::OK,
    StatusCode::CREATED,
    StatusCode::ACCEPTED,
    StatusCode::NO_CONTENT,
];

/// Local faults while preparing or sending a hop.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("chain has no hop left to dispatch")]
    Exhausted,

    #[error("invalid hop destination '{url}': {reason}")]
    InvalidDestination { url: String, reason: String },

    #[error("invalid hop method '{0}'")]
    InvalidMethod(String),

    #[error("invalid outbound header '{0}'")]
    InvalidHeader(String),

    #[error("hop request failed")]
    Transport(#[source] reqwest::Error),
}

/// How a single hop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success { status: StatusCode },
    /// The hop answered with a status outside [`SUCCESS_STATUSES`].
    External { status: StatusCode, body: String },
    /// The hop could not be performed.
    Internal { message: String },
}

impl DispatchOutcome {
    /// Build an internal failure from an error and its whole source chain.
    pub fn internal(err: &(dyn StdError + 'static)) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Internal { message }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::External { .. } => "external",
            Self::Internal { .. } => "internal",
        }
    }
}

pub fn is_success_status(status: StatusCode) -> bool {
    SUCCESS_STATUSES.contains(&status)
}

/// Everything a detached hop task owns.
pub struct HopJob {
    pub chain: ForwardingChain,
    pub resource: Arc<dyn ResourceIdentifier>,
    /// Full URL of the inbound request, sent on as the next referer.
    pub referer: String,
    /// Inbound `Cookie` header lines, forwarded verbatim.
    pub cookies: Vec<HeaderValue>,
    pub body: Bytes,
}

/// A fully built outbound hop request.
#[derive(Debug, Clone)]
pub struct HopRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Rebuild a hop's base URL around the resource path and the hop's query.
///
/// Only scheme and authority of `target` survive. `#` never acts as a
/// fragment marker: it is percent-encoded wherever it appears.
pub fn next_hop_url(target: &str, path: &str, query: &str) -> Result<Url, DispatchError> {
    let invalid = |reason: String| DispatchError::InvalidDestination {
        url: target.to_string(),
        reason,
    };

    let mut url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    url.set_path(path);
    url.set_query(if query.is_empty() { None } else { Some(query) });
    url.set_fragment(None);
    Ok(url)
}

/// Pop the current hop and build its request.
///
/// On return `chain` holds only the hops after this one, with the referer
/// rewritten to `referer`.
pub fn build_hop_request(
    chain: &mut ForwardingChain,
    resource: &dyn ResourceIdentifier,
    referer: &str,
    cookies: &[HeaderValue],
    body: Bytes,
) -> Result<HopRequest, DispatchError> {
    let hop = chain.pop_hop().ok_or(DispatchError::Exhausted)?;
    let method = Method::from_bytes(hop.method.as_bytes())
        .map_err(|_| DispatchError::InvalidMethod(hop.method.clone()))?;
    let url = next_hop_url(&hop.target, &resource.canonical_path(), &hop.query)?;

    chain.set_referer(referer);
    let mut outbound = chain.to_header_set();
    outbound.insert(
        "Content-Type".to_string(),
        HeaderEntry::Single(resource.mime_type()),
    );

    let mut headers = HeaderMap::new();
    for (name, value) in encode_header_set(&outbound) {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| DispatchError::InvalidHeader(name.clone()))?;
        let header_value =
            HeaderValue::from_str(&value).map_err(|_| DispatchError::InvalidHeader(name.clone()))?;
        headers.insert(header_name, header_value);
    }
    for cookie in cookies {
        headers.append(header::COOKIE, cookie.clone());
    }

    Ok(HopRequest {
        method,
        url,
        headers,
        body,
    })
}

/// Performs hops and reports the ones that fail.
pub struct HopDispatcher {
    client: reqwest::Client,
    backoff: Backoff,
    connect_attempts: u32,
    reporter: ErrorReporter,
}

impl HopDispatcher {
    pub fn new(config: &ForwardingConfig, reporter: ErrorReporter) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.hop_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }

        Ok(Self {
            client: builder.build()?,
            backoff: Backoff::new(config.retry_base_delay_ms, config.retry_max_delay_ms),
            connect_attempts: config.connect_attempts.max(1),
            reporter,
        })
    }

    /// Run one hop to completion and report it if it failed.
    pub async fn run(&self, job: HopJob) -> DispatchOutcome {
        let target = ReportTarget::from_chain(&job.chain);
        let resource = job.resource.canonical_path();
        let start = Instant::now();

        let outcome = match AssertUnwindSafe(self.dispatch(job)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => DispatchOutcome::Internal {
                message: format!("hop task panicked: {}", panic_message(panic.as_ref())),
            },
        };
        metrics::record_hop(outcome.label(), start);

        if let DispatchOutcome::Success { status } = &outcome {
            tracing::info!(
                correlation_id = %target.correlation_id,
                resource = %resource,
                status = %status,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Hop delivered"
            );
        } else {
            self.reporter.report(&target, &resource, &outcome).await;
        }
        outcome
    }

    /// Build, send and classify one hop. Never reports.
    pub async fn dispatch(&self, job: HopJob) -> DispatchOutcome {
        let HopJob {
            mut chain,
            resource,
            referer,
            cookies,
            body,
        } = job;

        let request = match build_hop_request(&mut chain, resource.as_ref(), &referer, &cookies, body) {
            Ok(request) => request,
            Err(e) => return DispatchOutcome::internal(&e),
        };

        tracing::debug!(
            correlation_id = %chain.correlation_id(),
            method = %request.method,
            url = %request.url,
            remaining_hops = chain.remaining_hops(),
            "Dispatching hop"
        );

        let response = match self.send(request).await {
            Ok(response) => response,
            Err(e) => return DispatchOutcome::internal(&e),
        };

        let status = response.status();
        if is_success_status(status) {
            DispatchOutcome::Success { status }
        } else {
            let body = response.text().await.unwrap_or_default();
            DispatchOutcome::External { status, body }
        }
    }

    async fn send(&self, request: HopRequest) -> Result<reqwest::Response, DispatchError> {
        let HopRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .client
                .request(method.clone(), url.clone())
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() && !e.is_timeout() && attempt < self.connect_attempts => {
                    let delay = self.backoff.delay(attempt);
                    tracing::debug!(
                        url = %url,
                        attempt = attempt,
                        delay = ?delay,
                        error = %e,
                        "Hop connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(DispatchError::Transport(e)),
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    }
}
