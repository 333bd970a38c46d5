//! Out-of-band error reports for failed hops.
//!
//! # Responsibilities
//! - Turn a failed dispatch outcome into a structured report
//! - Resolve the chain's error destination to a datagram address
//! - Send the report once, without waiting for an answer
//!
//! # Design Decisions
//! - The original caller already has its response; reports are the only
//!   place hop failures surface
//! - Best effort: a lost or unsendable report is logged and dropped
//! - The destination header is `scheme://host:port`; only host:port is
//!   used since reports travel as UDP datagrams

use serde::Serialize;
use thiserror::Error;
use tokio::net::UdpSocket;
use url::Url;

use crate::config::ReporterConfig;
use crate::forwarding::chain::ForwardingChain;
use crate::forwarding::dispatch::DispatchOutcome;
use crate::observability::metrics;

/// Errors raised while sending a report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("chain carries no error destination")]
    NoDestination,

    #[error("invalid error destination '{0}'")]
    InvalidDestination(String),

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to send report")]
    Io(#[from] std::io::Error),
}

/// Longest text field carried in a report. Keeps the encoded report well
/// inside a single UDP datagram.
pub const MAX_REPORT_FIELD_BYTES: usize = 8 * 1024;

/// Appended to a field cut at [`MAX_REPORT_FIELD_BYTES`].
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Cut `text` to at most [`MAX_REPORT_FIELD_BYTES`] on a char boundary.
pub fn truncate_field(text: &str) -> String {
    if text.len() <= MAX_REPORT_FIELD_BYTES {
        return text.to_string();
    }
    let mut end = MAX_REPORT_FIELD_BYTES - TRUNCATION_MARKER.len();
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATION_MARKER)
}

/// Where a chain's failures are reported, captured before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTarget {
    pub correlation_id: String,
    pub destination: Option<String>,
}

impl ReportTarget {
    pub fn from_chain(chain: &ForwardingChain) -> Self {
        Self {
            correlation_id: chain.correlation_id().to_string(),
            destination: chain.errors_to().map(str::to_string),
        }
    }
}

/// Failure-specific report fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "errorType")]
pub enum FailurePayload {
    External {
        #[serde(rename = "errorCode")]
        code: String,
        #[serde(rename = "errorMessage")]
        message: String,
        #[serde(rename = "responseText")]
        response_text: String,
    },
    Internal {
        #[serde(rename = "errorMessage")]
        message: String,
    },
}

impl FailurePayload {
    /// `None` for successful outcomes.
    pub fn from_outcome(outcome: &DispatchOutcome) -> Option<Self> {
        match outcome {
            DispatchOutcome::Success { .. } => None,
            DispatchOutcome::External { status, body } => Some(Self::External {
                code: status.as_u16().to_string(),
                message: status.to_string(),
                response_text: truncate_field(body),
            }),
            DispatchOutcome::Internal { message } => Some(Self::Internal {
                message: truncate_field(message),
            }),
        }
    }
}

/// The datagram payload.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub id: String,
    pub resource: String,
    pub levelname: &'static str,
    pub host: String,
    #[serde(flatten)]
    pub failure: FailurePayload,
}

/// Sends error reports as single UDP datagrams.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    bind_address: String,
    host: String,
}

impl ErrorReporter {
    pub fn new(config: &ReporterConfig) -> Self {
        let host = config.host_identity.clone().unwrap_or_else(|| {
            hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string())
        });
        Self {
            bind_address: config.bind_address.clone(),
            host,
        }
    }

    pub fn build_report(
        &self,
        target: &ReportTarget,
        resource: &str,
        failure: FailurePayload,
    ) -> ErrorReport {
        ErrorReport {
            id: target.correlation_id.clone(),
            resource: resource.to_string(),
            levelname: "ERROR",
            host: self.host.clone(),
            failure,
        }
    }

    /// Report a failed outcome. Successful outcomes are ignored.
    ///
    /// Never fails: send problems are logged and counted.
    pub async fn report(&self, target: &ReportTarget, resource: &str, outcome: &DispatchOutcome) {
        let Some(failure) = FailurePayload::from_outcome(outcome) else {
            return;
        };
        let report = self.build_report(target, resource, failure);

        tracing::error!(
            correlation_id = %report.id,
            resource = %report.resource,
            failure = ?report.failure,
            "Forwarding hop failed"
        );

        match self.send(target, &report).await {
            Ok(addr) => {
                tracing::debug!(correlation_id = %report.id, destination = %addr, "Error report sent");
                metrics::record_report("sent");
            }
            Err(e) => {
                tracing::warn!(correlation_id = %report.id, error = %e, "Error report dropped");
                metrics::record_report("failed");
            }
        }
    }

    async fn send(&self, target: &ReportTarget, report: &ErrorReport) -> Result<String, ReportError> {
        let raw = target.destination.as_deref().ok_or(ReportError::NoDestination)?;
        let addr = datagram_destination(raw)?;
        let payload = serde_json::to_vec(report)?;

        let socket = UdpSocket::bind(&self.bind_address).await?;
        socket.send_to(&payload, addr.as_str()).await?;
        Ok(addr)
    }
}

/// Reduce an error destination to `host:port`.
///
/// Accepts `scheme://host:port` (scheme discarded, known default ports
/// filled in) or a bare `host:port`.
pub fn datagram_destination(raw: &str) -> Result<String, ReportError> {
    let raw = raw.trim();
    let invalid = || ReportError::InvalidDestination(raw.to_string());

    if raw.contains("://") {
        let url = Url::parse(raw).map_err(|_| invalid())?;
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
        let port = url.port_or_known_default().ok_or_else(invalid)?;
        return Ok(format!("{}:{}", host, port));
    }

    match raw.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(raw.to_string()),
        _ => Err(invalid()),
    }
}
