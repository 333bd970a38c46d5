//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the forwarding relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, inbound limits).
    pub listener: ListenerConfig,

    /// Outbound hop settings.
    pub forwarding: ForwardingConfig,

    /// Wire names of the forwarding headers.
    pub headers: HeaderNames,

    /// Per-deployment headers merged under every inbound request and
    /// attached to 200/202 responses.
    pub default_headers: BTreeMap<String, String>,

    /// Error report transport settings.
    pub reporter: ReporterConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,

    /// Inbound request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 10 * 1024 * 1024, // 10MB
            request_timeout_secs: 30,
        }
    }
}

/// Outbound hop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Total time allowed for one hop request, in seconds.
    pub hop_timeout_secs: u64,

    /// Connection attempts per hop before the hop counts as failed.
    /// Only failures to establish a connection are retried.
    pub connect_attempts: u32,

    /// Base delay for the connection retry backoff in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Maximum delay for the connection retry backoff in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Redirects followed per hop.
    pub max_redirects: usize,

    /// Upper bound on concurrently running hops.
    pub max_in_flight: usize,

    /// Honor `HTTP_PROXY`-style environment variables for hop requests.
    pub use_system_proxy: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            hop_timeout_secs: 120,
            connect_attempts: 20,
            retry_base_delay_ms: 50,
            retry_max_delay_ms: 1000,
            max_redirects: 10,
            max_in_flight: 256,
            use_system_proxy: true,
        }
    }
}

/// Wire names of the six forwarding headers.
///
/// The first three are fixed for the whole chain; the last three carry one
/// entry per remaining hop.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeaderNames {
    pub correlation_id: String,
    pub referer: String,
    pub errors_to: String,
    pub forward_to: String,
    pub query_params: String,
    pub method: String,
}

impl HeaderNames {
    /// Fixed headers, in the order they are checked.
    pub fn fixed(&self) -> [&str; 3] {
        [&self.correlation_id, &self.referer, &self.errors_to]
    }

    /// Per-hop headers, in the order they are checked.
    pub fn to_forward(&self) -> [&str; 3] {
        [&self.forward_to, &self.query_params, &self.method]
    }

    pub fn all(&self) -> [&str; 6] {
        let [a, b, c] = self.fixed();
        let [d, e, f] = self.to_forward();
        [a, b, c, d, e, f]
    }
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            correlation_id: "X-Forward-Id".to_string(),
            referer: "X-Forward-Referer".to_string(),
            errors_to: "X-Forward-Errors-To".to_string(),
            forward_to: "X-Forward-To".to_string(),
            query_params: "X-Forward-Query-Params".to_string(),
            method: "X-Forward-Method".to_string(),
        }
    }
}

/// Error reporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Local address the datagram socket binds to.
    pub bind_address: String,

    /// Host identity written into reports. Falls back to the machine hostname.
    pub host_identity: Option<String>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:0".to_string(),
            host_identity: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
