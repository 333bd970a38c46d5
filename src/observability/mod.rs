//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! relay / dispatcher / reporter produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID from the HTTP layer shows up on every request span
//! - Correlation ID of the chain is logged with every hop event

pub mod logging;
pub mod metrics;
