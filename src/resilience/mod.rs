//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Hop request:
//!     → per-hop timeout (reqwest client)
//!     → on connection failure: backoff.rs decides the wait before the next attempt
//! ```
//!
//! # Design Decisions
//! - Only connection establishment is retried; a hop that reached the
//!   remote end is never replayed
//! - Jittered backoff prevents thundering herd against a restarting hop

pub mod backoff;

pub use backoff::Backoff;
