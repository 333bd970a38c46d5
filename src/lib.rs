//! HTTP forwarding relay library.
//!
//! Receives a rendered document plus forwarding directives in request
//! headers and either answers with the document or hands it to the next hop
//! of the chain, reporting hop failures out of band.

pub mod config;
pub mod forwarding;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::RelayConfig;
pub use forwarding::Relay;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
