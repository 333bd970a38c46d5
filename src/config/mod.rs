//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → read once at startup to build the relay and the dispatcher
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; default headers are part of it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, resolve_config, ConfigError};
pub use schema::{
    ForwardingConfig, HeaderNames, ListenerConfig, ObservabilityConfig, RelayConfig,
    ReporterConfig,
};
pub use validation::ValidationError;
