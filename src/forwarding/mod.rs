//! Forwarding-chain subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → relay.rs (merge default headers)
//!     → chain.rs (Unforwardable | Malformed | Valid)
//!         Unforwardable → 200 with the original body
//!         Malformed     → 400 naming the missing headers
//!         Valid         → 202, and a detached task:
//!                           dispatch.rs (pop hop, send, classify)
//!                             → on failure: report.rs (UDP datagram)
//! ```
//!
//! codec.rs owns the wire format of list-valued headers used on both sides.

pub mod chain;
pub mod codec;
pub mod dispatch;
pub mod relay;
pub mod report;
pub mod resource;

pub use chain::{classify, ChainError, ForwardingChain, Hop, Verdict};
pub use codec::{decode_list, encode_header_set, encode_list, HeaderEntry, HeaderSet};
pub use dispatch::{DispatchError, DispatchOutcome, HopDispatcher, HopJob};
pub use relay::{InboundRequest, Relay, RelayResponse, X_CANONICAL_RESOURCE};
pub use report::{ErrorReport, ErrorReporter, FailurePayload, ReportTarget};
pub use resource::{DocumentPath, ResourceIdentifier};
