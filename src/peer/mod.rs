//! Peer Requests
//!
//! Sequential fan-out over the discovered peers:
//! - Per-peer request construction (address, scheme, port, shared secret)
//! - Pluggable HTTP transport
//! - One-at-a-time walk with an early-stop predicate

pub mod executor;
pub mod fanout;
pub mod transport;

pub use executor::{PeerExecutor, RequestOptions, RequestSettings, AUTH_HEADER};
pub use fanout::{FanOut, FanOutResults, PeerOutcome, Step};
pub use transport::{HttpResponse, HttpTransport, OutboundRequest, ReqwestTransport, ResponseMeta, TransportError};
