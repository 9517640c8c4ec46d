pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod fleet;
pub mod logging;
pub mod peer;
pub mod provider;

// Re-export common types
pub use config::{FleetConfig, FleetConfigPatch};
pub use error::{PeerError, Result};
pub use fleet::{FleetResolver, MembershipCache, PeerInstance};
pub use peer::{FanOut, PeerExecutor, RequestOptions};
