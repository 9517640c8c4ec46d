//! Fleet Discovery
//!
//! Resolves the sibling instances of the local auto scaling group and keeps
//! them in a time-based cache:
//! - Group resolution by name or by self id
//! - Filtering to running instances, excluding self
//! - Age-based refresh with stale-on-failure retention

pub mod cache;
pub mod clock;
pub mod resolver;
pub mod types;

pub use cache::MembershipCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use resolver::{FleetResolver, GroupStrategy, PeerSource};
pub use types::{MembershipSnapshot, PeerInstance};
