//! Fleet Membership Providers
//!
//! Sources of truth for "which group am I in" and "who is in it":
//! - In-memory provider for tests and local runs
//! - AWS provider (auto scaling + EC2 + instance metadata), behind the `aws` feature

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::Result;

pub mod memory;
#[cfg(feature = "aws")]
pub mod aws;

pub use memory::InMemoryProvider;
#[cfg(feature = "aws")]
pub use aws::AwsProvider;

/// Lifecycle state reported for an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Unknown,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting-down",
            LifecycleState::Terminated => "terminated",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Unknown => "unknown",
        }
    }
}

impl FromStr for LifecycleState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "pending" => LifecycleState::Pending,
            "running" => LifecycleState::Running,
            "shutting-down" => LifecycleState::ShuttingDown,
            "terminated" => LifecycleState::Terminated,
            "stopping" => LifecycleState::Stopping,
            "stopped" => LifecycleState::Stopped,
            _ => LifecycleState::Unknown,
        })
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An auto scaling group and the ids of its members, in provider order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingGroup {
    pub name: String,
    pub instance_ids: Vec<String>,
}

impl ScalingGroup {
    pub fn contains(&self, instance_id: &str) -> bool {
        self.instance_ids.iter().any(|id| id == instance_id)
    }
}

/// Per-instance details as returned by a bulk lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDetails {
    pub instance_id: String,
    pub state: LifecycleState,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
}

#[async_trait]
pub trait FleetProvider: Send + Sync {
    /// Identity of the instance hosting this process. `None` when the
    /// metadata source answered without an id.
    async fn instance_id(&self) -> Result<Option<String>>;

    /// Groups visible to this process. With `name` set, only that group
    /// is requested.
    async fn describe_groups(&self, name: Option<&str>) -> Result<Vec<ScalingGroup>>;

    /// Bulk details for the given instance ids.
    async fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<InstanceDetails>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_state_parsing() {
        for state in [
            LifecycleState::Pending,
            LifecycleState::Running,
            LifecycleState::ShuttingDown,
            LifecycleState::Terminated,
            LifecycleState::Stopping,
            LifecycleState::Stopped,
        ] {
            assert_eq!(state.as_str().parse::<LifecycleState>().unwrap(), state);
        }
        assert_eq!("rebooting".parse::<LifecycleState>().unwrap(), LifecycleState::Unknown);
    }
}
