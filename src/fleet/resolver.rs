use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error};
use crate::error::{PeerError, Result};
use crate::provider::{FleetProvider, InstanceDetails, LifecycleState, ScalingGroup};
use super::types::PeerInstance;

/// How the local auto scaling group is located
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupStrategy {
    /// Ask the provider for this group by name; the self id is never looked up
    ByName(String),
    /// Look up the self id and pick the first group listing it
    BySelfId,
}

/// Anything able to produce a fresh peer list.
#[async_trait]
pub trait PeerSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<PeerInstance>>;
}

pub struct FleetResolver {
    provider: Arc<dyn FleetProvider>,
    strategy: GroupStrategy,
    self_id: OnceCell<String>,
}

impl FleetResolver {
    pub fn new(provider: Arc<dyn FleetProvider>, strategy: GroupStrategy) -> Self {
        Self {
            provider,
            strategy,
            self_id: OnceCell::new(),
        }
    }

    /// Use a known self id instead of asking the provider for it.
    pub fn with_self_id(self, id: impl Into<String>) -> Self {
        let _ = self.self_id.set(id.into());
        self
    }

    pub fn strategy(&self) -> &GroupStrategy {
        &self.strategy
    }

    /// Id of the instance hosting this process, looked up once per process.
    /// Failed lookups are not cached.
    pub async fn self_id(&self) -> Result<&str> {
        let id = self
            .self_id
            .get_or_try_init(|| async {
                match self.provider.instance_id().await {
                    Ok(Some(id)) => Ok(id),
                    Ok(None) => {
                        error!("Metadata service returned no instance id");
                        Err(PeerError::NoInstanceId)
                    }
                    Err(e) => {
                        error!("Failed to get instance id: {}", e);
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(id.as_str())
    }

    /// The self id if it has already been resolved.
    pub fn cached_self_id(&self) -> Option<&str> {
        self.self_id.get().map(String::as_str)
    }

    async fn resolve_group(&self) -> Result<ScalingGroup> {
        let found = match &self.strategy {
            GroupStrategy::ByName(name) => self
                .describe_groups(Some(name))
                .await?
                .into_iter()
                .find(|group| &group.name == name),
            GroupStrategy::BySelfId => {
                let self_id = self.self_id().await?;
                self.describe_groups(None)
                    .await?
                    .into_iter()
                    .find(|group| group.contains(self_id))
            }
        };

        found.ok_or_else(|| {
            error!("No auto scaling group found for {:?}", self.strategy);
            PeerError::NoGroupFound
        })
    }

    async fn describe_groups(&self, name: Option<&str>) -> Result<Vec<ScalingGroup>> {
        self.provider.describe_groups(name).await.map_err(|e| {
            error!("Failed to describe auto scaling groups: {}", e);
            e
        })
    }
}

#[async_trait]
impl PeerSource for FleetResolver {
    async fn fetch(&self) -> Result<Vec<PeerInstance>> {
        let group = self.resolve_group().await?;

        // Name-based resolution never looks the self id up; it is excluded
        // only when supplied up front.
        let self_id = self.cached_self_id();
        let ids: Vec<String> = group
            .instance_ids
            .into_iter()
            .filter(|id| Some(id.as_str()) != self_id)
            .collect();

        if ids.is_empty() {
            debug!("Group {} has no other members", group.name);
            return Ok(Vec::new());
        }

        let mut details: HashMap<String, InstanceDetails> = self
            .provider
            .describe_instances(&ids)
            .await
            .map_err(|e| {
                error!("Failed to describe instances: {}", e);
                e
            })?
            .into_iter()
            .map(|d| (d.instance_id.clone(), d))
            .collect();

        // Keep group member order regardless of how details come back
        let peers: Vec<PeerInstance> = ids
            .iter()
            .filter_map(|id| details.remove(id))
            .filter(|d| d.state == LifecycleState::Running)
            .map(|d| PeerInstance::new(d.instance_id, d.private_ip, d.public_ip))
            .collect();

        debug!("Resolved {} running peers in group {}", peers.len(), group.name);
        Ok(peers)
    }
}
