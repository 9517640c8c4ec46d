use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::error::{PeerError, Result};
use super::{FleetProvider, InstanceDetails, LifecycleState, ScalingGroup};

#[derive(Debug, Default)]
struct Fleet {
    self_id: Option<String>,
    groups: Vec<ScalingGroup>,
    instances: HashMap<String, InstanceDetails>,
    failing: HashMap<&'static str, String>,
}

/// Provider backed by a programmable in-process fleet.
///
/// Every operation is counted, and any of them can be made to fail with
/// [`InMemoryProvider::fail`], which makes it suitable for exercising the
/// resolver and cache without a cloud account.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    fleet: RwLock<Fleet>,
    instance_id_calls: AtomicUsize,
    describe_groups_calls: AtomicUsize,
    describe_instances_calls: AtomicUsize,
}

impl InMemoryProvider {
    pub const INSTANCE_ID: &'static str = "instance_id";
    pub const DESCRIBE_GROUPS: &'static str = "describe_groups";
    pub const DESCRIBE_INSTANCES: &'static str = "describe_instances";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_self_id(self, id: impl Into<String>) -> Self {
        self.fleet.write().self_id = Some(id.into());
        self
    }

    pub fn with_group(self, name: impl Into<String>, instance_ids: &[&str]) -> Self {
        self.fleet.write().groups.push(ScalingGroup {
            name: name.into(),
            instance_ids: instance_ids.iter().map(|id| id.to_string()).collect(),
        });
        self
    }

    /// Register an instance whose private address follows registration order:
    /// 10.0.0.1, 10.0.0.2, ... 10.0.0.254, then 10.0.1.1 and so on.
    pub fn with_instance(self, id: &str, state: LifecycleState) -> Self {
        let n = self.fleet.read().instances.len();
        let private_ip = format!("10.0.{}.{}", n / 254, n % 254 + 1);
        self.with_details(InstanceDetails {
            instance_id: id.to_string(),
            state,
            private_ip: Some(private_ip),
            public_ip: None,
        })
    }

    pub fn with_details(self, details: InstanceDetails) -> Self {
        self.set_details(details);
        self
    }

    pub fn set_details(&self, details: InstanceDetails) {
        self.fleet
            .write()
            .instances
            .insert(details.instance_id.clone(), details);
    }

    pub fn set_state(&self, id: &str, state: LifecycleState) {
        if let Some(details) = self.fleet.write().instances.get_mut(id) {
            details.state = state;
        }
    }

    pub fn set_group_members(&self, name: &str, instance_ids: &[&str]) {
        let mut fleet = self.fleet.write();
        if let Some(group) = fleet.groups.iter_mut().find(|g| g.name == name) {
            group.instance_ids = instance_ids.iter().map(|id| id.to_string()).collect();
        }
    }

    /// Make `operation` fail with `message` until [`InMemoryProvider::recover`].
    pub fn fail(&self, operation: &'static str, message: impl Into<String>) {
        self.fleet.write().failing.insert(operation, message.into());
    }

    pub fn recover(&self, operation: &'static str) {
        self.fleet.write().failing.remove(operation);
    }

    pub fn instance_id_calls(&self) -> usize {
        self.instance_id_calls.load(Ordering::SeqCst)
    }

    pub fn describe_groups_calls(&self) -> usize {
        self.describe_groups_calls.load(Ordering::SeqCst)
    }

    pub fn describe_instances_calls(&self) -> usize {
        self.describe_instances_calls.load(Ordering::SeqCst)
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        match self.fleet.read().failing.get(operation) {
            Some(message) => Err(PeerError::provider(operation, message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FleetProvider for InMemoryProvider {
    async fn instance_id(&self) -> Result<Option<String>> {
        self.instance_id_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Self::INSTANCE_ID)?;
        Ok(self.fleet.read().self_id.clone())
    }

    async fn describe_groups(&self, name: Option<&str>) -> Result<Vec<ScalingGroup>> {
        self.describe_groups_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Self::DESCRIBE_GROUPS)?;
        let fleet = self.fleet.read();
        Ok(fleet
            .groups
            .iter()
            .filter(|g| name.map_or(true, |n| g.name == n))
            .cloned()
            .collect())
    }

    async fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<InstanceDetails>> {
        self.describe_instances_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Self::DESCRIBE_INSTANCES)?;
        let fleet = self.fleet.read();
        Ok(instance_ids
            .iter()
            .filter_map(|id| fleet.instances.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generated_addresses_stay_valid() {
        let ids: Vec<String> = (0..300).map(|i| format!("i-{}", i)).collect();
        let mut provider = InMemoryProvider::new();
        for id in &ids {
            provider = provider.with_instance(id, LifecycleState::Running);
        }

        let details = provider.describe_instances(&ids).await.unwrap();
        let addr = |i: usize| details[i].private_ip.as_deref().unwrap().to_string();
        assert_eq!(addr(0), "10.0.0.1");
        assert_eq!(addr(253), "10.0.0.254");
        assert_eq!(addr(254), "10.0.1.1");
        assert_eq!(addr(299), "10.0.1.46");
        for d in &details {
            let ip = d.private_ip.as_deref().unwrap();
            assert!(ip.parse::<std::net::Ipv4Addr>().is_ok(), "bad address {}", ip);
        }
    }

    #[tokio::test]
    async fn test_group_members_can_change() {
        let provider = InMemoryProvider::new().with_group("web", &["i-a"]);
        provider.set_group_members("web", &["i-a", "i-b"]);
        provider.set_group_members("missing", &["i-x"]);

        let groups = provider.describe_groups(None).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].instance_ids, vec!["i-a", "i-b"]);
    }
}
