use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use crate::error::Result;
use super::clock::{Clock, SystemClock};
use super::resolver::PeerSource;
use super::types::MembershipSnapshot;

/// Time-based cache of the fleet membership.
///
/// A lookup that finds the snapshot missing or older than `max_age` refreshes
/// it inline through the [`PeerSource`]. A failed refresh leaves the previous
/// snapshot in place so the next lookup retries. Concurrent lookups on a stale
/// cache may each refresh; the last successful one wins.
pub struct MembershipCache {
    source: Arc<dyn PeerSource>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    snapshot: RwLock<Option<Arc<MembershipSnapshot>>>,
}

impl MembershipCache {
    pub fn new(source: Arc<dyn PeerSource>, max_age: Duration) -> Self {
        Self::with_clock(source, max_age, Arc::new(SystemClock))
    }

    pub fn with_clock(source: Arc<dyn PeerSource>, max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            max_age,
            snapshot: RwLock::new(None),
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Current snapshot, refreshed first when missing or stale.
    pub async fn get(&self) -> Result<Arc<MembershipSnapshot>> {
        if let Some(snapshot) = self.fresh() {
            debug!("Membership cache hit ({} peers)", snapshot.len());
            return Ok(snapshot);
        }

        match self.source.fetch().await {
            Ok(peers) => {
                let snapshot = Arc::new(MembershipSnapshot::new(peers, self.clock.now()));
                debug!("Membership cache refreshed ({} peers)", snapshot.len());
                *self.snapshot.write() = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                if self.snapshot.read().is_some() {
                    warn!("Membership refresh failed, keeping stale snapshot: {}", e);
                } else {
                    warn!("Membership refresh failed with no snapshot: {}", e);
                }
                Err(e)
            }
        }
    }

    /// The retained snapshot, stale or not, without refreshing.
    pub fn snapshot(&self) -> Option<Arc<MembershipSnapshot>> {
        self.snapshot.read().clone()
    }

    pub fn is_stale(&self) -> bool {
        self.fresh().is_none()
    }

    fn fresh(&self) -> Option<Arc<MembershipSnapshot>> {
        let guard = self.snapshot.read();
        let snapshot = guard.as_ref()?;
        let age = self.clock.now().saturating_duration_since(snapshot.fetched_at);
        (age <= self.max_age).then(|| snapshot.clone())
    }
}
