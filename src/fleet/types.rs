//! Fleet Membership Types
//!
//! Core types for peer discovery:
//! - Peer identification and addressing
//! - Snapshots of the discovered membership

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// A running sibling instance of the local process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInstance {
    /// Provider-assigned instance identifier
    pub instance_id: String,
    /// Address inside the private network
    pub private_ip: Option<String>,
    /// Publicly routable address, when assigned
    pub public_ip: Option<String>,
}

impl PeerInstance {
    pub fn new(
        instance_id: impl Into<String>,
        private_ip: Option<String>,
        public_ip: Option<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            private_ip,
            public_ip,
        }
    }

    /// Address to contact this peer on.
    pub fn address(&self, prefer_public: bool) -> Option<&str> {
        if prefer_public {
            self.public_ip.as_deref()
        } else {
            self.private_ip.as_deref()
        }
    }
}

impl fmt::Display for PeerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.instance_id)
    }
}

/// Peer list as of one successful refresh
#[derive(Debug, Clone)]
pub struct MembershipSnapshot {
    pub peers: Vec<PeerInstance>,
    pub fetched_at: Instant,
}

impl MembershipSnapshot {
    pub fn new(peers: Vec<PeerInstance>, fetched_at: Instant) -> Self {
        Self { peers, fetched_at }
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }
}
