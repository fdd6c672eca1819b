//! Cluster node addresses and membership sets.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// The local cluster's own addressing context.
///
/// Every resolved address carries the same protocol and cluster name as the
/// node doing the discovery.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ClusterIdentity {
    /// Transport protocol, e.g. `akka.tcp`.
    pub protocol: String,

    /// Name of the cluster (actor system) the nodes belong to.
    pub system: String,
}

impl ClusterIdentity {
    /// Create a new cluster identity.
    pub fn new(protocol: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            system: system.into(),
        }
    }
}

/// A resolvable address of one cluster node.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Transport protocol.
    pub protocol: String,

    /// Cluster (actor system) name.
    pub cluster_name: String,

    /// Host name of the node.
    pub host: String,

    /// Port the node listens on.
    pub port: u16,
}

impl NodeAddress {
    /// Create a new node address.
    pub fn new(
        protocol: impl Into<String>,
        cluster_name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            cluster_name: cluster_name.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}@{}:{}",
            self.protocol, self.cluster_name, self.host, self.port
        )
    }
}

/// The nodes visible in the registry at one point in time.
///
/// Always rebuilt from scratch by a poll, never patched in place.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MembershipSet {
    nodes: HashSet<NodeAddress>,
}

impl MembershipSet {
    /// An empty membership set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the given address is a member.
    #[must_use]
    pub fn contains(&self, address: &NodeAddress) -> bool {
        self.nodes.contains(address)
    }

    /// Iterate over the members in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeAddress> {
        self.nodes.iter()
    }

    /// Members sorted, for stable display.
    #[must_use]
    pub fn sorted(&self) -> Vec<&NodeAddress> {
        let mut nodes: Vec<_> = self.nodes.iter().collect();
        nodes.sort();
        nodes
    }

    /// Compute which nodes joined and left relative to `previous`.
    #[must_use]
    pub fn diff(&self, previous: &Self) -> MembershipChange {
        MembershipChange {
            joined: self.nodes.difference(&previous.nodes).cloned().collect(),
            left: previous.nodes.difference(&self.nodes).cloned().collect(),
        }
    }
}

impl FromIterator<NodeAddress> for MembershipSet {
    fn from_iter<I: IntoIterator<Item = NodeAddress>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for MembershipSet {
    type Item = NodeAddress;
    type IntoIter = std::collections::hash_set::IntoIter<NodeAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a> IntoIterator for &'a MembershipSet {
    type Item = &'a NodeAddress;
    type IntoIter = std::collections::hash_set::Iter<'a, NodeAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Difference between two membership sets.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MembershipChange {
    /// Nodes present now but not before, sorted.
    pub joined: BTreeSet<NodeAddress>,

    /// Nodes present before but not now, sorted.
    pub left: BTreeSet<NodeAddress>,
}

impl MembershipChange {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// A cluster member as reported by the cluster-formation layer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MemberEntry {
    /// Address of the member.
    pub address: NodeAddress,

    /// When the member last reported in.
    pub last_update: SystemTime,

    /// Roles the member plays in the cluster.
    pub roles: BTreeSet<String>,
}

impl MemberEntry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(address: NodeAddress, roles: BTreeSet<String>) -> Self {
        Self {
            address,
            last_update: SystemTime::now(),
            roles,
        }
    }
}
