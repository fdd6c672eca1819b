//! Interface offered to the cluster-formation layer.

use async_trait::async_trait;

use crate::error::Result;
use crate::node::{MemberEntry, MembershipSet};

/// What a cluster-formation mechanism needs from a discovery backend.
#[async_trait]
pub trait ClusterDiscovery
where
    Self: Send + Sync,
{
    /// Get the addresses of the nodes currently known to the registry.
    async fn get_nodes(&self, only_alive: bool) -> Result<MembershipSet>;

    /// Register the local node with the registry.
    async fn register_node(&self, node: &MemberEntry) -> Result<()>;

    /// Remove the local node from the registry.
    async fn deregister_node(&self, node: &MemberEntry) -> Result<()>;

    /// Report the local node as alive.
    async fn mark_as_alive(&self, node: &MemberEntry) -> Result<()>;
}
