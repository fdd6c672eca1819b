//! Concurrent fan-out of per-service registry queries.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::node::{ClusterIdentity, MembershipSet};
use crate::registry::{
    HealthFilter, InstanceRecord, RegistryClient, RegistryError, ServiceQuery,
};
use crate::resolver::resolve;
use crate::settings::DiscoverySettings;

/// Outcome of a single poll.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PollReport {
    /// Resolved, deduplicated membership.
    pub membership: MembershipSet,

    /// Number of service queries that failed and contributed nothing.
    pub failed_queries: usize,

    /// Number of records dropped because they could not be resolved.
    pub dropped_records: usize,
}

/// Queries every configured service and merges the results into one membership set.
#[derive(Clone, Debug)]
pub struct DiscoveryPoller {
    settings: Arc<DiscoverySettings>,
    identity: ClusterIdentity,
}

impl DiscoveryPoller {
    /// Create a new poller.
    #[must_use]
    pub const fn new(settings: Arc<DiscoverySettings>, identity: ClusterIdentity) -> Self {
        Self { settings, identity }
    }

    /// The cluster identity stamped on resolved addresses.
    #[must_use]
    pub const fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    /// Poll the registry and return the current membership.
    ///
    /// Never fails: a failed service query contributes nothing.
    pub async fn poll<C: RegistryClient>(&self, client: &C, only_alive: bool) -> MembershipSet {
        self.poll_with_report(client, only_alive).await.membership
    }

    /// Poll the registry and report failed queries and dropped records alongside the membership.
    pub async fn poll_with_report<C: RegistryClient>(
        &self,
        client: &C,
        only_alive: bool,
    ) -> PollReport {
        let health_filter = HealthFilter::from_only_alive(only_alive);

        let queries = self.settings.services().iter().map(|service| {
            let query = ServiceQuery::new(self.settings.namespace(), service.as_str(), health_filter);
            async move {
                match client.discover_instances(&query).await {
                    Ok(records) => {
                        debug!(
                            service = %query.service_name,
                            "discovered {} instances",
                            records.len()
                        );
                        Some(records)
                    }
                    Err(e) => {
                        warn!(
                            service = %query.service_name,
                            namespace = %query.namespace,
                            kind = %e.kind(),
                            "failed to discover instances: {}",
                            e
                        );
                        None
                    }
                }
            }
        });

        let results = join_all(queries).await;

        let mut failed_queries = 0;
        let mut records: Vec<InstanceRecord> = Vec::new();
        for result in results {
            match result {
                Some(batch) => records.extend(batch),
                None => failed_queries += 1,
            }
        }

        let mut dropped_records = 0;
        let membership: MembershipSet = records
            .iter()
            .filter_map(|record| match resolve(record, &self.identity) {
                Ok(address) => Some(address),
                Err(e) => {
                    warn!(
                        instance = %record.instance_id,
                        service = %record.service_name,
                        "dropping unresolvable instance: {}",
                        e
                    );
                    dropped_records += 1;
                    None
                }
            })
            .collect();

        let report = PollReport {
            membership,
            failed_queries,
            dropped_records,
        };

        debug!(
            "poll complete: {} nodes, {} failed queries, {} dropped records",
            report.membership.len(),
            report.failed_queries,
            report.dropped_records
        );

        report
    }
}
