//! Cluster membership discovery backed by a service registry
//!
//! This crate provides:
//! - Registry client traits (`RegistryClient`, `RegistryClientFactory`)
//! - Resolution of registry records into cluster node addresses
//! - Concurrent, failure-isolated polling of the registry
//! - A discovery service with periodic registry client restarts
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod cluster;
pub mod error;
pub mod node;
pub mod poller;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod settings;

pub use client::{ClientLease, ClientManager};
pub use cluster::ClusterDiscovery;
pub use error::{DiscoveryError, ResolveError, Result, SettingsError};
pub use node::{ClusterIdentity, MemberEntry, MembershipChange, MembershipSet, NodeAddress};
pub use poller::{DiscoveryPoller, PollReport};
pub use registry::{
    HealthFilter, INSTANCE_PORT_ATTRIBUTE, InstanceRecord, RegistryClient, RegistryClientFactory,
    RegistryError, RegistryErrorKind, ServiceQuery,
};
pub use resolver::resolve;
pub use service::{DiscoveryService, ServiceState};
pub use settings::{DiscoveryConfig, DiscoverySettings};
