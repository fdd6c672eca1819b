//! Turns registry records into cluster node addresses.

use crate::error::ResolveError;
use crate::node::{ClusterIdentity, NodeAddress};
use crate::registry::{INSTANCE_PORT_ATTRIBUTE, InstanceRecord};

/// Resolve one instance record into the address of a cluster node.
///
/// The host is `{instance_id}.{service_name}.{namespace_name}`; the port comes
/// from the record's port attribute.
///
/// # Errors
///
/// Returns an error if the port attribute is missing or is not a valid port.
pub fn resolve(
    record: &InstanceRecord,
    identity: &ClusterIdentity,
) -> Result<NodeAddress, ResolveError> {
    let raw_port = record
        .attributes
        .get(INSTANCE_PORT_ATTRIBUTE)
        .ok_or(ResolveError::MissingPort)?;

    let port = raw_port
        .trim()
        .parse::<u16>()
        .map_err(|_| ResolveError::InvalidPort(raw_port.clone()))?;

    let host = format!(
        "{}.{}.{}",
        record.instance_id, record.service_name, record.namespace_name
    );

    Ok(NodeAddress::new(
        identity.protocol.clone(),
        identity.system.clone(),
        host,
        port,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ClusterIdentity {
        ClusterIdentity::new("akka.tcp", "sys")
    }

    #[test]
    fn test_resolve_concatenates_host() {
        let record = InstanceRecord::with_port("i-1", "svc", "ns", "2552");

        let address = resolve(&record, &identity()).unwrap();
        assert_eq!(address.host, "i-1.svc.ns");
        assert_eq!(address.port, 2552);
        assert_eq!(address.protocol, "akka.tcp");
        assert_eq!(address.cluster_name, "sys");
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let record = InstanceRecord::with_port("i-1", "svc", "ns", "2552");
        assert_eq!(
            resolve(&record, &identity()),
            resolve(&record, &identity())
        );
    }

    #[test]
    fn test_resolve_missing_port() {
        let record = InstanceRecord {
            instance_id: "i-1".to_string(),
            service_name: "svc".to_string(),
            namespace_name: "ns".to_string(),
            ..Default::default()
        };

        assert_eq!(
            resolve(&record, &identity()),
            Err(ResolveError::MissingPort)
        );
    }

    #[test]
    fn test_resolve_invalid_port() {
        for bad in ["", "http", "-1", "65536", "25.52"] {
            let record = InstanceRecord::with_port("i-1", "svc", "ns", bad);
            assert_eq!(
                resolve(&record, &identity()),
                Err(ResolveError::InvalidPort(bad.to_string())),
                "port {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_trims_port() {
        let record = InstanceRecord::with_port("i-1", "svc", "ns", " 2552 ");
        assert_eq!(resolve(&record, &identity()).unwrap().port, 2552);
    }
}
