//! Physical-interface classification.
//!
//! Partitions host NICs into the management network (agent/controller
//! traffic) and the compute network (tunnel endpoints to compute nodes)
//! based on the configured CIDR lists. An unconfigured list means
//! auto-detect, which is only allowed when a single qualifying physical
//! link exists.

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use tracing::debug;

use tc_netdev::{LinkAttrs, LinkBackend};

use crate::config::NetworkConfig;
use crate::error::{ConcentratorError, TcResult};

/// A classified address: the address and the physical link carrying it.
#[derive(Debug, Clone)]
pub struct PhysAddr {
    /// The interface address.
    pub address: Ipv4Network,
    /// The link carrying it.
    pub link: LinkAttrs,
}

/// The classifier result.
#[derive(Debug, Clone, Default)]
pub struct PhysTopology {
    /// Management-network addresses.
    pub management: Vec<PhysAddr>,
    /// Compute-network addresses.
    pub compute: Vec<PhysAddr>,
}

impl PhysTopology {
    /// The local endpoint used for tunnel creation: the first compute
    /// address.
    pub fn compute_endpoint(&self) -> Option<Ipv4Addr> {
        self.compute.first().map(|p| p.address.ip())
    }
}

fn classify_address(
    nets: &[Ipv4Network],
    address: Ipv4Network,
    link: &LinkAttrs,
    out: &mut Vec<PhysAddr>,
) {
    if nets.is_empty() {
        out.push(PhysAddr {
            address,
            link: link.clone(),
        });
        return;
    }
    for net in nets {
        if net.contains(address.ip()) {
            out.push(PhysAddr {
                address,
                link: link.clone(),
            });
        }
    }
}

/// Scans host links and classifies their addresses.
///
/// A link qualifies if it is a physical NIC, administratively up, and has
/// at least one IPv4 address. The same link (and address) may land in both
/// sets on a co-located host.
pub async fn classify(
    backend: &dyn LinkBackend,
    config: &NetworkConfig,
) -> TcResult<PhysTopology> {
    let links = backend.list_links().await?;

    let mut phys = PhysTopology::default();
    let mut candidates = 0usize;

    for link in &links {
        if !link.is_valid_physical() {
            continue;
        }
        let addrs = match backend.ipv4_addresses(link.index).await {
            Ok(addrs) if !addrs.is_empty() => addrs,
            // Links with no addresses (or unreadable ones) may just not
            // have acquired an address yet.
            _ => continue,
        };

        candidates += 1;
        for address in addrs {
            classify_address(&config.management_nets, address, link, &mut phys.management);
            classify_address(&config.compute_nets, address, link, &mut phys.compute);
        }
    }

    if phys.management.is_empty() {
        return Err(ConcentratorError::NoManagementAddress);
    }
    if phys.compute.is_empty() {
        return Err(ConcentratorError::NoComputeAddress);
    }
    if (config.management_nets.is_empty() || config.compute_nets.is_empty()) && candidates > 1 {
        return Err(ConcentratorError::AmbiguousAutoConfig { candidates });
    }

    debug!(
        management = phys.management.len(),
        compute = phys.compute.len(),
        "classified physical interfaces"
    );
    Ok(phys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_netdev::mock::MockBackend;

    fn net(s: &str) -> Ipv4Network {
        s.parse().unwrap()
    }

    fn config(mgmt: &[&str], compute: &[&str]) -> NetworkConfig {
        NetworkConfig {
            management_nets: mgmt.iter().map(|s| net(s)).collect(),
            compute_nets: compute.iter().map(|s| net(s)).collect(),
        }
    }

    #[tokio::test]
    async fn test_configured_split() {
        let backend = MockBackend::new();
        backend.add_phys("eth0", vec![net("10.1.0.2/16")], true);
        backend.add_phys("eth1", vec![net("10.2.0.2/16")], true);

        let phys = classify(&backend, &config(&["10.1.0.0/16"], &["10.2.0.0/16"]))
            .await
            .unwrap();
        assert_eq!(phys.management.len(), 1);
        assert_eq!(phys.compute.len(), 1);
        assert_eq!(phys.management[0].link.name, "eth0");
        assert_eq!(phys.compute[0].link.name, "eth1");
        assert_eq!(
            phys.compute_endpoint(),
            Some("10.2.0.2".parse::<Ipv4Addr>().unwrap())
        );
    }

    #[tokio::test]
    async fn test_colocated_link_lands_in_both_sets() {
        let backend = MockBackend::new();
        backend.add_phys("eth0", vec![net("10.1.0.2/16")], true);

        let phys = classify(&backend, &config(&["10.1.0.0/16"], &["10.1.0.0/16"]))
            .await
            .unwrap();
        assert_eq!(phys.management.len(), 1);
        assert_eq!(phys.compute.len(), 1);
    }

    #[tokio::test]
    async fn test_auto_detect_single_link() {
        let backend = MockBackend::new();
        backend.add_phys("eth0", vec![net("10.1.0.2/16")], true);

        let phys = classify(&backend, &config(&[], &[])).await.unwrap();
        assert_eq!(phys.management.len(), 1);
        assert_eq!(phys.compute.len(), 1);
    }

    #[tokio::test]
    async fn test_auto_detect_ambiguous() {
        let backend = MockBackend::new();
        backend.add_phys("eth0", vec![net("10.1.0.2/16")], true);
        backend.add_phys("eth1", vec![net("10.2.0.2/16")], true);

        let err = classify(&backend, &config(&[], &["10.2.0.0/16"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConcentratorError::AmbiguousAutoConfig { candidates: 2 }
        ));
    }

    #[tokio::test]
    async fn test_no_management_address() {
        let backend = MockBackend::new();
        backend.add_phys("eth0", vec![net("10.2.0.2/16")], true);

        let err = classify(&backend, &config(&["10.1.0.0/16"], &["10.2.0.0/16"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConcentratorError::NoManagementAddress));
    }

    #[tokio::test]
    async fn test_no_compute_address() {
        let backend = MockBackend::new();
        backend.add_phys("eth0", vec![net("10.1.0.2/16")], true);

        let err = classify(&backend, &config(&["10.1.0.0/16"], &["10.2.0.0/16"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConcentratorError::NoComputeAddress));
    }

    #[tokio::test]
    async fn test_down_and_addressless_links_skipped() {
        let backend = MockBackend::new();
        backend.add_phys("eth0", vec![net("10.1.0.2/16")], true);
        backend.add_phys("eth1", vec![net("10.9.0.2/16")], false);
        backend.add_phys("eth2", vec![], true);

        // Only eth0 qualifies, so auto-detect is unambiguous.
        let phys = classify(&backend, &config(&[], &[])).await.unwrap();
        assert_eq!(phys.management.len(), 1);
        assert_eq!(phys.management[0].link.name, "eth0");
    }
}
