//! Shared helpers for integration tests.

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use tc_concentrator::{Concentrator, ConcentratorConfig, NetworkConfig};
use tc_dhcp::mock::MockDhcpLauncher;
use tc_netdev::mock::MockBackend;

pub const TENANT: &str = "f47ac10b-58cc-4372-a567-0e02b2c3d479";
pub const CONCENTRATOR: &str = "936da01f-9abd-4d9d-80c7-02af85c822a8";

pub fn net(s: &str) -> Ipv4Network {
    s.parse().unwrap()
}

pub fn addr(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

pub fn test_config() -> ConcentratorConfig {
    ConcentratorConfig {
        tenant_id: TENANT.parse().unwrap(),
        concentrator_id: CONCENTRATOR.parse().unwrap(),
        network: Some(NetworkConfig {
            management_nets: vec![net("10.1.0.0/16")],
            compute_nets: vec![net("10.2.0.0/16")],
        }),
        public_ips: Vec::new(),
        api_timeout_secs: 1,
        dhcp_state_dir: PathBuf::from("/tmp/tc-test-dhcp"),
    }
}

/// Seeds the management and compute uplinks scenario tests expect.
pub fn seed_phys_links(backend: &MockBackend) {
    backend.add_phys("eth0", vec![net("10.1.0.2/16")], true);
    backend.add_phys("eth1", vec![net("10.2.0.2/16")], true);
}

/// A mock-backed concentrator, seeded and initialized.
pub async fn ready_concentrator(
    backend: Arc<MockBackend>,
    launcher: Arc<MockDhcpLauncher>,
) -> Concentrator {
    seed_phys_links(&backend);
    let tc = Concentrator::new(test_config(), backend, launcher);
    tc.init().await.expect("init failed");
    tc
}
