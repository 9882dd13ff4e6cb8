//! Mock DHCP supervision for tests.

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dnsmasq::{DhcpLauncher, DhcpServer};
use crate::error::{DhcpError, DhcpResult};

/// A recorded launch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    /// The subnet identity (bridge alias).
    pub subnet_id: String,
    /// The tenant the subnet belongs to.
    pub tenant: String,
    /// The served subnet.
    pub subnet: Ipv4Network,
    /// The bridge interface name.
    pub bridge_name: String,
}

/// Mock daemon handle; counts stops on the launcher's shared counter.
pub struct MockDhcp {
    subnet_id: String,
    stops: Arc<AtomicUsize>,
    fail_stop: bool,
}

#[async_trait]
impl DhcpServer for MockDhcp {
    async fn attach(&mut self) -> DhcpResult<i32> {
        Ok(1)
    }

    async fn restart(&mut self) -> DhcpResult<()> {
        Ok(())
    }

    async fn stop(&mut self) -> DhcpResult<()> {
        if self.fail_stop {
            return Err(DhcpError::NotRunning {
                id: self.subnet_id.clone(),
            });
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock launcher recording every launch.
#[derive(Default)]
pub struct MockDhcpLauncher {
    launches: Mutex<Vec<LaunchRecord>>,
    stops: Arc<AtomicUsize>,
    fail_next_stop: AtomicBool,
}

impl MockDhcpLauncher {
    /// Creates an empty mock launcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of daemons launched.
    pub fn launch_count(&self) -> usize {
        self.launches.lock().len()
    }

    /// Number of daemons stopped.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// All recorded launches.
    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.lock().clone()
    }

    /// Makes the next launched daemon fail its `stop`.
    pub fn fail_next_stop(&self) {
        self.fail_next_stop.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DhcpLauncher for MockDhcpLauncher {
    async fn launch(
        &self,
        subnet_id: &str,
        tenant: &str,
        subnet: Ipv4Network,
        bridge_name: &str,
    ) -> DhcpResult<Box<dyn DhcpServer>> {
        self.launches.lock().push(LaunchRecord {
            subnet_id: subnet_id.to_string(),
            tenant: tenant.to_string(),
            subnet,
            bridge_name: bridge_name.to_string(),
        });
        Ok(Box::new(MockDhcp {
            subnet_id: subnet_id.to_string(),
            stops: self.stops.clone(),
            fail_stop: self.fail_next_stop.swap(false, Ordering::SeqCst),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_launch_and_stop_counting() {
        let launcher = MockDhcpLauncher::new();
        let mut server = launcher
            .launch(
                "br_10.3.0.0+24",
                "tenant-a",
                "10.3.0.0/24".parse().unwrap(),
                "tcb01ab23cd",
            )
            .await
            .unwrap();
        assert_eq!(launcher.launch_count(), 1);
        server.stop().await.unwrap();
        assert_eq!(launcher.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_stop() {
        let launcher = MockDhcpLauncher::new();
        launcher.fail_next_stop();
        let mut server = launcher
            .launch(
                "br_10.3.0.0+24",
                "tenant-a",
                "10.3.0.0/24".parse().unwrap(),
                "tcb01ab23cd",
            )
            .await
            .unwrap();
        assert!(server.stop().await.is_err());
        assert_eq!(launcher.stop_count(), 0);
    }
}
