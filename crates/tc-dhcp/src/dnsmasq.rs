//! dnsmasq supervision.
//!
//! Each tenant bridge gets its own dnsmasq instance serving the bridge's
//! subnet. The supervisor owns the instance's on-disk state (config, pid
//! file, lease file) under a state directory, keyed by the subnet identity,
//! so a restarted agent can re-attach to daemons that survived it.

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{DhcpError, DhcpResult};

/// Path to the dnsmasq binary.
pub const DNSMASQ_CMD: &str = "/usr/sbin/dnsmasq";

/// DHCP lease lifetime handed to clients.
const LEASE_TIME: &str = "12h";

/// A supervised DHCP daemon serving one bridge.
#[async_trait]
pub trait DhcpServer: Send + Sync {
    /// Re-attaches to an already-running daemon; returns its pid.
    async fn attach(&mut self) -> DhcpResult<i32>;

    /// Stops any running daemon and starts a fresh one.
    async fn restart(&mut self) -> DhcpResult<()>;

    /// Stops the daemon and removes its on-disk state.
    async fn stop(&mut self) -> DhcpResult<()>;
}

/// Creates [`DhcpServer`] handles for bridges.
///
/// `launch` applies the recovery policy: attach to a surviving daemon if
/// one matches the recorded state, otherwise (re)start one.
#[async_trait]
pub trait DhcpLauncher: Send + Sync {
    /// Returns a serving daemon handle for the given bridge.
    async fn launch(
        &self,
        subnet_id: &str,
        tenant: &str,
        subnet: Ipv4Network,
        bridge_name: &str,
    ) -> DhcpResult<Box<dyn DhcpServer>>;
}

/// Computes the pool handed to clients: everything after the gateway
/// address up to (not including) broadcast.
fn dhcp_range(subnet: Ipv4Network) -> DhcpResult<(Ipv4Addr, Ipv4Addr)> {
    let network = u32::from(subnet.network());
    let broadcast = u32::from(subnet.broadcast());
    // network, gateway, at least one lease, broadcast
    if broadcast - network < 3 {
        return Err(DhcpError::SubnetTooSmall {
            subnet: subnet.to_string(),
        });
    }
    Ok((Ipv4Addr::from(network + 2), Ipv4Addr::from(broadcast - 1)))
}

/// One dnsmasq instance bound to a bridge.
pub struct Dnsmasq {
    subnet_id: String,
    tenant: String,
    subnet: Ipv4Network,
    bridge_name: String,
    conf_path: PathBuf,
    pid_path: PathBuf,
    lease_path: PathBuf,
}

impl Dnsmasq {
    /// Builds the supervisor for a bridge. No process is touched until
    /// `attach` or `restart`.
    pub fn new(
        state_dir: &Path,
        subnet_id: &str,
        tenant: &str,
        subnet: Ipv4Network,
        bridge_name: &str,
    ) -> Self {
        Self {
            subnet_id: subnet_id.to_string(),
            tenant: tenant.to_string(),
            subnet,
            bridge_name: bridge_name.to_string(),
            conf_path: state_dir.join(format!("{subnet_id}.conf")),
            pid_path: state_dir.join(format!("{subnet_id}.pid")),
            lease_path: state_dir.join(format!("{subnet_id}.leases")),
        }
    }

    /// Renders the instance configuration.
    fn render_conf(&self) -> DhcpResult<String> {
        let (start, end) = dhcp_range(self.subnet)?;
        let gateway = Ipv4Addr::from(u32::from(self.subnet.network()) + 1);
        Ok(format!(
            "# tenant {tenant} subnet {subnet}\n\
             interface={bridge}\n\
             bind-interfaces\n\
             except-interface=lo\n\
             no-hosts\n\
             no-resolv\n\
             dhcp-leasefile={leases}\n\
             dhcp-range={start},{end},{lease_time}\n\
             dhcp-option=option:router,{gateway}\n",
            tenant = self.tenant,
            subnet = self.subnet,
            bridge = self.bridge_name,
            leases = self.lease_path.display(),
            start = start,
            end = end,
            lease_time = LEASE_TIME,
            gateway = gateway,
        ))
    }

    async fn read_pid(&self) -> DhcpResult<i32> {
        let content = tokio::fs::read_to_string(&self.pid_path)
            .await
            .map_err(|_| DhcpError::NotRunning {
                id: self.subnet_id.clone(),
            })?;
        content
            .trim()
            .parse::<i32>()
            .map_err(|_| DhcpError::BadPidFile {
                id: self.subnet_id.clone(),
                content: content.trim().to_string(),
            })
    }

    async fn spawn(&self) -> DhcpResult<()> {
        if let Some(dir) = self.conf_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&self.conf_path, self.render_conf()?).await?;

        // dnsmasq daemonizes itself; the foreground process exits once the
        // daemon is up and the pid file is written.
        let status = Command::new(DNSMASQ_CMD)
            .arg(format!("--conf-file={}", self.conf_path.display()))
            .arg(format!("--pid-file={}", self.pid_path.display()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(DhcpError::SpawnFailed {
                id: self.subnet_id.clone(),
                exit_code: status.code().unwrap_or(-1),
            });
        }
        info!(id = %self.subnet_id, bridge = %self.bridge_name, "dnsmasq started");
        Ok(())
    }

    async fn remove_state_files(&self) {
        for path in [&self.pid_path, &self.conf_path, &self.lease_path] {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove dnsmasq state file");
                }
            }
        }
    }
}

#[async_trait]
impl DhcpServer for Dnsmasq {
    async fn attach(&mut self) -> DhcpResult<i32> {
        let pid = self.read_pid().await?;
        let cmdline = tokio::fs::read(format!("/proc/{pid}/cmdline"))
            .await
            .map_err(|_| DhcpError::NotRunning {
                id: self.subnet_id.clone(),
            })?;
        let cmdline = String::from_utf8_lossy(&cmdline);
        if !cmdline.contains(&self.conf_path.display().to_string()) {
            return Err(DhcpError::NotRunning {
                id: self.subnet_id.clone(),
            });
        }
        debug!(id = %self.subnet_id, pid, "attached to running dnsmasq");
        Ok(pid)
    }

    async fn restart(&mut self) -> DhcpResult<()> {
        if let Err(e) = self.stop().await {
            debug!(id = %self.subnet_id, error = %e, "no previous dnsmasq to stop");
        }
        self.spawn().await
    }

    async fn stop(&mut self) -> DhcpResult<()> {
        let pid = self.read_pid().await?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|e| DhcpError::Signal {
            pid,
            message: e.to_string(),
        })?;
        self.remove_state_files().await;
        info!(id = %self.subnet_id, pid, "dnsmasq stopped");
        Ok(())
    }
}

/// Launcher for real dnsmasq instances under a state directory.
pub struct DnsmasqLauncher {
    state_dir: PathBuf,
}

impl DnsmasqLauncher {
    /// Creates a launcher keeping per-instance state under `state_dir`.
    pub fn new(state_dir: PathBuf) -> Self {
        Self { state_dir }
    }
}

#[async_trait]
impl DhcpLauncher for DnsmasqLauncher {
    async fn launch(
        &self,
        subnet_id: &str,
        tenant: &str,
        subnet: Ipv4Network,
        bridge_name: &str,
    ) -> DhcpResult<Box<dyn DhcpServer>> {
        let mut dns = Dnsmasq::new(&self.state_dir, subnet_id, tenant, subnet, bridge_name);
        match dns.attach().await {
            Ok(pid) => {
                info!(id = %subnet_id, pid, "re-attached to dnsmasq");
            }
            Err(_) => {
                dns.restart().await?;
            }
        }
        Ok(Box::new(dns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn subnet(s: &str) -> Ipv4Network {
        s.parse().unwrap()
    }

    #[test]
    fn test_dhcp_range_slash24() {
        let (start, end) = dhcp_range(subnet("10.3.0.0/24")).unwrap();
        assert_eq!(start, "10.3.0.2".parse::<Ipv4Addr>().unwrap());
        assert_eq!(end, "10.3.0.254".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn test_dhcp_range_slash30() {
        let (start, end) = dhcp_range(subnet("10.3.0.0/30")).unwrap();
        assert_eq!(start, "10.3.0.2".parse::<Ipv4Addr>().unwrap());
        assert_eq!(end, "10.3.0.2".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn test_dhcp_range_too_small() {
        assert!(matches!(
            dhcp_range(subnet("10.3.0.0/31")),
            Err(DhcpError::SubnetTooSmall { .. })
        ));
    }

    #[test]
    fn test_render_conf() {
        let dir = tempdir().unwrap();
        let dns = Dnsmasq::new(
            dir.path(),
            "br_10.3.0.0+24",
            "tenant-a",
            subnet("10.3.0.0/24"),
            "tcb01ab23cd",
        );
        let conf = dns.render_conf().unwrap();
        assert!(conf.contains("interface=tcb01ab23cd"));
        assert!(conf.contains("dhcp-range=10.3.0.2,10.3.0.254,12h"));
        assert!(conf.contains("dhcp-option=option:router,10.3.0.1"));
    }

    #[tokio::test]
    async fn test_attach_without_state_reports_not_running() {
        let dir = tempdir().unwrap();
        let mut dns = Dnsmasq::new(
            dir.path(),
            "br_10.3.0.0+24",
            "tenant-a",
            subnet("10.3.0.0/24"),
            "tcb01ab23cd",
        );
        assert!(matches!(
            dns.attach().await,
            Err(DhcpError::NotRunning { .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_pid_file() {
        let dir = tempdir().unwrap();
        let mut dns = Dnsmasq::new(
            dir.path(),
            "br_10.3.0.0+24",
            "tenant-a",
            subnet("10.3.0.0/24"),
            "tcb01ab23cd",
        );
        tokio::fs::write(dir.path().join("br_10.3.0.0+24.pid"), "junk")
            .await
            .unwrap();
        assert!(matches!(
            dns.attach().await,
            Err(DhcpError::BadPidFile { .. })
        ));
    }
}
