//! The concentrator: reconciliation, subnet lifecycle, shutdown.
//!
//! One concentrator serves one tenant on one host. It keeps a bridge (plus
//! a private DHCP daemon) per tenant subnet and stitches remote compute-node
//! copies of each subnet in over gretap tunnels, acting as the routing hub
//! between them.
//!
//! Concurrent `add_remote_subnet` calls follow a reserve-then-realize
//! discipline: the winner of the in-memory reservation creates the kernel
//! objects outside the lock, and every loser waits on the record's ready
//! gate for the winner's result. The persistent link aliases written during
//! realization are what `rebuild_topology` inverts after a crash.

use ipnetwork::Ipv4Network;
use parking_lot::RwLock;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tc_dhcp::{DhcpLauncher, DhcpServer};
use tc_netdev::{Bridge, GreTap, LinkAttrs, LinkBackend, LinkKind, Vnic};

use crate::alias;
use crate::config::ConcentratorConfig;
use crate::error::{ConcentratorError, TcResult};
use crate::phys::{self, PhysTopology};
use crate::topology::{BridgeRecord, Topology};

/// A per-tenant concentrator.
pub struct Concentrator {
    config: ConcentratorConfig,
    backend: Arc<dyn LinkBackend>,
    dhcp: Arc<dyn DhcpLauncher>,
    api_timeout: Duration,
    phys: RwLock<Option<PhysTopology>>,
    topology: Mutex<Topology>,
    initialized: AtomicBool,
}

fn check_remote_subnet_args(
    subnet: Ipv4Network,
    subnet_key: u32,
    remote: Ipv4Addr,
) -> TcResult<()> {
    if subnet.ip().is_unspecified() {
        return Err(ConcentratorError::invalid_argument("subnet address"));
    }
    if subnet.prefix() == 0 {
        return Err(ConcentratorError::invalid_argument("subnet mask"));
    }
    if subnet_key == 0 {
        return Err(ConcentratorError::invalid_argument("subnet key"));
    }
    if remote.is_unspecified() {
        return Err(ConcentratorError::invalid_argument(
            "remote compute address",
        ));
    }
    Ok(())
}

impl Concentrator {
    /// Builds a concentrator over the given link backend and DHCP launcher.
    /// Nothing is touched until [`Concentrator::init`].
    pub fn new(
        config: ConcentratorConfig,
        backend: Arc<dyn LinkBackend>,
        dhcp: Arc<dyn DhcpLauncher>,
    ) -> Self {
        let api_timeout = config.api_timeout();
        Self {
            config,
            backend,
            dhcp,
            api_timeout,
            phys: RwLock::new(None),
            topology: Mutex::new(Topology::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// The tenant this concentrator serves.
    pub fn tenant_id(&self) -> uuid::Uuid {
        self.config.tenant_id
    }

    /// This concentrator's controller-assigned identity.
    pub fn concentrator_id(&self) -> uuid::Uuid {
        self.config.concentrator_id
    }

    /// The bound applied to every ready-gate wait.
    pub fn api_timeout(&self) -> Duration {
        self.api_timeout
    }

    fn tenant(&self) -> String {
        self.config.tenant_id.to_string()
    }

    fn ensure_initialized(&self) -> TcResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ConcentratorError::Uninitialized)
        }
    }

    fn compute_endpoint(&self) -> TcResult<Ipv4Addr> {
        self.phys
            .read()
            .as_ref()
            .and_then(|p| p.compute_endpoint())
            .ok_or_else(|| ConcentratorError::internal("no compute endpoint classified"))
    }

    /// Runs a closure against the topology tables under the lock.
    pub async fn inspect_topology<R>(&self, f: impl FnOnce(&Topology) -> R) -> R {
        let topo = self.topology.lock().await;
        f(&topo)
    }

    /// Discovers and classifies physical interfaces, rebuilds the topology
    /// from kernel state, and enables inter-bridge routing.
    ///
    /// Fails `Uninitialized` when no network configuration is present.
    pub async fn init(&self) -> TcResult<()> {
        let network = self
            .config
            .network
            .clone()
            .ok_or(ConcentratorError::Uninitialized)?;

        let phys = phys::classify(self.backend.as_ref(), &network).await?;
        info!(
            management = phys.management.len(),
            compute = phys.compute.len(),
            public_ips = self.config.public_ips.len(),
            "physical interfaces classified"
        );
        *self.phys.write() = Some(phys);

        {
            let mut topo = self.topology.lock().await;
            self.rebuild_locked(&mut topo).await?;
        }

        self.backend.enable_ipv4_forwarding().await?;
        self.initialized.store(true, Ordering::Release);
        info!(
            concentrator = %self.config.concentrator_id,
            tenant = %self.config.tenant_id,
            "concentrator initialized"
        );
        Ok(())
    }

    /// Rebuilds the topology tables from kernel state.
    ///
    /// The persistent aliases are the map from logical identity back to
    /// kernel objects; this is the inverse of the naming done by
    /// [`Concentrator::add_remote_subnet`]. Can be called after the agent
    /// crashed and lost its in-memory state, or on demand. On failure the
    /// store is left empty and the caller must retry.
    pub async fn rebuild_topology(&self) -> TcResult<()> {
        self.ensure_initialized()?;
        let mut topo = self.topology.lock().await;
        self.rebuild_locked(&mut topo).await
    }

    async fn rebuild_locked(&self, topo: &mut Topology) -> TcResult<()> {
        let links = self.backend.list_links().await?;
        topo.reinit();

        // Every kernel name is claimed, aliased or not: generated names must
        // never collide with anything already in the kernel table.
        for link in &links {
            topo.claim_name(&link.name);
            if let Some(link_alias) = &link.alias {
                topo.insert_recovered_link(link_alias, &link.name, link.index);
            }
        }

        if let Err(e) = self.rebuild_bridges(topo, &links).await {
            topo.reinit();
            return Err(e);
        }
        if let Err(e) = Self::verify_tunnels(topo, &links) {
            topo.reinit();
            return Err(e);
        }
        Ok(())
    }

    async fn rebuild_bridges(&self, topo: &mut Topology, links: &[LinkAttrs]) -> TcResult<()> {
        for link in links {
            if link.kind != LinkKind::Bridge {
                continue;
            }
            let Some(bridge_alias) = link.alias.as_deref() else {
                continue;
            };
            if !bridge_alias.starts_with(alias::BRIDGE_ALIAS_PREFIX) {
                continue;
            }

            let mut bridge = Bridge::from_alias(bridge_alias.to_string(), self.backend.clone());
            bridge.get_device().await?;

            let subnet = alias::parse_bridge_alias(bridge_alias)
                .map_err(|e| ConcentratorError::bad_alias(bridge_alias, e))?;

            let dhcp = self
                .dhcp
                .launch(bridge_alias, &self.tenant(), subnet, bridge.name())
                .await?;

            topo.register_bridge(
                bridge_alias,
                BridgeRecord {
                    tunnels: 0,
                    dhcp: Some(dhcp),
                },
            );
            debug!(alias = %bridge_alias, name = %bridge.name(), "bridge recovered");
        }
        Ok(())
    }

    fn verify_tunnels(topo: &mut Topology, links: &[LinkAttrs]) -> TcResult<()> {
        for link in links {
            if link.kind != LinkKind::GreTap {
                continue;
            }
            let Some(gre_alias) = link.alias.as_deref() else {
                continue;
            };
            if !gre_alias.starts_with(alias::GRE_ALIAS_PREFIX) {
                continue;
            }

            let (subnet, _remote) = alias::parse_gre_alias(gre_alias)
                .map_err(|e| ConcentratorError::bad_alias(gre_alias, e))?;
            let bridge_alias = alias::bridge_alias(subnet);

            if topo.link(&bridge_alias).is_none() {
                return Err(ConcentratorError::DanglingTunnel {
                    alias: gre_alias.to_string(),
                });
            }
            let Some(record) = topo.bridge_mut(&bridge_alias) else {
                return Err(ConcentratorError::DanglingTunnel {
                    alias: gre_alias.to_string(),
                });
            };
            record.tunnels += 1;
        }
        Ok(())
    }

    /// Attaches a remote compute node's copy of `subnet` to the local
    /// bridge for that subnet, creating bridge, DHCP daemon, and tunnel
    /// endpoint as needed.
    ///
    /// Returns the bridge's kernel name when this call created the bridge
    /// (the caller must plumb it into routing), `None` when the bridge
    /// pre-existed.
    pub async fn add_remote_subnet(
        &self,
        subnet: Ipv4Network,
        subnet_key: u32,
        remote: Ipv4Addr,
    ) -> TcResult<Option<String>> {
        self.ensure_initialized()?;
        check_remote_subnet_args(subnet, subnet_key, remote)?;
        let local = self.compute_endpoint()?;

        let bridge_alias = alias::bridge_alias(subnet);
        let gre_alias = alias::gre_alias(subnet, remote);

        let reservation = {
            let mut topo = self.topology.lock().await;
            topo.reserve_remote_subnet(&bridge_alias, &gre_alias)?
        };

        if !reservation.bridge_is_new && !reservation.gre_is_new {
            debug!(subnet = %subnet, remote = %remote, "remote subnet already attached");
            return Ok(None);
        }

        let mut bridge = Bridge::new(
            bridge_alias.clone(),
            reservation.bridge.name().to_string(),
            self.backend.clone(),
        );
        let mut gre = GreTap::new(
            gre_alias.clone(),
            reservation.gre.name().to_string(),
            local,
            remote,
            subnet_key,
            self.backend.clone(),
        );

        // Realize outside the lock; kernel calls are slow. Gates close no
        // matter how realization went, or peers would block until timeout.
        if reservation.bridge_is_new {
            let outcome = self.realize_bridge(&mut bridge, subnet).await;
            reservation.bridge.gate().close(bridge.index());
            match outcome {
                Ok(dhcp) => {
                    let mut topo = self.topology.lock().await;
                    if let Some(record) = topo.bridge_mut(&bridge_alias) {
                        record.dhcp = Some(dhcp);
                    }
                }
                Err(e) => {
                    reservation.gre.gate().close(gre.index());
                    return Err(e);
                }
            }
        }

        if reservation.gre_is_new {
            let outcome = self.realize_tunnel(&mut gre).await;
            reservation.gre.gate().close(gre.index());
            outcome?;
        }

        // Whether this caller created the devices or lost the race, both
        // must be usable before the attach.
        let bridge_index = reservation
            .bridge
            .gate()
            .wait(self.api_timeout)
            .await
            .ok_or_else(|| ConcentratorError::device_not_ready(&bridge_alias))?;
        let gre_index = reservation
            .gre
            .gate()
            .wait(self.api_timeout)
            .await
            .ok_or_else(|| ConcentratorError::device_not_ready(&gre_alias))?;
        bridge.resolve(reservation.bridge.name().to_string(), bridge_index);
        gre.resolve(reservation.gre.name().to_string(), gre_index);

        gre.attach(&bridge).await?;

        info!(
            subnet = %subnet,
            remote = %remote,
            bridge = %bridge.name(),
            tunnel = %gre.name(),
            "remote subnet attached"
        );
        if reservation.bridge_is_new {
            Ok(Some(bridge.name().to_string()))
        } else {
            Ok(None)
        }
    }

    async fn realize_bridge(
        &self,
        bridge: &mut Bridge,
        subnet: Ipv4Network,
    ) -> TcResult<Box<dyn DhcpServer>> {
        bridge.create().await?;
        bridge.enable().await?;
        let dhcp = self
            .dhcp
            .launch(bridge.global_id(), &self.tenant(), subnet, bridge.name())
            .await?;
        Ok(dhcp)
    }

    async fn realize_tunnel(&self, gre: &mut GreTap) -> TcResult<()> {
        gre.create().await?;
        gre.enable().await?;
        Ok(())
    }

    /// Detaches a remote compute node's copy of `subnet`.
    ///
    /// The bridge and its DHCP daemon are kept even when the last tunnel
    /// goes: they cost little, and instances come and go constantly. They
    /// are reclaimed at [`Concentrator::shutdown`].
    pub async fn del_remote_subnet(
        &self,
        subnet: Ipv4Network,
        subnet_key: u32,
        remote: Ipv4Addr,
    ) -> TcResult<()> {
        self.ensure_initialized()?;
        check_remote_subnet_args(subnet, subnet_key, remote)?;
        let local = self.compute_endpoint()?;

        let bridge_alias = alias::bridge_alias(subnet);
        let gre_alias = alias::gre_alias(subnet, remote);

        let mut topo = self.topology.lock().await;

        let Some(record) = topo.link(&gre_alias).cloned() else {
            warn!(alias = %gre_alias, "deleting a tunnel that does not exist");
            return Ok(());
        };

        match topo.bridge_mut(&bridge_alias) {
            Some(bridge_record) => {
                bridge_record.tunnels = bridge_record.tunnels.saturating_sub(1);
            }
            None => {
                warn!(alias = %bridge_alias, "internal error: no bridge record for tunnel being deleted");
            }
        }

        let index = record
            .gate()
            .wait(self.api_timeout)
            .await
            .ok_or_else(|| ConcentratorError::device_not_ready(&gre_alias))?;

        let name = record.name().to_string();
        topo.remove_link(&gre_alias, &name);

        let mut gre = GreTap::new(
            gre_alias.clone(),
            name,
            local,
            remote,
            subnet_key,
            self.backend.clone(),
        );
        gre.resolve(record.name().to_string(), index);
        gre.destroy().await?;

        info!(subnet = %subnet, remote = %remote, tunnel = %gre.name(), "remote subnet detached");
        Ok(())
    }

    /// Stops every DHCP daemon and tears down every concentrator-owned
    /// link, continuing past individual failures. Returns the last error
    /// observed, if any.
    pub async fn shutdown(&self) -> TcResult<()> {
        self.ensure_initialized()?;
        let mut topo = self.topology.lock().await;
        let mut last_error: Option<ConcentratorError> = None;

        let bridge_aliases: Vec<String> = topo.bridge_aliases().cloned().collect();
        for bridge_alias in bridge_aliases {
            let outcome = match topo
                .bridge_mut(&bridge_alias)
                .and_then(|record| record.dhcp.as_mut())
            {
                Some(dhcp) => dhcp.stop().await.map_err(ConcentratorError::from),
                None => Err(ConcentratorError::internal(format!(
                    "bridge '{bridge_alias}' has no dhcp handle"
                ))),
            };
            match outcome {
                Ok(()) => {
                    topo.remove_bridge(&bridge_alias);
                }
                Err(e) => {
                    warn!(alias = %bridge_alias, error = %e, "failed to stop dhcp daemon");
                    last_error = Some(e);
                }
            }
        }

        let link_aliases: Vec<String> = topo.link_aliases().cloned().collect();
        for link_alias in link_aliases {
            let Some(record) = topo.link(&link_alias).cloned() else {
                continue;
            };
            let Some(index) = record.gate().wait(self.api_timeout).await else {
                last_error = Some(ConcentratorError::device_not_ready(&link_alias));
                continue;
            };

            let vnic = Vnic::with_device(
                link_alias.clone(),
                record.name().to_string(),
                index,
                self.backend.clone(),
            );
            if let Err(e) = vnic.destroy().await {
                warn!(alias = %link_alias, error = %e, "failed to destroy link");
                last_error = Some(e.into());
                continue;
            }
            topo.remove_link(&link_alias, record.name());
        }

        match last_error {
            Some(e) => Err(e),
            None => {
                info!("topology drained");
                Ok(())
            }
        }
    }
}
