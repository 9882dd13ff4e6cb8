//! Link backend trait and the rtnetlink-backed implementation.
//!
//! Reads (link dumps, address lists) go through a netlink socket; mutations
//! go through `/sbin/ip` command strings from [`crate::commands`]. The trait
//! seam exists so the topology manager can run against the in-memory
//! [`crate::mock::MockBackend`] in tests.

use async_trait::async_trait;
use futures::TryStreamExt;
use ipnetwork::Ipv4Network;
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::link::{InfoKind, LinkAttribute, LinkFlag, LinkInfo, LinkMessage};
use netlink_packet_route::AddressFamily;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

use crate::commands;
use crate::error::{NetdevError, NetdevResult};
use crate::shell;
use crate::types::{LinkAttrs, LinkKind};

/// Operations the topology manager needs from the kernel link table.
#[async_trait]
pub trait LinkBackend: Send + Sync {
    /// Dumps all kernel links.
    async fn list_links(&self) -> NetdevResult<Vec<LinkAttrs>>;

    /// Looks up a single link by kernel name.
    async fn link_by_name(&self, name: &str) -> NetdevResult<LinkAttrs>;

    /// Looks up a single link by its persistent alias.
    async fn link_by_alias(&self, alias: &str) -> NetdevResult<LinkAttrs> {
        self.list_links()
            .await?
            .into_iter()
            .find(|l| l.alias.as_deref() == Some(alias))
            .ok_or_else(|| NetdevError::alias_not_found(alias))
    }

    /// Lists the IPv4 addresses assigned to a link.
    async fn ipv4_addresses(&self, index: u32) -> NetdevResult<Vec<Ipv4Network>>;

    /// Creates a bridge link and returns its attributes.
    async fn add_bridge(&self, name: &str) -> NetdevResult<LinkAttrs>;

    /// Creates a gretap link and returns its attributes.
    async fn add_gretap(
        &self,
        name: &str,
        local: Ipv4Addr,
        remote: Ipv4Addr,
        key: u32,
    ) -> NetdevResult<LinkAttrs>;

    /// Assigns the persistent alias on a link.
    async fn set_alias(&self, name: &str, alias: &str) -> NetdevResult<()>;

    /// Brings a link administratively up.
    async fn set_up(&self, name: &str) -> NetdevResult<()>;

    /// Attaches `member` to the bridge `master`.
    async fn set_master(&self, member: &str, master: &str) -> NetdevResult<()>;

    /// Deletes a link.
    async fn del_link(&self, name: &str) -> NetdevResult<()>;

    /// Enables IPv4 forwarding on the host.
    async fn enable_ipv4_forwarding(&self) -> NetdevResult<()>;
}

/// The production backend: netlink dumps for reads, `/sbin/ip` for writes.
pub struct NetlinkBackend {
    handle: rtnetlink::Handle,
}

impl NetlinkBackend {
    /// Opens a netlink connection and spawns its IO driver on the runtime.
    pub fn new() -> NetdevResult<Self> {
        let (connection, handle, _messages) = rtnetlink::new_connection()
            .map_err(|e| NetdevError::netlink("connection setup", e))?;
        tokio::spawn(connection);
        Ok(Self { handle })
    }
}

fn link_attrs_from_message(msg: &LinkMessage) -> LinkAttrs {
    let mut name = String::new();
    let mut alias = None;
    let mut info_kind = None;

    for attr in &msg.attributes {
        match attr {
            LinkAttribute::IfName(n) => name = n.clone(),
            LinkAttribute::IfAlias(a) => {
                if !a.is_empty() {
                    alias = Some(a.clone());
                }
            }
            LinkAttribute::LinkInfo(infos) => {
                for info in infos {
                    if let LinkInfo::Kind(k) = info {
                        info_kind = Some(k.clone());
                    }
                }
            }
            _ => {}
        }
    }

    let loopback = msg.header.flags.contains(&LinkFlag::Loopback);
    let kind = if loopback {
        LinkKind::Loopback
    } else {
        match info_kind {
            None => LinkKind::Physical,
            Some(InfoKind::Bridge) => LinkKind::Bridge,
            Some(InfoKind::GreTap) => LinkKind::GreTap,
            Some(_) => LinkKind::Other,
        }
    };

    LinkAttrs {
        index: msg.header.index,
        name,
        alias,
        kind,
        up: msg.header.flags.contains(&LinkFlag::Up),
    }
}

fn ipv4_networks_from_message(msg: &AddressMessage) -> Vec<Ipv4Network> {
    let mut out = Vec::new();
    if msg.header.family != AddressFamily::Inet {
        return out;
    }
    for attr in &msg.attributes {
        if let AddressAttribute::Address(IpAddr::V4(addr)) = attr {
            if let Ok(net) = Ipv4Network::new(*addr, msg.header.prefix_len) {
                out.push(net);
            }
        }
    }
    out
}

#[async_trait]
impl LinkBackend for NetlinkBackend {
    async fn list_links(&self) -> NetdevResult<Vec<LinkAttrs>> {
        let mut req = self.handle.link().get().execute();
        let mut links = Vec::new();
        while let Some(msg) = req
            .try_next()
            .await
            .map_err(|e| NetdevError::netlink("link dump", e))?
        {
            links.push(link_attrs_from_message(&msg));
        }
        debug!(count = links.len(), "dumped kernel links");
        Ok(links)
    }

    async fn link_by_name(&self, name: &str) -> NetdevResult<LinkAttrs> {
        let mut req = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();
        match req.try_next().await {
            Ok(Some(msg)) => Ok(link_attrs_from_message(&msg)),
            Ok(None) => Err(NetdevError::link_not_found(name)),
            Err(_) => Err(NetdevError::link_not_found(name)),
        }
    }

    async fn ipv4_addresses(&self, index: u32) -> NetdevResult<Vec<Ipv4Network>> {
        let mut req = self
            .handle
            .address()
            .get()
            .set_link_index_filter(index)
            .execute();
        let mut addrs = Vec::new();
        while let Some(msg) = req
            .try_next()
            .await
            .map_err(|e| NetdevError::netlink("address dump", e))?
        {
            addrs.extend(ipv4_networks_from_message(&msg));
        }
        Ok(addrs)
    }

    async fn add_bridge(&self, name: &str) -> NetdevResult<LinkAttrs> {
        shell::exec_or_throw(&commands::build_add_bridge_cmd(name)).await?;
        self.link_by_name(name).await
    }

    async fn add_gretap(
        &self,
        name: &str,
        local: Ipv4Addr,
        remote: Ipv4Addr,
        key: u32,
    ) -> NetdevResult<LinkAttrs> {
        shell::exec_or_throw(&commands::build_add_gretap_cmd(name, local, remote, key)).await?;
        self.link_by_name(name).await
    }

    async fn set_alias(&self, name: &str, alias: &str) -> NetdevResult<()> {
        shell::exec_or_throw(&commands::build_set_alias_cmd(name, alias)).await?;
        Ok(())
    }

    async fn set_up(&self, name: &str) -> NetdevResult<()> {
        shell::exec_or_throw(&commands::build_link_up_cmd(name)).await?;
        Ok(())
    }

    async fn set_master(&self, member: &str, master: &str) -> NetdevResult<()> {
        shell::exec_or_throw(&commands::build_set_master_cmd(member, master)).await?;
        Ok(())
    }

    async fn del_link(&self, name: &str) -> NetdevResult<()> {
        shell::exec_or_throw(&commands::build_del_link_cmd(name)).await?;
        Ok(())
    }

    async fn enable_ipv4_forwarding(&self) -> NetdevResult<()> {
        shell::exec_or_throw(&commands::build_enable_forwarding_cmd()).await?;
        Ok(())
    }
}
