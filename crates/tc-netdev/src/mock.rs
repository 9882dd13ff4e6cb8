//! In-memory link backend for tests.
//!
//! Models the kernel link table as a map plus per-operation counters, so
//! lifecycle tests can assert exactly how many kernel mutations happened
//! and inspect the resulting state. Create calls can be given an artificial
//! latency to widen race windows in concurrency tests, and the next
//! bridge/gretap creation can be made to fail for error-path coverage.

use ipnetwork::Ipv4Network;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::LinkBackend;
use crate::error::{NetdevError, NetdevResult};
use crate::types::{LinkAttrs, LinkKind};

/// One simulated kernel link.
#[derive(Debug, Clone)]
pub struct MockLink {
    /// Kernel interface index.
    pub index: u32,
    /// Kernel interface name.
    pub name: String,
    /// Persistent alias, if assigned.
    pub alias: Option<String>,
    /// Link kind.
    pub kind: LinkKind,
    /// Administratively up.
    pub up: bool,
    /// Assigned IPv4 addresses.
    pub addrs: Vec<Ipv4Network>,
    /// Name of the bridge this link is enslaved to, if any.
    pub master: Option<String>,
    /// Tunnel parameters for gretap links: (local, remote, key).
    pub gre: Option<(Ipv4Addr, Ipv4Addr, u32)>,
}

#[derive(Default)]
struct MockState {
    links: HashMap<String, MockLink>,
    next_index: u32,
}

impl MockState {
    fn alloc_index(&mut self) -> u32 {
        self.next_index += 1;
        self.next_index
    }
}

/// In-memory [`LinkBackend`].
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    create_latency: Option<Duration>,
    bridge_creates: AtomicUsize,
    gretap_creates: AtomicUsize,
    link_deletes: AtomicUsize,
    attaches: AtomicUsize,
    forwarding_enables: AtomicUsize,
    fail_next_bridge_create: AtomicBool,
    fail_next_gretap_create: AtomicBool,
}

impl MockBackend {
    /// Creates an empty mock kernel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock kernel whose create calls sleep for `latency` before
    /// taking effect.
    pub fn with_create_latency(latency: Duration) -> Self {
        Self {
            create_latency: Some(latency),
            ..Self::default()
        }
    }

    /// Seeds a physical NIC carrying the given addresses.
    pub fn add_phys(&self, name: &str, addrs: Vec<Ipv4Network>, up: bool) -> u32 {
        let mut state = self.state.lock();
        let index = state.alloc_index();
        state.links.insert(
            name.to_string(),
            MockLink {
                index,
                name: name.to_string(),
                alias: None,
                kind: LinkKind::Physical,
                up,
                addrs,
                master: None,
                gre: None,
            },
        );
        index
    }

    /// Seeds an arbitrary link, for reconstruction tests.
    pub fn add_link(&self, kind: LinkKind, name: &str, alias: Option<&str>) -> u32 {
        let mut state = self.state.lock();
        let index = state.alloc_index();
        state.links.insert(
            name.to_string(),
            MockLink {
                index,
                name: name.to_string(),
                alias: alias.map(str::to_string),
                kind,
                up: true,
                addrs: Vec::new(),
                master: None,
                gre: None,
            },
        );
        index
    }

    /// Arms a failure for the next bridge creation.
    pub fn fail_next_bridge_create(&self) {
        self.fail_next_bridge_create.store(true, Ordering::SeqCst);
    }

    /// Arms a failure for the next gretap creation.
    pub fn fail_next_gretap_create(&self) {
        self.fail_next_gretap_create.store(true, Ordering::SeqCst);
    }

    /// Number of bridge creations attempted (including injected failures).
    pub fn bridge_creates(&self) -> usize {
        self.bridge_creates.load(Ordering::SeqCst)
    }

    /// Number of gretap creations attempted (including injected failures).
    pub fn gretap_creates(&self) -> usize {
        self.gretap_creates.load(Ordering::SeqCst)
    }

    /// Number of link deletions performed.
    pub fn link_deletes(&self) -> usize {
        self.link_deletes.load(Ordering::SeqCst)
    }

    /// Number of bridge attachments performed.
    pub fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    /// Number of forwarding enables performed.
    pub fn forwarding_enables(&self) -> usize {
        self.forwarding_enables.load(Ordering::SeqCst)
    }

    /// Snapshot of the simulated link table.
    pub fn links(&self) -> Vec<MockLink> {
        self.state.lock().links.values().cloned().collect()
    }

    /// Looks up a simulated link by alias.
    pub fn find_by_alias(&self, alias: &str) -> Option<MockLink> {
        self.state
            .lock()
            .links
            .values()
            .find(|l| l.alias.as_deref() == Some(alias))
            .cloned()
    }

    /// The master of a link, if it is enslaved.
    pub fn master_of(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .links
            .get(name)
            .and_then(|l| l.master.clone())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.create_latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl LinkBackend for MockBackend {
    async fn list_links(&self) -> NetdevResult<Vec<LinkAttrs>> {
        let state = self.state.lock();
        let mut links: Vec<LinkAttrs> = state
            .links
            .values()
            .map(|l| LinkAttrs {
                index: l.index,
                name: l.name.clone(),
                alias: l.alias.clone(),
                kind: l.kind,
                up: l.up,
            })
            .collect();
        links.sort_by_key(|l| l.index);
        Ok(links)
    }

    async fn link_by_name(&self, name: &str) -> NetdevResult<LinkAttrs> {
        let state = self.state.lock();
        state
            .links
            .get(name)
            .map(|l| LinkAttrs {
                index: l.index,
                name: l.name.clone(),
                alias: l.alias.clone(),
                kind: l.kind,
                up: l.up,
            })
            .ok_or_else(|| NetdevError::link_not_found(name))
    }

    async fn ipv4_addresses(&self, index: u32) -> NetdevResult<Vec<Ipv4Network>> {
        let state = self.state.lock();
        state
            .links
            .values()
            .find(|l| l.index == index)
            .map(|l| l.addrs.clone())
            .ok_or_else(|| NetdevError::netlink("address dump", format!("no link {index}")))
    }

    async fn add_bridge(&self, name: &str) -> NetdevResult<LinkAttrs> {
        self.bridge_creates.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_next_bridge_create.swap(false, Ordering::SeqCst) {
            return Err(NetdevError::netlink("link add", "injected bridge failure"));
        }
        let mut state = self.state.lock();
        if state.links.contains_key(name) {
            return Err(NetdevError::LinkExists {
                name: name.to_string(),
            });
        }
        let index = state.alloc_index();
        state.links.insert(
            name.to_string(),
            MockLink {
                index,
                name: name.to_string(),
                alias: None,
                kind: LinkKind::Bridge,
                up: false,
                addrs: Vec::new(),
                master: None,
                gre: None,
            },
        );
        Ok(LinkAttrs {
            index,
            name: name.to_string(),
            alias: None,
            kind: LinkKind::Bridge,
            up: false,
        })
    }

    async fn add_gretap(
        &self,
        name: &str,
        local: Ipv4Addr,
        remote: Ipv4Addr,
        key: u32,
    ) -> NetdevResult<LinkAttrs> {
        self.gretap_creates.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_next_gretap_create.swap(false, Ordering::SeqCst) {
            return Err(NetdevError::netlink("link add", "injected gretap failure"));
        }
        let mut state = self.state.lock();
        if state.links.contains_key(name) {
            return Err(NetdevError::LinkExists {
                name: name.to_string(),
            });
        }
        let index = state.alloc_index();
        state.links.insert(
            name.to_string(),
            MockLink {
                index,
                name: name.to_string(),
                alias: None,
                kind: LinkKind::GreTap,
                up: false,
                addrs: Vec::new(),
                master: None,
                gre: Some((local, remote, key)),
            },
        );
        Ok(LinkAttrs {
            index,
            name: name.to_string(),
            alias: None,
            kind: LinkKind::GreTap,
            up: false,
        })
    }

    async fn set_alias(&self, name: &str, alias: &str) -> NetdevResult<()> {
        let mut state = self.state.lock();
        let link = state
            .links
            .get_mut(name)
            .ok_or_else(|| NetdevError::link_not_found(name))?;
        link.alias = Some(alias.to_string());
        Ok(())
    }

    async fn set_up(&self, name: &str) -> NetdevResult<()> {
        let mut state = self.state.lock();
        let link = state
            .links
            .get_mut(name)
            .ok_or_else(|| NetdevError::link_not_found(name))?;
        link.up = true;
        Ok(())
    }

    async fn set_master(&self, member: &str, master: &str) -> NetdevResult<()> {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if !state.links.contains_key(master) {
            return Err(NetdevError::link_not_found(master));
        }
        let link = state
            .links
            .get_mut(member)
            .ok_or_else(|| NetdevError::link_not_found(member))?;
        link.master = Some(master.to_string());
        Ok(())
    }

    async fn del_link(&self, name: &str) -> NetdevResult<()> {
        self.link_deletes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.links.remove(name).is_none() {
            return Err(NetdevError::link_not_found(name));
        }
        Ok(())
    }

    async fn enable_ipv4_forwarding(&self) -> NetdevResult<()> {
        self.forwarding_enables.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
