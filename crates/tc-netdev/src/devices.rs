//! Typed handles over kernel links.
//!
//! A handle pairs a logical identity (the persistent alias, its `global_id`)
//! with the kernel name and index of the device realizing it. Handles do not
//! own kernel state; they describe it.

use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::info;

use crate::backend::LinkBackend;
use crate::error::NetdevResult;

/// A software L2 bridge.
pub struct Bridge {
    global_id: String,
    link_name: String,
    index: u32,
    backend: Arc<dyn LinkBackend>,
}

impl Bridge {
    /// Creates a handle for a bridge that is about to be created under
    /// `link_name`.
    pub fn new(global_id: String, link_name: String, backend: Arc<dyn LinkBackend>) -> Self {
        Self {
            global_id,
            link_name,
            index: 0,
            backend,
        }
    }

    /// Creates a handle for an existing bridge known only by alias;
    /// [`Bridge::get_device`] resolves the kernel name and index.
    pub fn from_alias(global_id: String, backend: Arc<dyn LinkBackend>) -> Self {
        Self::new(global_id, String::new(), backend)
    }

    /// The persistent alias identifying this bridge.
    pub fn global_id(&self) -> &str {
        &self.global_id
    }

    /// The kernel interface name.
    pub fn name(&self) -> &str {
        &self.link_name
    }

    /// The kernel interface index (0 until created or resolved).
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Fills in the kernel name and index resolved elsewhere.
    pub fn resolve(&mut self, link_name: String, index: u32) {
        self.link_name = link_name;
        self.index = index;
    }

    /// Creates the kernel bridge and stamps the alias on it.
    pub async fn create(&mut self) -> NetdevResult<()> {
        let attrs = self.backend.add_bridge(&self.link_name).await?;
        self.index = attrs.index;
        self.backend
            .set_alias(&self.link_name, &self.global_id)
            .await?;
        info!(name = %self.link_name, alias = %self.global_id, "bridge created");
        Ok(())
    }

    /// Brings the bridge up.
    pub async fn enable(&self) -> NetdevResult<()> {
        self.backend.set_up(&self.link_name).await
    }

    /// Resolves the kernel device carrying this bridge's alias.
    pub async fn get_device(&mut self) -> NetdevResult<()> {
        let attrs = self.backend.link_by_alias(&self.global_id).await?;
        self.link_name = attrs.name;
        self.index = attrs.index;
        Ok(())
    }

    /// Deletes the kernel bridge.
    pub async fn destroy(&self) -> NetdevResult<()> {
        self.backend.del_link(&self.link_name).await
    }
}

/// An Ethernet-over-GRE point-to-point tunnel endpoint.
pub struct GreTap {
    global_id: String,
    link_name: String,
    index: u32,
    local: Ipv4Addr,
    remote: Ipv4Addr,
    key: u32,
    backend: Arc<dyn LinkBackend>,
}

impl GreTap {
    /// Creates a handle for a tunnel endpoint between `local` and `remote`,
    /// keyed so that both ends agree on the subnet.
    pub fn new(
        global_id: String,
        link_name: String,
        local: Ipv4Addr,
        remote: Ipv4Addr,
        key: u32,
        backend: Arc<dyn LinkBackend>,
    ) -> Self {
        Self {
            global_id,
            link_name,
            index: 0,
            local,
            remote,
            key,
            backend,
        }
    }

    /// The persistent alias identifying this endpoint.
    pub fn global_id(&self) -> &str {
        &self.global_id
    }

    /// The kernel interface name.
    pub fn name(&self) -> &str {
        &self.link_name
    }

    /// The kernel interface index (0 until created or resolved).
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Fills in the kernel name and index resolved elsewhere.
    pub fn resolve(&mut self, link_name: String, index: u32) {
        self.link_name = link_name;
        self.index = index;
    }

    /// Creates the kernel gretap and stamps the alias on it.
    pub async fn create(&mut self) -> NetdevResult<()> {
        let attrs = self
            .backend
            .add_gretap(&self.link_name, self.local, self.remote, self.key)
            .await?;
        self.index = attrs.index;
        self.backend
            .set_alias(&self.link_name, &self.global_id)
            .await?;
        info!(
            name = %self.link_name,
            alias = %self.global_id,
            remote = %self.remote,
            "gre endpoint created"
        );
        Ok(())
    }

    /// Brings the endpoint up.
    pub async fn enable(&self) -> NetdevResult<()> {
        self.backend.set_up(&self.link_name).await
    }

    /// Attaches the endpoint to a bridge.
    pub async fn attach(&self, bridge: &Bridge) -> NetdevResult<()> {
        self.backend.set_master(&self.link_name, bridge.name()).await
    }

    /// Deletes the kernel gretap.
    pub async fn destroy(&self) -> NetdevResult<()> {
        self.backend.del_link(&self.link_name).await
    }
}

/// A generic handle over any concentrator-owned link, used by the shutdown
/// sweep where the concrete kind no longer matters.
pub struct Vnic {
    global_id: String,
    link_name: String,
    index: u32,
    backend: Arc<dyn LinkBackend>,
}

impl Vnic {
    /// Creates a handle for an already-resolved device.
    pub fn with_device(
        global_id: String,
        link_name: String,
        index: u32,
        backend: Arc<dyn LinkBackend>,
    ) -> Self {
        Self {
            global_id,
            link_name,
            index,
            backend,
        }
    }

    /// The persistent alias identifying this link.
    pub fn global_id(&self) -> &str {
        &self.global_id
    }

    /// The kernel interface name.
    pub fn name(&self) -> &str {
        &self.link_name
    }

    /// The kernel interface index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Deletes the kernel link.
    pub async fn destroy(&self) -> NetdevResult<()> {
        self.backend.del_link(&self.link_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use crate::types::LinkKind;

    #[tokio::test]
    async fn test_bridge_create_sets_index_and_alias() {
        let backend = Arc::new(MockBackend::new());
        let mut bridge = Bridge::new(
            "br_10.3.0.0+24".to_string(),
            "tcb01ab23cd".to_string(),
            backend.clone(),
        );
        bridge.create().await.expect("create failed");
        assert_ne!(bridge.index(), 0);

        let attrs = backend.link_by_name("tcb01ab23cd").await.unwrap();
        assert_eq!(attrs.alias.as_deref(), Some("br_10.3.0.0+24"));
        assert_eq!(attrs.kind, LinkKind::Bridge);
    }

    #[tokio::test]
    async fn test_gretap_attach() {
        let backend = Arc::new(MockBackend::new());
        let mut bridge = Bridge::new(
            "br_10.3.0.0+24".to_string(),
            "tcb01ab23cd".to_string(),
            backend.clone(),
        );
        bridge.create().await.unwrap();

        let mut gre = GreTap::new(
            "gre_10.3.0.0+24##192.0.2.5".to_string(),
            "tcg0f00ba44".to_string(),
            "10.2.0.2".parse().unwrap(),
            "192.0.2.5".parse().unwrap(),
            42,
            backend.clone(),
        );
        gre.create().await.unwrap();
        gre.attach(&bridge).await.unwrap();

        assert_eq!(
            backend.master_of("tcg0f00ba44").as_deref(),
            Some("tcb01ab23cd")
        );
    }

    #[tokio::test]
    async fn test_get_device_resolves_by_alias() {
        let backend = Arc::new(MockBackend::new());
        let mut bridge = Bridge::new(
            "br_10.3.0.0+24".to_string(),
            "tcb01ab23cd".to_string(),
            backend.clone(),
        );
        bridge.create().await.unwrap();
        let created_index = bridge.index();

        let mut found = Bridge::from_alias("br_10.3.0.0+24".to_string(), backend.clone());
        found.get_device().await.unwrap();
        assert_eq!(found.name(), "tcb01ab23cd");
        assert_eq!(found.index(), created_index);
    }

    #[tokio::test]
    async fn test_vnic_destroy() {
        let backend = Arc::new(MockBackend::new());
        let mut bridge = Bridge::new(
            "br_10.3.0.0+24".to_string(),
            "tcb01ab23cd".to_string(),
            backend.clone(),
        );
        bridge.create().await.unwrap();

        let vnic = Vnic::with_device(
            "br_10.3.0.0+24".to_string(),
            "tcb01ab23cd".to_string(),
            bridge.index(),
            backend.clone(),
        );
        vnic.destroy().await.unwrap();
        assert!(backend.link_by_name("tcb01ab23cd").await.is_err());
    }
}
