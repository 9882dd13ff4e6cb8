//! Link type definitions.

/// Kernel link kind as reported by the IFLA_LINKINFO attribute.
///
/// Only `Bridge` and `GreTap` participate in topology reconciliation;
/// everything else is either a candidate physical uplink or ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// A hardware NIC (no linkinfo kind reported).
    Physical,
    /// A software L2 bridge.
    Bridge,
    /// An Ethernet-over-GRE tunnel endpoint.
    GreTap,
    /// The loopback device.
    Loopback,
    /// Any other virtual link kind (veth, vlan, tun, ...).
    Other,
}

impl LinkKind {
    /// Returns the kernel's `type` keyword for this kind, if it has one.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Physical => "physical",
            LinkKind::Bridge => "bridge",
            LinkKind::GreTap => "gretap",
            LinkKind::Loopback => "loopback",
            LinkKind::Other => "other",
        }
    }
}

/// Attributes of a kernel link, as seen in a link dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAttrs {
    /// Kernel interface index.
    pub index: u32,
    /// Kernel interface name.
    pub name: String,
    /// Persistent alias label, if one has been assigned.
    pub alias: Option<String>,
    /// Link kind.
    pub kind: LinkKind,
    /// Administratively up.
    pub up: bool,
}

impl LinkAttrs {
    /// Returns true if this link is a candidate physical uplink:
    /// a hardware NIC that is administratively up.
    pub fn is_valid_physical(&self) -> bool {
        self.kind == LinkKind::Physical && self.up
    }
}
