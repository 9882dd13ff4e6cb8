//! Per-bridge DHCP daemon supervision for the tenant concentrator.
//!
//! Every tenant bridge runs a private dnsmasq instance for its subnet. This
//! crate owns the launch/attach/restart/stop lifecycle of those instances
//! and survives agent restarts by re-attaching through recorded pid files.

pub mod dnsmasq;
pub mod error;
pub mod mock;

pub use dnsmasq::{DhcpLauncher, DhcpServer, Dnsmasq, DnsmasqLauncher};
pub use error::{DhcpError, DhcpResult};
