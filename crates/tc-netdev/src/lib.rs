//! Kernel network-link layer for the tenant concentrator.
//!
//! Provides the link backend (netlink dumps for reads, `/sbin/ip` for
//! mutations), typed device handles for bridges, gretap tunnel endpoints
//! and generic links, and an in-memory mock backend for tests.

pub mod backend;
pub mod commands;
pub mod devices;
pub mod error;
pub mod mock;
pub mod shell;
pub mod types;

pub use backend::{LinkBackend, NetlinkBackend};
pub use devices::{Bridge, GreTap, Vnic};
pub use error::{NetdevError, NetdevResult};
pub use types::{LinkAttrs, LinkKind};
