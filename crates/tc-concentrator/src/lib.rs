//! Tenant concentrator topology manager.
//!
//! Maintains per-subnet tenant bridges with private DHCP service, stitches
//! remote compute-node subnets in over gretap tunnels, and reconstructs its
//! state from persistent kernel link aliases after a crash. Kernel access
//! goes through `tc-netdev`; DHCP daemons through `tc-dhcp`.

pub mod alias;
pub mod concentrator;
pub mod config;
pub mod error;
pub mod gate;
pub mod phys;
pub mod topology;

pub use concentrator::Concentrator;
pub use config::{ConcentratorConfig, NetworkConfig};
pub use error::{ConcentratorError, TcResult};
