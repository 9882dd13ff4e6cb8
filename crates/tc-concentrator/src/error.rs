//! Error types for the topology manager.

use thiserror::Error;

use crate::alias::AliasError;

/// Result type alias for concentrator operations.
pub type TcResult<T> = Result<T, ConcentratorError>;

/// Errors surfaced by the concentrator API.
#[derive(Debug, Error)]
pub enum ConcentratorError {
    /// Operation called before a successful `init`.
    #[error("concentrator not initialized")]
    Uninitialized,

    /// A request parameter failed its precondition.
    #[error("invalid argument: {what}")]
    InvalidArgument {
        /// Which parameter failed.
        what: &'static str,
    },

    /// No physical link carries a management-network address.
    #[error("unable to associate with a management network")]
    NoManagementAddress,

    /// No physical link carries a compute-network address.
    #[error("unable to associate with a compute network")]
    NoComputeAddress,

    /// Auto-detection needs exactly one qualifying physical link.
    #[error("unable to autoconfigure networks: {candidates} candidate links")]
    AmbiguousAutoConfig {
        /// How many qualifying links were seen.
        candidates: usize,
    },

    /// Reconciliation found a tunnel whose bridge is gone.
    #[error("missing bridge for gre tunnel '{alias}'")]
    DanglingTunnel {
        /// The orphaned tunnel's alias.
        alias: String,
    },

    /// The link-name generator gave up.
    #[error("unable to generate a unique device name")]
    NameExhausted,

    /// A ready-gate wait exceeded the API timeout.
    #[error("device '{alias}' not ready within the api timeout")]
    DeviceNotReady {
        /// The alias being waited on.
        alias: String,
    },

    /// A persisted alias cannot be decoded.
    #[error("malformed alias '{alias}': {source}")]
    BadAlias {
        /// The offending alias.
        alias: String,
        /// The decode failure.
        #[source]
        source: AliasError,
    },

    /// Invariant violation; treat as a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Propagated from the kernel link layer.
    #[error(transparent)]
    Netdev(#[from] tc_netdev::NetdevError),

    /// Propagated from DHCP supervision.
    #[error(transparent)]
    Dhcp(#[from] tc_dhcp::DhcpError),
}

impl ConcentratorError {
    /// Creates an invalid-argument error.
    pub fn invalid_argument(what: &'static str) -> Self {
        Self::InvalidArgument { what }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a device-not-ready error.
    pub fn device_not_ready(alias: impl Into<String>) -> Self {
        Self::DeviceNotReady {
            alias: alias.into(),
        }
    }

    /// Creates a bad-alias error.
    pub fn bad_alias(alias: impl Into<String>, source: AliasError) -> Self {
        Self::BadAlias {
            alias: alias.into(),
            source,
        }
    }
}
