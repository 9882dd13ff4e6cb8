//! Error types for DHCP daemon supervision.

use std::io;
use thiserror::Error;

/// Result type alias for DHCP operations.
pub type DhcpResult<T> = Result<T, DhcpError>;

/// Errors that can occur while supervising a dnsmasq instance.
#[derive(Debug, Error)]
pub enum DhcpError {
    /// Filesystem or process IO failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// dnsmasq exited with a non-zero status while daemonizing.
    #[error("dnsmasq failed to start for '{id}' (exit code {exit_code})")]
    SpawnFailed {
        /// The subnet identity the daemon serves.
        id: String,
        /// The exit code.
        exit_code: i32,
    },

    /// No running dnsmasq instance matches the recorded state.
    #[error("no running dnsmasq instance for '{id}'")]
    NotRunning {
        /// The subnet identity the daemon serves.
        id: String,
    },

    /// The recorded pid file is unreadable or malformed.
    #[error("bad pid file for '{id}': {content}")]
    BadPidFile {
        /// The subnet identity the daemon serves.
        id: String,
        /// The offending file content.
        content: String,
    },

    /// Could not deliver a signal to the daemon.
    #[error("failed to signal dnsmasq pid {pid}: {message}")]
    Signal {
        /// The target pid.
        pid: i32,
        /// Error message.
        message: String,
    },

    /// The subnet has no room for a DHCP range.
    #[error("subnet {subnet} too small for a dhcp range")]
    SubnetTooSmall {
        /// The offending subnet.
        subnet: String,
    },
}
