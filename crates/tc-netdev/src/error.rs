//! Error types for kernel link operations.

use std::io;
use thiserror::Error;

/// Result type alias for link-layer operations.
pub type NetdevResult<T> = Result<T, NetdevError>;

/// Errors that can occur while reading or mutating kernel links.
#[derive(Debug, Error)]
pub enum NetdevError {
    /// Failed to spawn a shell command.
    #[error("failed to execute '{command}': {source}")]
    ShellExec {
        /// The command that failed to spawn.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned a non-zero exit code.
    #[error("command failed: '{command}' (exit code {exit_code}): {output}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Netlink read operation failed.
    #[error("netlink {operation} failed: {message}")]
    Netlink {
        /// The operation that failed (e.g., "link dump").
        operation: String,
        /// Error message.
        message: String,
    },

    /// No kernel link with the given name.
    #[error("link '{name}' not found")]
    LinkNotFound {
        /// The kernel interface name.
        name: String,
    },

    /// A link with the given name already exists.
    #[error("link '{name}' already exists")]
    LinkExists {
        /// The kernel interface name.
        name: String,
    },

    /// No kernel link carries the given alias.
    #[error("no link with alias '{alias}'")]
    AliasNotFound {
        /// The link alias.
        alias: String,
    },
}

impl NetdevError {
    /// Creates a netlink error from an operation name and any displayable cause.
    pub fn netlink(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Netlink {
            operation: operation.into(),
            message: cause.to_string(),
        }
    }

    /// Creates a link-not-found error.
    pub fn link_not_found(name: impl Into<String>) -> Self {
        Self::LinkNotFound { name: name.into() }
    }

    /// Creates an alias-not-found error.
    pub fn alias_not_found(alias: impl Into<String>) -> Self {
        Self::AliasNotFound {
            alias: alias.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetdevError::link_not_found("tcb01ab23cd");
        assert_eq!(err.to_string(), "link 'tcb01ab23cd' not found");
    }

    #[test]
    fn test_command_failed_display() {
        let err = NetdevError::CommandFailed {
            command: "/sbin/ip link del dev tcg0".to_string(),
            exit_code: 1,
            output: "Cannot find device \"tcg0\"".to_string(),
        };
        assert!(err.to_string().contains("exit code 1"));
        assert!(err.to_string().contains("Cannot find device"));
    }
}
