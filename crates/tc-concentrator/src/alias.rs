//! Subnet/alias codec and kernel link-name generation.
//!
//! The persistent alias stamped on a kernel link is the unique identity of a
//! logical resource; kernel names are random and disposable. The alias wire
//! format must stay bit-stable across releases:
//!
//! * bridge: `br_<ip>+<prefix>`, e.g. `br_10.3.0.0+24`
//! * gretap: `gre_<ip>+<prefix>##<remote>`, e.g. `gre_10.3.0.0+24##192.0.2.7`
//!
//! The `/` of CIDR notation is rendered as `+` so the subnet encoding is a
//! legal alias substring, and `##` separates the subnet encoding from the
//! remote endpoint so the reconciler can invert the mapping.

use ipnetwork::Ipv4Network;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::error::{ConcentratorError, TcResult};

/// Prefix of bridge aliases.
pub const BRIDGE_ALIAS_PREFIX: &str = "br_";

/// Prefix of gretap aliases.
pub const GRE_ALIAS_PREFIX: &str = "gre_";

/// Separator between the subnet encoding and the remote IP in gre aliases.
pub const GRE_ALIAS_SEPARATOR: &str = "##";

/// Bound on random name draws before giving up.
const NAME_RETRY_LIMIT: usize = 10;

/// Failures decoding a persisted alias.
#[derive(Debug, Clone, Error)]
pub enum AliasError {
    /// The alias does not carry the expected prefix.
    #[error("missing prefix '{expected}'")]
    MissingPrefix {
        /// The prefix that was expected.
        expected: &'static str,
    },

    /// A gre alias has no `##` separator.
    #[error("missing '##' separator")]
    MissingSeparator,

    /// The subnet part is not a valid CIDR encoding.
    #[error("bad subnet encoding '{encoded}'")]
    BadSubnet {
        /// The offending substring.
        encoded: String,
    },

    /// The remote part is not a valid IPv4 address.
    #[error("bad remote address '{encoded}'")]
    BadRemote {
        /// The offending substring.
        encoded: String,
    },
}

fn masked(subnet: Ipv4Network) -> Ipv4Network {
    Ipv4Network::new(subnet.network(), subnet.prefix()).unwrap_or(subnet)
}

/// Renders a subnet with `/` replaced by `+`. Host bits are masked off so
/// equivalent inputs produce the same encoding.
pub fn encode_subnet(subnet: Ipv4Network) -> String {
    masked(subnet).to_string().replace('/', "+")
}

/// Inverts [`encode_subnet`].
pub fn decode_subnet(encoded: &str) -> Result<Ipv4Network, AliasError> {
    let cidr = encoded.replace('+', "/");
    cidr.parse::<Ipv4Network>()
        .map(masked)
        .map_err(|_| AliasError::BadSubnet {
            encoded: encoded.to_string(),
        })
}

/// The alias of the bridge serving a subnet.
pub fn bridge_alias(subnet: Ipv4Network) -> String {
    format!("{BRIDGE_ALIAS_PREFIX}{}", encode_subnet(subnet))
}

/// The alias of the tunnel stitching `remote`'s copy of `subnet` in.
pub fn gre_alias(subnet: Ipv4Network, remote: Ipv4Addr) -> String {
    format!(
        "{GRE_ALIAS_PREFIX}{}{GRE_ALIAS_SEPARATOR}{remote}",
        encode_subnet(subnet)
    )
}

/// Decodes the subnet a bridge alias serves.
pub fn parse_bridge_alias(alias: &str) -> Result<Ipv4Network, AliasError> {
    let tail = alias
        .strip_prefix(BRIDGE_ALIAS_PREFIX)
        .ok_or(AliasError::MissingPrefix {
            expected: BRIDGE_ALIAS_PREFIX,
        })?;
    decode_subnet(tail)
}

/// Decodes the subnet and remote endpoint of a gre alias.
pub fn parse_gre_alias(alias: &str) -> Result<(Ipv4Network, Ipv4Addr), AliasError> {
    let tail = alias
        .strip_prefix(GRE_ALIAS_PREFIX)
        .ok_or(AliasError::MissingPrefix {
            expected: GRE_ALIAS_PREFIX,
        })?;
    let (subnet_part, remote_part) = tail
        .split_once(GRE_ALIAS_SEPARATOR)
        .ok_or(AliasError::MissingSeparator)?;
    let subnet = decode_subnet(subnet_part)?;
    let remote = remote_part
        .parse::<Ipv4Addr>()
        .map_err(|_| AliasError::BadRemote {
            encoded: remote_part.to_string(),
        })?;
    Ok((subnet, remote))
}

/// Kinds of links the concentrator names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkNameKind {
    /// Tenant bridge.
    Bridge,
    /// Tunnel endpoint.
    GreTap,
}

impl LinkNameKind {
    fn prefix(&self) -> &'static str {
        match self {
            LinkNameKind::Bridge => "tcb",
            LinkNameKind::GreTap => "tcg",
        }
    }
}

/// Draws a random kernel name not present in `names` and claims it.
///
/// Kernel names may collide (they are random, and the kernel table is shared
/// with links the concentrator never made), so the caller must hold the
/// topology lock: claiming the name here is what makes the reservation
/// race-free. Bounded at `NAME_RETRY_LIMIT` draws.
pub fn gen_link_name(kind: LinkNameKind, names: &mut HashSet<String>) -> TcResult<String> {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    for _ in 0..NAME_RETRY_LIMIT {
        // 3-char prefix + 8 hex chars stays within IFNAMSIZ.
        let name = format!("{}{:08x}", kind.prefix(), rng.gen::<u32>());
        if names.insert(name.clone()) {
            return Ok(name);
        }
    }
    Err(ConcentratorError::NameExhausted)
}
