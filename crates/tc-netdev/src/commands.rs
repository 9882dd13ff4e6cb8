//! Shell command builders for link operations.

use std::net::Ipv4Addr;

use crate::shell;

/// Build a bridge creation command.
pub fn build_add_bridge_cmd(name: &str) -> String {
    format!(
        "{} link add {} type bridge",
        shell::IP_CMD,
        shell::shellquote(name)
    )
}

/// Build a gretap creation command for a point-to-point tunnel endpoint.
pub fn build_add_gretap_cmd(name: &str, local: Ipv4Addr, remote: Ipv4Addr, key: u32) -> String {
    format!(
        "{} link add {} type gretap local {} remote {} key {}",
        shell::IP_CMD,
        shell::shellquote(name),
        local,
        remote,
        key
    )
}

/// Build an alias assignment command.
pub fn build_set_alias_cmd(name: &str, alias: &str) -> String {
    format!(
        "{} link set dev {} alias {}",
        shell::IP_CMD,
        shell::shellquote(name),
        shell::shellquote(alias)
    )
}

/// Build a link admin-up command.
pub fn build_link_up_cmd(name: &str) -> String {
    format!(
        "{} link set dev {} up",
        shell::IP_CMD,
        shell::shellquote(name)
    )
}

/// Build a master (bridge attach) command.
pub fn build_set_master_cmd(member: &str, master: &str) -> String {
    format!(
        "{} link set dev {} master {}",
        shell::IP_CMD,
        shell::shellquote(member),
        shell::shellquote(master)
    )
}

/// Build a link deletion command.
pub fn build_del_link_cmd(name: &str) -> String {
    format!(
        "{} link del dev {}",
        shell::IP_CMD,
        shell::shellquote(name)
    )
}

/// Build the IPv4 forwarding enable command.
///
/// The concentrator routes between tenant bridges, so the host must
/// forward.
pub fn build_enable_forwarding_cmd() -> String {
    format!("{} 1 > /proc/sys/net/ipv4/ip_forward", shell::ECHO_CMD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_add_bridge_cmd() {
        let cmd = build_add_bridge_cmd("tcb01ab23cd");
        assert!(cmd.contains("ip link add"));
        assert!(cmd.contains("tcb01ab23cd"));
        assert!(cmd.contains("type bridge"));
    }

    #[test]
    fn test_build_add_gretap_cmd() {
        let cmd = build_add_gretap_cmd(
            "tcg0f00ba44",
            "10.2.0.2".parse().unwrap(),
            "192.0.2.5".parse().unwrap(),
            42,
        );
        assert!(cmd.contains("type gretap"));
        assert!(cmd.contains("local 10.2.0.2"));
        assert!(cmd.contains("remote 192.0.2.5"));
        assert!(cmd.contains("key 42"));
    }

    #[test]
    fn test_build_set_alias_cmd() {
        let cmd = build_set_alias_cmd("tcb01ab23cd", "br_10.3.0.0+24");
        assert!(cmd.contains("alias"));
        assert!(cmd.contains("br_10.3.0.0+24"));
    }

    #[test]
    fn test_build_set_master_cmd() {
        let cmd = build_set_master_cmd("tcg0f00ba44", "tcb01ab23cd");
        assert!(cmd.contains("master"));
        assert!(cmd.contains("tcg0f00ba44"));
        assert!(cmd.contains("tcb01ab23cd"));
    }

    #[test]
    fn test_build_del_link_cmd() {
        let cmd = build_del_link_cmd("tcg0f00ba44");
        assert!(cmd.contains("link del dev"));
    }

    #[test]
    fn test_build_enable_forwarding_cmd() {
        let cmd = build_enable_forwarding_cmd();
        assert!(cmd.contains("ip_forward"));
        assert!(cmd.starts_with("/bin/echo 1"));
    }

    #[test]
    fn test_quoting_blocks_injection() {
        let cmd = build_del_link_cmd("tcg0; rm -rf /");
        assert!(cmd.contains("\"tcg0; rm -rf /\""));
    }
}
