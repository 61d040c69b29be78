//! Input validation and sanitization functions for rulesplice
//!
//! This module provides centralized validation for IP list entries and for
//! paths typed at the interactive prompt.

use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Validates a single IP list entry.
///
/// Accepts bare IPv4/IPv6 addresses and CIDR blocks.
///
/// # Errors
///
/// Returns `Err` if:
/// - The value is not an address or CIDR block
/// - The block covers the whole address space (`0.0.0.0/0`, `::/0`)
///
/// # Examples
///
/// ```
/// use rulesplice::validators::validate_ip_entry;
///
/// assert!(validate_ip_entry("203.0.113.7").is_ok());
/// assert!(validate_ip_entry("2001:db8::/32").is_ok());
/// assert!(validate_ip_entry("0.0.0.0/0").is_err());
/// assert!(validate_ip_entry("example.com").is_err());
/// ```
pub fn validate_ip_entry(value: &str) -> Result<IpNetwork, String> {
    let network: IpNetwork = value
        .parse()
        .map_err(|e| format!("not an IP address or CIDR block ({e})"))?;

    if network.prefix() == 0 {
        return Err("covers the entire address space".to_string());
    }

    Ok(network)
}

/// IPv4 blocks wider than this prefix get a breadth warning.
const WIDE_V4_PREFIX: u8 = 16;
/// IPv6 blocks wider than this prefix get a breadth warning.
const WIDE_V6_PREFIX: u8 = 32;

/// Notes on an allow-list entry that is valid but probably not what the
/// user meant.
///
/// An allow rule opens the NAS to every address the entry covers, so
/// over-wide blocks, blocks written with host bits and sources that can
/// never reach the NAS from outside are all worth a warning. Entries are
/// still accepted.
///
/// # Examples
///
/// ```
/// use rulesplice::validators::entry_warnings;
///
/// assert!(entry_warnings("203.0.113.7".parse().unwrap()).is_empty());
/// assert_eq!(entry_warnings("10.0.0.0/8".parse().unwrap()).len(), 2);
/// ```
pub fn entry_warnings(network: IpNetwork) -> Vec<String> {
    let mut notes = Vec::new();

    match network {
        IpNetwork::V4(net) if net.prefix() < WIDE_V4_PREFIX => notes.push(format!(
            "opens the NAS to {} addresses; list single hosts or narrower blocks unless all of them are trusted",
            1u64 << (32 - u32::from(net.prefix()))
        )),
        IpNetwork::V6(net) if net.prefix() < WIDE_V6_PREFIX => notes.push(format!(
            "/{} is wider than a whole provider allocation; a site is usually /48 or narrower",
            net.prefix()
        )),
        _ => {}
    }

    if network.ip() != network.network() {
        notes.push(format!(
            "has host bits set; the device may store it as {}/{}",
            network.network(),
            network.prefix()
        ));
    }

    if let Some(note) = unreachable_source(network.ip()) {
        notes.push(note.to_string());
    }

    notes
}

/// Sources that never show up as a remote client, or only from the LAN.
fn unreachable_source(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => {
            if v4.is_loopback() {
                Some("loopback traffic never passes the NAS firewall, so this rule never matches")
            } else if v4.is_multicast() || v4.is_broadcast() {
                Some("multicast and broadcast addresses are never a client source")
            } else if v4.is_private() {
                Some("private range (RFC 1918); only clients on the LAN or a VPN can use this rule")
            } else if v4.is_link_local() {
                Some("link-local range (169.254.x.x); only devices without a DHCP lease use it")
            } else {
                None
            }
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            if v6.is_loopback() {
                Some("loopback traffic never passes the NAS firewall, so this rule never matches")
            } else if v6.is_multicast() {
                Some("multicast and broadcast addresses are never a client source")
            } else if first & 0xffc0 == 0xfe80 {
                Some("IPv6 link-local (fe80::/10); only clients on the same network segment use it")
            } else if first & 0xfe00 == 0xfc00 {
                Some("IPv6 unique local (fc00::/7); only clients on the LAN or a VPN can use this rule")
            } else {
                None
            }
        }
    }
}

/// Cleans a path typed or pasted at a prompt.
///
/// Trims whitespace and surrounding quotes, which file managers add when a
/// path is dragged into a terminal.
///
/// # Examples
///
/// ```
/// use rulesplice::validators::clean_path_input;
///
/// assert_eq!(clean_path_input("  \"C:\\exports\\QuFirewall.csv\" "), "C:\\exports\\QuFirewall.csv");
/// assert_eq!(clean_path_input("'rules.csv'"), "rules.csv");
/// ```
pub fn clean_path_input(input: &str) -> String {
    input
        .trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ip_entry_bare_address() {
        let net = validate_ip_entry("198.51.100.20").unwrap();
        assert_eq!(net.prefix(), 32);
    }

    #[test]
    fn test_validate_ip_entry_cidr() {
        let net = validate_ip_entry("198.51.100.0/24").unwrap();
        assert_eq!(net.prefix(), 24);
        assert!(validate_ip_entry("2001:db8::/48").is_ok());
    }

    #[test]
    fn test_validate_ip_entry_rejects_garbage() {
        assert!(validate_ip_entry("10.0.0.300").is_err());
        assert!(validate_ip_entry("10.0.0.0/33").is_err());
        assert!(validate_ip_entry("China").is_err());
        assert!(validate_ip_entry("").is_err());
    }

    #[test]
    fn test_validate_ip_entry_rejects_default_route() {
        let err = validate_ip_entry("0.0.0.0/0").unwrap_err();
        assert!(err.contains("entire address space"));
        assert!(validate_ip_entry("::/0").is_err());
    }

    #[test]
    fn test_public_host_has_no_warnings() {
        assert!(entry_warnings("8.8.8.8".parse().unwrap()).is_empty());
        assert!(entry_warnings("198.51.100.0/24".parse().unwrap()).is_empty());
        assert!(entry_warnings("2001:db8:1::/48".parse().unwrap()).is_empty());
    }

    #[test]
    fn test_wide_block_warns_with_address_count() {
        let notes = entry_warnings("100.64.0.0/10".parse().unwrap());
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("4194304 addresses"));

        let notes = entry_warnings("2001:db8::/16".parse().unwrap());
        assert!(notes[0].contains("/16"));
    }

    #[test]
    fn test_private_slash_eight_warns_twice() {
        let notes = entry_warnings("10.0.0.0/8".parse().unwrap());
        assert_eq!(notes.len(), 2);
        assert!(notes[0].contains("16777216 addresses"));
        assert!(notes[1].contains("RFC 1918"));
    }

    #[test]
    fn test_host_bits_set() {
        let notes = entry_warnings("203.0.113.77/24".parse().unwrap());
        assert_eq!(notes, vec!["has host bits set; the device may store it as 203.0.113.0/24"]);
    }

    #[test]
    fn test_sources_that_never_reach_the_nas() {
        for value in ["127.0.0.1", "::1", "224.0.0.5", "ff02::1"] {
            let notes = entry_warnings(value.parse().unwrap());
            assert_eq!(notes.len(), 1, "{value}");
            assert!(notes[0].contains("never"), "{value}");
        }
    }

    #[test]
    fn test_lan_only_sources() {
        assert!(entry_warnings("192.168.1.20".parse().unwrap())[0].contains("LAN"));
        assert!(entry_warnings("fd12:3456::1".parse().unwrap())[0].contains("unique local"));
        assert!(entry_warnings("fe80::1".parse().unwrap())[0].contains("link-local"));
        assert!(entry_warnings("169.254.10.1".parse().unwrap())[0].contains("DHCP"));
    }

    #[test]
    fn test_clean_path_input_plain() {
        assert_eq!(clean_path_input("rules.csv"), "rules.csv");
        assert_eq!(clean_path_input("   "), "");
    }
}
