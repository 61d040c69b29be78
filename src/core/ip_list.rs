//! Allow-list reading
//!
//! The list is plain text with one address or CIDR block per line. Blank lines
//! and `#` comments are ignored, duplicates collapse to their first occurrence.

use crate::core::error::{Error, Result};
use crate::validators::{entry_warnings, validate_ip_entry};
use ipnetwork::IpNetwork;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// One validated allow-list entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpEntry {
    /// The entry exactly as written (trimmed); this is what lands in the export
    pub value: String,
    pub network: IpNetwork,
    /// 1-based line number in the source file
    pub line: usize,
}

/// Reads and validates an allow-list file.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the file is missing, [`Error::Io`] if it
/// cannot be read, and [`Error::InvalidEntry`] for the first bad line.
pub fn read_ip_list(path: &Path) -> Result<Vec<IpEntry>> {
    if !path.is_file() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    let entries = parse_ip_list(&text)?;
    debug!("Loaded {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Parses allow-list text.
///
/// # Errors
///
/// Returns [`Error::InvalidEntry`] for the first line that is neither blank,
/// a comment, nor a valid address or network.
pub fn parse_ip_list(text: &str) -> Result<Vec<IpEntry>> {
    let mut entries = Vec::new();
    let mut seen = HashSet::new();

    // Notepad saves UTF-8 with a BOM
    let text = text.trim_start_matches('\u{feff}');

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let value = raw.trim();
        if value.is_empty() || value.starts_with('#') {
            continue;
        }

        let network = validate_ip_entry(value).map_err(|reason| Error::InvalidEntry {
            line,
            value: value.to_string(),
            reason,
        })?;

        if !seen.insert(value.to_string()) {
            debug!("Ignoring duplicate entry '{}' at line {}", value, line);
            continue;
        }

        for note in entry_warnings(network) {
            warn!("Entry '{}' at line {}: {}", value, line, note);
        }

        entries.push(IpEntry {
            value: value.to_string(),
            network,
            line,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(entries: &[IpEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.value.as_str()).collect()
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        let text = "# office\n203.0.113.7\n\n   \n  # vpn exit\n198.51.100.0/24\n";
        let entries = parse_ip_list(text).unwrap();
        assert_eq!(values(&entries), vec!["203.0.113.7", "198.51.100.0/24"]);
        assert_eq!(entries[0].line, 2);
        assert_eq!(entries[1].line, 6);
    }

    #[test]
    fn test_trims_whitespace_and_crlf() {
        let entries = parse_ip_list("  203.0.113.7  \r\n2001:db8::/32\r\n").unwrap();
        assert_eq!(values(&entries), vec!["203.0.113.7", "2001:db8::/32"]);
    }

    #[test]
    fn test_keeps_bare_address_as_written() {
        let entries = parse_ip_list("203.0.113.7\n").unwrap();
        assert_eq!(entries[0].value, "203.0.113.7");
        assert_eq!(entries[0].network.prefix(), 32);
    }

    #[test]
    fn test_duplicates_collapse_to_first() {
        let entries = parse_ip_list("1.1.1.1\n2.2.2.2\n1.1.1.1\n").unwrap();
        assert_eq!(values(&entries), vec!["1.1.1.1", "2.2.2.2"]);
    }

    #[test]
    fn test_leading_bom_ignored() {
        let entries = parse_ip_list("\u{feff}1.1.1.1\n").unwrap();
        assert_eq!(values(&entries), vec!["1.1.1.1"]);
    }

    #[test]
    fn test_invalid_entry_reports_line() {
        let result = parse_ip_list("1.1.1.1\nnot-an-ip\n");
        match result {
            Err(Error::InvalidEntry { line, value, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(value, "not-an-ip");
            }
            other => panic!("expected InvalidEntry, got {other:?}"),
        }
    }

    #[test]
    fn test_default_route_rejected() {
        assert!(parse_ip_list("0.0.0.0/0\n").is_err());
    }

    #[test]
    fn test_empty_list() {
        assert!(parse_ip_list("").unwrap().is_empty());
        assert!(parse_ip_list("\n# nothing yet\n").unwrap().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let result = read_ip_list(Path::new("/nonexistent/ip_allow_list.txt"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
