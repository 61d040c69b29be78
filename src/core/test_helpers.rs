//! Shared test utilities for core module tests
//!
//! Provides common test helpers to avoid duplication across test suites.
//! This module is only compiled in test mode.

use crate::core::ip_list::{IpEntry, parse_ip_list};
use crate::core::layout::format_rules_json;
use crate::core::rules::JsonRule;
use serde_json::json;

/// Creates a QuFirewall-shaped rule object.
pub fn rule(id: u64, src_ip: &str, permission: &str) -> JsonRule {
    JsonRule(json!({
        "enable": 1,
        "protocol": "Any",
        "permission": permission,
        "interface_warning": 0,
        "port_option": "Any",
        "src_ip": src_ip,
        "interface": "All",
        "display_name": "All",
        "id": id,
    }))
}

pub fn allow_rule(id: u64, src_ip: &str) -> JsonRule {
    rule(id, src_ip, "Allow")
}

/// The device's trailing deny-everything rule.
pub fn deny_all(id: u64) -> JsonRule {
    rule(id, "All", "Deny")
}

/// An allow-by-country rule; it has no `src_ip` at all.
pub fn region_rule(id: u64) -> JsonRule {
    JsonRule(json!({
        "enable": 1,
        "permission": "Allow",
        "region": ["TW", "JP"],
        "interface": "All",
        "id": id,
    }))
}

/// Parses allow-list entries; panics on invalid input.
pub fn entries(list: &[&str]) -> Vec<IpEntry> {
    parse_ip_list(&list.join("\n")).expect("test entries must be valid")
}

/// Source of each rule, `<region>` for rules without one.
pub fn sources(rules: &[JsonRule]) -> Vec<String> {
    rules
        .iter()
        .map(|r| {
            r.0.get("src_ip")
                .and_then(|v| v.as_str())
                .unwrap_or("<region>")
                .to_string()
        })
        .collect()
}

/// Builds an embedded-layout export the way the NAS writes it: BOM, CRLF,
/// one policy row.
pub fn qufirewall_export(rules: &[JsonRule]) -> Vec<u8> {
    let values: Vec<_> = rules.iter().map(|r| r.0.clone()).collect();
    let rules_json = format_rules_json(&values).expect("test rules must serialize");
    let table = crate::core::table::ExportTable {
        header: vec![
            "name".to_string(),
            "enable".to_string(),
            "rules".to_string(),
            "rulesv6".to_string(),
        ],
        rows: vec![vec![
            "QuFirewall".to_string(),
            "1".to_string(),
            rules_json,
            format_rules_json(&[json!({"id": 2, "src_ip": "All", "permission": "Deny"})])
                .expect("test rules must serialize"),
        ]],
        format: crate::core::table::TableFormat {
            bom: true,
            crlf: true,
        },
        skipped_rows: 0,
    };
    table.to_bytes().expect("test export must serialize")
}
