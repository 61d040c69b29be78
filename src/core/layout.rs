//! Export layouts
//!
//! Two shapes of rule export are supported, told apart by the header:
//!
//! - **Embedded**: a `rules` column whose first data row holds the whole rule
//!   list as a JSON array (QNAP QuFirewall). An optional `rulesv6` column
//!   holds the IPv6 list.
//! - **Flat**: one rule per data row, with a recognizable source column.

use crate::core::error::{Error, Result};
use crate::core::ip_list::IpEntry;
use crate::core::merge::{MergeOptions, MergeStats, merge_rules};
use crate::core::rules::{FlatColumns, FlatRule, JsonRule, Permission, RuleEntry};
use crate::core::table::ExportTable;
use serde::Serialize;
use serde_json::Value;
use std::io;
use tracing::{debug, info};

pub const RULES_COLUMN: &str = "rules";
pub const RULES_V6_COLUMN: &str = "rulesv6";

/// Characters of a broken JSON field quoted in error messages
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Embedded {
        rules: usize,
        rules_v6: Option<usize>,
    },
    Flat(FlatColumns),
}

impl Layout {
    /// Detects the layout from the table header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingColumn`] if the header has neither a `rules`
    /// column nor a source column.
    pub fn detect(table: &ExportTable) -> Result<Self> {
        if let Some(rules) = table.column_index(&[RULES_COLUMN]) {
            return Ok(Layout::Embedded {
                rules,
                rules_v6: table.column_index(&[RULES_V6_COLUMN]),
            });
        }

        let source = table
            .column_index(FlatColumns::SOURCE_NAMES)
            .ok_or(Error::MissingColumn("'rules' or source"))?;

        Ok(Layout::Flat(FlatColumns {
            source,
            permission: table.column_index(FlatColumns::PERMISSION_NAMES),
            enable: table.column_index(FlatColumns::ENABLE_NAMES),
            name: table.column_index(FlatColumns::NAME_NAMES),
            id: table.column_index(FlatColumns::ID_NAMES),
            protocol: table.column_index(FlatColumns::PROTOCOL_NAMES),
            port: table.column_index(FlatColumns::PORT_NAMES),
        }))
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Layout::Embedded { .. } => "embedded",
            Layout::Flat(_) => "flat",
        }
    }
}

/// Outcome of merging into a table
#[derive(Debug, Clone)]
pub struct TableMerge {
    pub layout: Layout,
    pub stats: MergeStats,
    /// Rule summaries before and after, for previews
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// Merges `entries` into the rule list held by `table`, in place.
///
/// With an empty `entries` the table is left exactly as read.
///
/// # Errors
///
/// Returns `Err` if the layout cannot be detected, the embedded JSON is
/// invalid, or the merge fails.
pub fn merge_into_table(
    table: &mut ExportTable,
    entries: &[IpEntry],
    options: &MergeOptions,
) -> Result<TableMerge> {
    let layout = Layout::detect(table)?;
    debug!("Detected {} export layout", layout.name());

    let (mut stats, before, after) = match layout {
        Layout::Embedded { rules, rules_v6 } => {
            merge_embedded(table, rules, rules_v6, entries, options)?
        }
        Layout::Flat(columns) => merge_flat(table, columns, entries, options)?,
    };
    stats.skipped_rows = table.skipped_rows;

    Ok(TableMerge {
        layout,
        stats,
        before,
        after,
    })
}

type MergeParts = (MergeStats, Vec<String>, Vec<String>);

fn merge_embedded(
    table: &mut ExportTable,
    rules_col: usize,
    rules_v6_col: Option<usize>,
    entries: &[IpEntry],
    options: &MergeOptions,
) -> Result<MergeParts> {
    if table.rows.is_empty() {
        return Err(Error::NoDataRows);
    }
    if table.rows.len() > 1 {
        info!(
            "Updating the first policy row only; {} other rows left unchanged",
            table.rows.len() - 1
        );
    }

    let policy = &table.rows[0];
    let rules = parse_rule_array(&table.header[rules_col], &policy[rules_col])?;

    let reserved_max_id = match rules_v6_col {
        Some(col) => parse_rule_array(&table.header[col], &policy[col])?
            .iter()
            .filter_map(RuleEntry::id)
            .max()
            .unwrap_or(0),
        None => 0,
    };

    let before = summaries(&rules);
    let options = MergeOptions {
        reserved_max_id: options.reserved_max_id.max(reserved_max_id),
        ..*options
    };
    let merged = merge_rules(rules, entries, &options, |e| JsonRule::allow(&e.value, 0))?;
    let after = summaries(&merged.rules);

    if !entries.is_empty() {
        let values: Vec<Value> = merged.rules.into_iter().map(|r| r.0).collect();
        table.rows[0][rules_col] = format_rules_json(&values)?;
    }

    Ok((merged.stats, before, after))
}

fn merge_flat(
    table: &mut ExportTable,
    columns: FlatColumns,
    entries: &[IpEntry],
    options: &MergeOptions,
) -> Result<MergeParts> {
    let width = table.header.len();
    let rules: Vec<FlatRule> = std::mem::take(&mut table.rows)
        .into_iter()
        .map(|fields| FlatRule::new(fields, columns))
        .collect();

    // Prefer an enabled allow row; a disabled one still lends its layout
    let is_allow = |r: &&FlatRule| r.permission() == Some(Permission::Allow);
    let template = rules
        .iter()
        .filter(is_allow)
        .find(|r| r.enabled() != Some(false))
        .or_else(|| rules.iter().find(is_allow))
        .cloned();

    let before = summaries(&rules);
    let merged = merge_rules(rules, entries, options, |e| {
        FlatRule::allow(&e.value, template.as_ref(), width, columns)
    })?;
    let after = summaries(&merged.rules);

    table.rows = merged.rules.into_iter().map(|r| r.fields).collect();
    Ok((merged.stats, before, after))
}

fn summaries<R: RuleEntry>(rules: &[R]) -> Vec<String> {
    rules.iter().map(RuleEntry::summary).collect()
}

/// Parses a JSON rule array field. An empty field is an empty list.
///
/// # Errors
///
/// Returns [`Error::Json`] for invalid JSON and [`Error::NotAList`] for JSON
/// that is not an array.
pub fn parse_rule_array(column: &str, raw: &str) -> Result<Vec<JsonRule>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(raw).map_err(|source| Error::Json {
        column: column.to_string(),
        excerpt: raw.chars().take(EXCERPT_CHARS).collect(),
        source,
    })?;

    match value {
        Value::Array(items) => Ok(items.into_iter().map(JsonRule).collect()),
        Value::Null => Ok(Vec::new()),
        _ => Err(Error::NotAList(column.to_string())),
    }
}

/// Serializes a rule array the way QuFirewall writes it: one line, `", "`
/// between items and `": "` after keys, non-ASCII left as is.
///
/// # Errors
///
/// Returns `Err` only if serialization into memory fails.
pub fn format_rules_json(rules: &[Value]) -> Result<String> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    rules.serialize(&mut serializer).map_err(io::Error::from)?;
    Ok(String::from_utf8(buf).map_err(io::Error::other)?)
}

/// Compact JSON with a space after every separator
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ip_list::parse_ip_list;
    use crate::core::table::MalformedPolicy;
    use crate::core::test_helpers::{allow_rule, deny_all, qufirewall_export, region_rule};
    use serde_json::json;

    fn table(bytes: &[u8]) -> ExportTable {
        ExportTable::parse(bytes, MalformedPolicy::Fail).unwrap()
    }

    #[test]
    fn test_format_rules_json_matches_device_style() {
        let rules = vec![json!({"id": 1, "src_ip": "1.2.3.4", "ports": [80, 443]}), json!({})];
        assert_eq!(
            format_rules_json(&rules).unwrap(),
            r#"[{"id": 1, "src_ip": "1.2.3.4", "ports": [80, 443]}, {}]"#
        );
        assert_eq!(format_rules_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_format_rules_json_keeps_unicode_and_key_order() {
        let rules = vec![json!({"zeta": "家用", "alpha": 1})];
        assert_eq!(
            format_rules_json(&rules).unwrap(),
            r#"[{"zeta": "家用", "alpha": 1}]"#
        );
    }

    #[test]
    fn test_parse_rule_array_edge_cases() {
        assert!(parse_rule_array("rules", "").unwrap().is_empty());
        assert!(parse_rule_array("rules", "null").unwrap().is_empty());
        assert!(matches!(
            parse_rule_array("rules", r#"{"id": 1}"#),
            Err(Error::NotAList(_))
        ));
        match parse_rule_array("rules", "[{broken") {
            Err(Error::Json { column, excerpt, .. }) => {
                assert_eq!(column, "rules");
                assert_eq!(excerpt, "[{broken");
            }
            other => panic!("expected Json error, got {other:?}"),
        }
    }

    #[test]
    fn test_detect_embedded() {
        let t = table(&qufirewall_export(&[deny_all(1)]));
        assert_eq!(
            Layout::detect(&t).unwrap(),
            Layout::Embedded {
                rules: 2,
                rules_v6: Some(3)
            }
        );
    }

    #[test]
    fn test_detect_flat() {
        let t = table(b"ID,Name,Source,Action,Enabled\n");
        assert_eq!(
            Layout::detect(&t).unwrap(),
            Layout::Flat(FlatColumns {
                source: 2,
                permission: Some(3),
                enable: Some(4),
                name: Some(1),
                id: Some(0),
                protocol: None,
                port: None,
            })
        );
    }

    #[test]
    fn test_detect_unknown_header() {
        let t = table(b"foo,bar\n");
        assert!(matches!(Layout::detect(&t), Err(Error::MissingColumn(_))));
    }

    #[test]
    fn test_embedded_merge_updates_policy_row() {
        let mut t = table(&qufirewall_export(&[
            allow_rule(1, "10.0.0.0/8"),
            region_rule(2),
            deny_all(3),
        ]));
        let entries = parse_ip_list("203.0.113.7\n").unwrap();

        let result = merge_into_table(&mut t, &entries, &MergeOptions::default()).unwrap();
        assert_eq!(result.stats.added, 1);
        assert_eq!(result.before.len(), 3);
        assert_eq!(result.after.len(), 4);

        let rules = parse_rule_array("rules", &t.rows[0][2]).unwrap();
        assert_eq!(rules[1].source(), Some("203.0.113.7"));
        assert_eq!(rules[1].id(), Some(2));
        assert_eq!(rules[3].id(), Some(4));
    }

    #[test]
    fn test_embedded_keep_ids_respects_v6_ids() {
        let mut t = table(&qufirewall_export(&[deny_all(1)]));
        let entries = parse_ip_list("203.0.113.7\n").unwrap();
        let options = MergeOptions {
            keep_ids: true,
            ..MergeOptions::default()
        };

        merge_into_table(&mut t, &entries, &options).unwrap();
        let rules = parse_rule_array("rules", &t.rows[0][2]).unwrap();
        // rulesv6 in the fixture already uses id 2
        assert_eq!(rules[0].id(), Some(3));
        assert_eq!(rules[1].id(), Some(1));
    }

    #[test]
    fn test_embedded_without_data_rows() {
        let mut t = table(b"name,rules\n");
        let result = merge_into_table(&mut t, &[], &MergeOptions::default());
        assert!(matches!(result, Err(Error::NoDataRows)));
    }

    #[test]
    fn test_flat_merge_inserts_rows() {
        let mut t = table(
            b"id,name,src_ip,permission,enable,protocol\n\
              1,office,10.0.0.0/8,Allow,1,TCP\n\
              2,block all,All,Deny,1,Any\n",
        );
        let entries = parse_ip_list("203.0.113.7\n").unwrap();

        let result = merge_into_table(&mut t, &entries, &MergeOptions::default()).unwrap();
        assert_eq!(result.layout.name(), "flat");
        assert_eq!(t.rows.len(), 3);
        assert_eq!(
            t.rows[1],
            vec!["2", "Allow 203.0.113.7", "203.0.113.7", "Allow", "1", "Any"]
        );
        assert_eq!(t.rows[2][0], "3");
        assert_eq!(t.rows[2][2], "All");
    }

    #[test]
    fn test_flat_merge_with_disabled_port_limited_template() {
        let mut t = table(
            b"id,name,src_ip,permission,enable,protocol,port,interface
              1,ssh,10.0.0.5,Allow,0,TCP,22,eth0
              2,block all,All,Deny,1,Any,Any,All
",
        );
        let entries = parse_ip_list("203.0.113.7
").unwrap();

        merge_into_table(&mut t, &entries, &MergeOptions::default()).unwrap();
        assert_eq!(
            t.rows[1],
            vec!["2", "Allow 203.0.113.7", "203.0.113.7", "Allow", "1", "Any", "Any", "eth0"]
        );
    }

    #[test]
    fn test_flat_template_prefers_enabled_allow_row() {
        let mut t = table(
            b"name,src_ip,permission,enable,interface
              old,10.0.0.5,Allow,0,eth0
              office,10.0.0.0/8,Allow,1,eth1
              rest,All,Deny,1,All
",
        );
        let entries = parse_ip_list("203.0.113.7
").unwrap();

        merge_into_table(&mut t, &entries, &MergeOptions::default()).unwrap();
        assert_eq!(t.rows[2], vec!["Allow 203.0.113.7", "203.0.113.7", "Allow", "1", "eth1"]);
    }

    #[test]
    fn test_embedded_huge_id_is_renumbered() {
        let mut t = table(&qufirewall_export(&[deny_all(u64::MAX)]));
        let entries = parse_ip_list("203.0.113.7
").unwrap();

        let result = merge_into_table(&mut t, &entries, &MergeOptions::default()).unwrap();
        assert_eq!(result.stats.added, 1);
        let rules = parse_rule_array("rules", &t.rows[0][2]).unwrap();
        assert_eq!(rules[0].id(), Some(1));
        assert_eq!(rules[1].id(), Some(2));
    }

    #[test]
    fn test_flat_empty_list_is_noop() {
        let bytes = b"name,src_ip,permission\noffice,10.0.0.0/8,Allow\nrest,All,Deny\n";
        let mut t = table(bytes);
        merge_into_table(&mut t, &[], &MergeOptions::default()).unwrap();
        assert_eq!(t.to_bytes().unwrap(), bytes.to_vec());
    }
}
