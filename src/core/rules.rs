//! Rule entry types
//!
//! Both export layouts reduce to an ordered list of rule entries. The merger
//! only needs a handful of facts about each entry (its source, its
//! permission, its id), which [`RuleEntry`] exposes. Everything else about a
//! rule is carried through untouched.
//!
//! - [`JsonRule`]: one object of an embedded `rules` JSON array
//! - [`FlatRule`]: one data row of a flat export

use ipnetwork::IpNetwork;
use serde_json::{Map, Value, json};
use std::net::IpAddr;

/// Maximum number of rules accepted in one rule list
///
/// Consumer NAS firewalls cap out far below this; a larger list means the
/// wrong file was picked.
pub const MAX_RULES: usize = 10_000;

/// Rule permission as far as the merger cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Permission {
    Allow,
    Deny,
}

impl Permission {
    pub const fn as_str(self) -> &'static str {
        match self {
            Permission::Allow => "Allow",
            Permission::Deny => "Deny",
        }
    }

    /// Interprets a vendor permission/action string.
    ///
    /// Returns `None` for values that are neither a clear allow nor a clear deny.
    pub fn from_field(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" | "accept" | "permit" | "pass" => Some(Permission::Allow),
            "deny" | "drop" | "block" | "reject" => Some(Permission::Deny),
            _ => None,
        }
    }
}

/// What the merger needs to know about a rule
pub trait RuleEntry: Clone {
    /// Trimmed source address, network or keyword, if the rule has one
    fn source(&self) -> Option<&str>;

    fn permission(&self) -> Option<Permission>;

    fn id(&self) -> Option<u64>;

    /// Writes an id. Returns `false` if this rule has no id slot.
    fn set_id(&mut self, id: u64) -> bool;

    fn enabled(&self) -> Option<bool> {
        None
    }

    /// Whether the rule matches regardless of the client address
    /// (deny-all, allow-region and similar defaults).
    fn is_catch_all(&self) -> bool {
        !is_specific_source(self.source())
    }

    /// One-line rendering used by previews
    fn summary(&self) -> String {
        let id = self.id().map_or_else(|| "-".to_string(), |id| id.to_string());
        let permission = self.permission().map_or("?", Permission::as_str);
        let enabled = match self.enabled() {
            Some(true) => "on",
            Some(false) => "off",
            None => "",
        };
        format!(
            "{id:>5}  {permission:<5}  {:<40} {enabled}",
            self.source().unwrap_or("-")
        )
        .trim_end()
        .to_string()
    }
}

/// Returns `true` if `source` names particular clients: an address, a
/// non-zero-prefix network, or an address range `a-b`.
///
/// Missing and empty sources, keywords like `All`/`Any`/`*`, default routes
/// and anything unparseable (region or country names) are catch-alls.
pub fn is_specific_source(source: Option<&str>) -> bool {
    let Some(source) = source.map(str::trim) else {
        return false;
    };

    if source.is_empty()
        || ["all", "any", "*"]
            .iter()
            .any(|kw| source.eq_ignore_ascii_case(kw))
    {
        return false;
    }

    if let Ok(network) = source.parse::<IpNetwork>() {
        return network.prefix() != 0;
    }

    if let Some((start, end)) = source.split_once('-') {
        return start.trim().parse::<IpAddr>().is_ok() && end.trim().parse::<IpAddr>().is_ok();
    }

    false
}

// ═══════════════════════════════════════════════════════════════════════════
// Embedded JSON rules
// ═══════════════════════════════════════════════════════════════════════════

/// One element of an embedded `rules` JSON array
///
/// Non-object elements are carried through unchanged and never treated as
/// catch-alls, so they do not shift the insertion point.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRule(pub Value);

impl JsonRule {
    /// Builds an allow rule in the QuFirewall object shape.
    pub fn allow(src_ip: &str, id: u64) -> Self {
        JsonRule(json!({
            "enable": 1,
            "protocol": "Any",
            "permission": "Allow",
            "interface_warning": 0,
            "port_option": "Any",
            "src_ip": src_ip,
            "interface": "All",
            "display_name": "All",
            "id": id,
        }))
    }

    fn object(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }
}

impl RuleEntry for JsonRule {
    fn source(&self) -> Option<&str> {
        self.object()?.get("src_ip")?.as_str().map(str::trim)
    }

    fn permission(&self) -> Option<Permission> {
        Permission::from_field(self.object()?.get("permission")?.as_str()?)
    }

    fn id(&self) -> Option<u64> {
        match self.object()?.get("id")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn set_id(&mut self, id: u64) -> bool {
        match self.0.as_object_mut() {
            Some(obj) => {
                obj.insert("id".to_string(), json!(id));
                true
            }
            None => false,
        }
    }

    fn enabled(&self) -> Option<bool> {
        match self.object()?.get("enable")? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|v| v != 0),
            Value::String(s) => parse_flag(s),
            _ => None,
        }
    }

    fn is_catch_all(&self) -> bool {
        self.object().is_some() && !is_specific_source(self.source())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Flat rows
// ═══════════════════════════════════════════════════════════════════════════

/// Column positions of a flat export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatColumns {
    pub source: usize,
    pub permission: Option<usize>,
    pub enable: Option<usize>,
    pub name: Option<usize>,
    pub id: Option<usize>,
    pub protocol: Option<usize>,
    pub port: Option<usize>,
}

impl FlatColumns {
    pub const SOURCE_NAMES: &'static [&'static str] =
        &["src_ip", "source", "ip", "address", "cidr"];
    pub const PERMISSION_NAMES: &'static [&'static str] = &["permission", "action", "policy"];
    pub const ENABLE_NAMES: &'static [&'static str] = &["enable", "enabled", "status"];
    pub const NAME_NAMES: &'static [&'static str] =
        &["name", "display_name", "description", "label"];
    pub const ID_NAMES: &'static [&'static str] = &["id"];
    pub const PROTOCOL_NAMES: &'static [&'static str] = &["protocol", "proto"];
    pub const PORT_NAMES: &'static [&'static str] =
        &["port", "ports", "port_option", "dst_port"];
}

/// One data row of a flat export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRule {
    pub fields: Vec<String>,
    columns: FlatColumns,
}

impl FlatRule {
    pub fn new(fields: Vec<String>, columns: FlatColumns) -> Self {
        Self { fields, columns }
    }

    /// Builds an allow row for `source`.
    ///
    /// `template` is an existing allow row whose remaining fields (interface,
    /// schedule...) are copied. The new row is always enabled and open on
    /// every protocol and port, whatever the template restricts.
    pub fn allow(source: &str, template: Option<&FlatRule>, width: usize, columns: FlatColumns) -> Self {
        let mut fields = match template {
            Some(t) => t.fields.clone(),
            None => vec![String::new(); width],
        };

        fields[columns.source] = source.to_string();
        if let Some(idx) = columns.permission {
            fields[idx] = Permission::Allow.to_string();
        }
        if let Some(idx) = columns.enable {
            fields[idx] = "1".to_string();
        }
        for idx in [columns.protocol, columns.port].into_iter().flatten() {
            fields[idx] = "Any".to_string();
        }
        if let Some(idx) = columns.name {
            fields[idx] = format!("Allow {source}");
        }
        if let Some(idx) = columns.id {
            fields[idx].clear();
        }

        Self { fields, columns }
    }

    fn field(&self, idx: Option<usize>) -> Option<&str> {
        idx.and_then(|i| self.fields.get(i)).map(|s| s.trim())
    }
}

impl RuleEntry for FlatRule {
    fn source(&self) -> Option<&str> {
        self.field(Some(self.columns.source))
    }

    fn permission(&self) -> Option<Permission> {
        Permission::from_field(self.field(self.columns.permission)?)
    }

    fn id(&self) -> Option<u64> {
        self.field(self.columns.id)?.parse().ok()
    }

    fn set_id(&mut self, id: u64) -> bool {
        match self.columns.id {
            Some(idx) => {
                self.fields[idx] = id.to_string();
                true
            }
            None => false,
        }
    }

    fn enabled(&self) -> Option<bool> {
        parse_flag(self.field(self.columns.enable)?)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}
