//! The allow-block splice
//!
//! Given an ordered rule list and an ordered allow-list, the merger builds one
//! contiguous block of allow rules (one per entry, in list order) and splices
//! it into the rule list. Existing allow rules for a listed source are moved
//! into the block instead of being duplicated.
//!
//! The block lands immediately before the trailing catch-all rules by default,
//! so the device's deny-all / allow-region defaults keep matching last.

use crate::core::error::{Error, Result};
use crate::core::ip_list::IpEntry;
use crate::core::rules::{MAX_RULES, Permission, RuleEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Where the allow block goes
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Placement {
    /// Before the trailing run of catch-all rules
    #[default]
    BeforeDefaults,
    /// At the very top of the list
    Top,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub placement: Placement,
    /// Insert before the last N rules; overrides `placement`
    pub before_last: Option<usize>,
    /// Keep existing ids and number only the new rules
    pub keep_ids: bool,
    /// Highest id used outside the list being merged (e.g. `rulesv6`)
    pub reserved_max_id: u64,
}

/// Counters describing what a merge did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// New allow rules created
    pub added: usize,
    /// Existing allow rules moved into the block
    pub moved: usize,
    /// Extra allow rules for an already-moved source that were dropped
    pub deduplicated: usize,
    /// Non-allow rules for a listed source, left in place
    pub shadowed: usize,
    /// Malformed export rows dropped before merging
    pub skipped_rows: usize,
    pub total_before: usize,
    pub total_after: usize,
}

/// Result of [`merge_rules`]
#[derive(Debug, Clone)]
pub struct Merged<R> {
    pub rules: Vec<R>,
    pub stats: MergeStats,
    /// Index of the first block rule in `rules`
    pub insert_at: usize,
}

/// Splices an allow block for `entries` into `rules`.
///
/// `make_allow` builds the rule for an entry that has no existing allow rule.
/// An empty `entries` returns `rules` untouched, ids included.
///
/// # Errors
///
/// Returns [`Error::TooManyRules`] if the input or the result exceeds
/// [`MAX_RULES`], and [`Error::IdOverflow`] if keep-ids runs out of ids.
pub fn merge_rules<R, F>(
    rules: Vec<R>,
    entries: &[IpEntry],
    options: &MergeOptions,
    mut make_allow: F,
) -> Result<Merged<R>>
where
    R: RuleEntry,
    F: FnMut(&IpEntry) -> R,
{
    let total_before = rules.len();
    check_limit(total_before)?;

    if entries.is_empty() {
        debug!("Empty allow list, rule list left unchanged");
        let insert_at = insertion_index(&rules, options);
        return Ok(Merged {
            rules,
            stats: MergeStats {
                total_before,
                total_after: total_before,
                ..MergeStats::default()
            },
            insert_at,
        });
    }

    // Only keep-ids hands out fresh ids; renumbering starts over at 1
    let max_existing_id = if options.keep_ids {
        rules
            .iter()
            .filter_map(RuleEntry::id)
            .max()
            .unwrap_or(0)
            .max(options.reserved_max_id)
    } else {
        0
    };

    let wanted: HashMap<&str, usize> = entries
        .iter()
        .enumerate()
        .map(|(idx, e)| (e.value.as_str(), idx))
        .collect();

    let mut stats = MergeStats {
        total_before,
        ..MergeStats::default()
    };
    let mut block: Vec<Option<R>> = vec![None; entries.len()];
    let mut remaining = Vec::with_capacity(total_before);

    for rule in rules {
        let Some(slot) = rule.source().and_then(|s| wanted.get(s).copied()) else {
            remaining.push(rule);
            continue;
        };

        if rule.permission() != Some(Permission::Allow) {
            warn!(
                "Rule for '{}' is not an allow rule; the new allow rule may shadow it",
                entries[slot].value
            );
            stats.shadowed += 1;
            remaining.push(rule);
        } else if block[slot].is_none() {
            block[slot] = Some(rule);
            stats.moved += 1;
        } else {
            debug!("Dropping duplicate allow rule for '{}'", entries[slot].value);
            stats.deduplicated += 1;
        }
    }

    let mut next_id = max_existing_id.checked_add(1);
    let mut spliced = Vec::with_capacity(entries.len());
    for (existing, entry) in block.into_iter().zip(entries) {
        let rule = match existing {
            Some(rule) => rule,
            None => {
                stats.added += 1;
                let mut rule = make_allow(entry);
                if options.keep_ids {
                    // Only exhausted once u64::MAX itself is taken
                    let id = next_id.ok_or(Error::IdOverflow(u64::MAX))?;
                    if rule.set_id(id) {
                        next_id = id.checked_add(1);
                    }
                }
                rule
            }
        };
        spliced.push(rule);
    }
    let block = spliced;

    let insert_at = insertion_index(&remaining, options);
    let block_len = block.len();
    let mut merged = remaining;
    merged.splice(insert_at..insert_at, block);

    if !options.keep_ids {
        renumber(&mut merged);
    }

    stats.total_after = merged.len();
    check_limit(stats.total_after)?;

    info!(
        "Spliced {} allow rules at position {} ({} added, {} moved, {} duplicates removed)",
        block_len, insert_at, stats.added, stats.moved, stats.deduplicated
    );

    Ok(Merged {
        rules: merged,
        stats,
        insert_at,
    })
}

/// Number of trailing catch-all rules in `rules`.
pub fn terminal_count<R: RuleEntry>(rules: &[R]) -> usize {
    rules.iter().rev().take_while(|r| r.is_catch_all()).count()
}

fn insertion_index<R: RuleEntry>(rules: &[R], options: &MergeOptions) -> usize {
    if let Some(n) = options.before_last {
        return rules.len().saturating_sub(n);
    }
    match options.placement {
        Placement::Top => 0,
        Placement::BeforeDefaults => rules.len() - terminal_count(rules),
    }
}

/// Assigns ids `1..` in list order to every rule with an id slot.
fn renumber<R: RuleEntry>(rules: &mut [R]) {
    let mut next = 1;
    for rule in rules {
        if rule.set_id(next) {
            next += 1;
        }
    }
}

fn check_limit(count: usize) -> Result<()> {
    if count > MAX_RULES {
        return Err(Error::TooManyRules {
            found: count,
            max: MAX_RULES,
        });
    }
    Ok(())
}
