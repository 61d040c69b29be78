//! Core rule-merging functionality
//!
//! This module reads a NAS firewall export and an IP allow-list, splices the
//! allow rules into the export's rule list and writes the result. It
//! provides:
//!
//! - [`table`]: Reading and writing the tabular export
//! - [`ip_list`]: Allow-list parsing
//! - [`rules`]: Rule entries, allow-rule construction and catch-all detection
//! - [`layout`]: Where the rule list lives inside the export
//! - [`merge`]: The splice algorithm
//! - [`preview`]: Dry-run diffs
//! - [`output`]: Output paths, backups and atomic writes
//! - [`splice`]: The end-to-end job
//! - [`error`]: Error types for all of the above

pub mod error;
pub mod ip_list;
pub mod layout;
pub mod merge;
pub mod output;
pub mod preview;
pub mod rules;
pub mod splice;
pub mod table;

#[cfg(test)]
pub mod test_helpers;
