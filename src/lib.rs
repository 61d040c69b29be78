//! rulesplice - IP allow rules for NAS firewall exports
//!
//! Takes a firewall rule export (QNAP QuFirewall CSV, or any CSV with one rule
//! per row) and a plain-text list of addresses, and produces the same export
//! with an allow rule per address placed ahead of the device's default
//! deny-all rules.
//!
//! # Architecture
//!
//! - [`core`] - Export parsing, the merge itself, and output writing
//! - [`audit`] - Audit log of written files
//! - [`validators`] - Input validation and sanitization
//! - [`config`] - Configuration persistence
//! - [`utils`] - Utility functions (XDG directories, etc.)
//!
//! # Safety Features
//!
//! - Nothing is written until the whole merge succeeded
//! - Verified `.bak` copy before in-place updates
//! - Atomic file operations with secure permissions
//! - Dry-run previews

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::merge::{MergeOptions, MergeStats, Placement};
pub use core::splice::{SpliceJob, SpliceReport, plan, run};
