//! End-to-end splice job
//!
//! A job is planned first (both inputs read, the merge done in memory, the
//! output bytes produced) and committed second. Nothing touches the disk
//! until [`Plan::commit`], so a dry run or an interactive confirmation can
//! look at the plan and walk away.

use crate::audit;
use crate::core::error::{Error, Result};
use crate::core::ip_list::read_ip_list;
use crate::core::layout::{Layout, merge_into_table};
use crate::core::merge::{MergeOptions, MergeStats};
use crate::core::output::{OutputTarget, WriteReport, resolve_output, write_output};
use crate::core::preview::render_diff;
use crate::core::table::{ExportTable, MalformedPolicy};
use std::path::PathBuf;
use tracing::{debug, info};

/// Everything needed to run one merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceJob {
    /// The rule export to update
    pub csv: PathBuf,
    /// The allow-list
    pub ip_list: PathBuf,
    pub output: OutputTarget,
    pub merge: MergeOptions,
    pub malformed: MalformedPolicy,
    /// Only compute and preview; write nothing
    pub dry_run: bool,
    /// Record the write in the audit log
    pub audit: bool,
}

impl SpliceJob {
    /// A job with default options writing `<stem>.updated.<ext>`.
    pub fn new(csv: impl Into<PathBuf>, ip_list: impl Into<PathBuf>) -> Self {
        Self {
            csv: csv.into(),
            ip_list: ip_list.into(),
            output: OutputTarget::NewFile(None),
            merge: MergeOptions::default(),
            malformed: MalformedPolicy::default(),
            dry_run: false,
            audit: false,
        }
    }
}

/// A computed but not yet written merge
#[derive(Debug, Clone)]
pub struct Plan {
    pub input: PathBuf,
    pub output: PathBuf,
    pub layout: Layout,
    pub stats: MergeStats,
    /// Output file contents
    pub bytes: Vec<u8>,
    before: Vec<String>,
    after: Vec<String>,
    target: OutputTarget,
    keep_ids: bool,
    audit: bool,
}

impl Plan {
    /// Diff of the rule list, one summary line per rule. `None` if the merge
    /// changes nothing.
    pub fn preview(&self) -> Option<String> {
        render_diff(&self.before, &self.after)
    }

    /// Writes the output.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the backup or the write fails; the destination is
    /// left untouched in that case.
    pub fn commit(&self) -> Result<WriteReport> {
        let result = write_output(&self.input, &self.target, self.keep_ids, &self.bytes);

        if self.audit {
            let error = result.as_ref().err().map(ToString::to_string);
            audit::log_merge(None, &self.input, &self.output, &self.stats, error);
        }

        result
    }
}

/// What a finished job did
#[derive(Debug, Clone)]
pub struct SpliceReport {
    pub stats: MergeStats,
    pub layout: &'static str,
    /// Destination path, written or (on a dry run) planned
    pub output: PathBuf,
    /// `None` on a dry run
    pub written: Option<WriteReport>,
    /// Rule diff, only computed on a dry run
    pub preview: Option<String>,
}

/// Reads both inputs and computes the merged export without writing it.
///
/// An empty allow-list yields the input bytes unchanged.
///
/// # Errors
///
/// Returns `Err` if either input is missing or invalid, the destination
/// would overwrite the input outside in-place mode, or the merge fails.
pub fn plan(job: &SpliceJob) -> Result<Plan> {
    if !job.csv.is_file() {
        return Err(Error::NotFound(job.csv.clone()));
    }
    let raw = std::fs::read(&job.csv)?;
    let mut table = ExportTable::parse(&raw, job.malformed)?;
    debug!(
        "Read {} data rows from {}",
        table.rows.len(),
        job.csv.display()
    );

    let entries = read_ip_list(&job.ip_list)?;
    let output = resolve_output(&job.csv, &job.output, job.merge.keep_ids)?;

    let merge = merge_into_table(&mut table, &entries, &job.merge)?;
    info!(
        "Merged {} entries into {} export: {} added, {} moved",
        entries.len(),
        merge.layout.name(),
        merge.stats.added,
        merge.stats.moved
    );

    let bytes = if entries.is_empty() && table.skipped_rows == 0 {
        raw
    } else {
        table.to_bytes()?
    };

    Ok(Plan {
        input: job.csv.clone(),
        output,
        layout: merge.layout,
        stats: merge.stats,
        bytes,
        before: merge.before,
        after: merge.after,
        target: job.output.clone(),
        keep_ids: job.merge.keep_ids,
        audit: job.audit,
    })
}

/// Plans the job and, unless it is a dry run, commits it.
///
/// # Errors
///
/// Returns the first error from [`plan`] or [`Plan::commit`].
pub fn run(job: &SpliceJob) -> Result<SpliceReport> {
    let plan = plan(job)?;

    let (written, preview) = if job.dry_run {
        (None, plan.preview())
    } else {
        (Some(plan.commit()?), None)
    };

    Ok(SpliceReport {
        stats: plan.stats,
        layout: plan.layout.name(),
        output: plan.output,
        written,
        preview,
    })
}
