use std::path::PathBuf;
use thiserror::Error;

/// Core error types for rulesplice
#[derive(Debug, Error)]
pub enum Error {
    /// An input file does not exist
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The export could not be tokenized as CSV
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON field inside the export could not be parsed
    #[error("Failed to parse JSON in '{column}' column: {source}\nValue (truncated): {excerpt}")]
    Json {
        column: String,
        excerpt: String,
        #[source]
        source: serde_json::Error,
    },

    /// The export has no header record
    #[error("CSV export is empty")]
    EmptyExport,

    /// The export has a header but nothing to update
    #[error("CSV export has a header but no data rows to update")]
    NoDataRows,

    /// A data row has the wrong number of fields
    #[error("Malformed row at line {line}: expected {expected} fields, found {found}")]
    MalformedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    /// An IP list entry is not a usable address or network
    #[error("Invalid IP list entry '{value}' at line {line}: {reason}")]
    InvalidEntry {
        line: usize,
        value: String,
        reason: String,
    },

    /// A required column is absent from the header
    #[error("CSV header is missing a {0} column")]
    MissingColumn(&'static str),

    /// The rules field holds JSON that is not an array
    #[error("The '{0}' column does not contain a JSON list")]
    NotAList(String),

    /// The rule list exceeds [`crate::core::rules::MAX_RULES`]
    #[error("Export contains {found} rules (max: {max})")]
    TooManyRules { found: usize, max: usize },

    /// Keep-ids found no unused id above the highest existing one
    #[error("Rule id {0} leaves no room for new ids")]
    IdOverflow(u64),

    /// The backup copy does not match the original
    #[error("Backup checksum mismatch: expected {expected}, got {actual}")]
    BackupMismatch { expected: String, actual: String },

    /// The output path would overwrite the input without in-place mode
    #[error("Output path is the input file: {}", .0.display())]
    OutputIsInput(PathBuf),
}

impl Error {
    /// Returns a one-line suggestion for errors the user can fix directly.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::NotFound(_) => Some("Check the path; surrounding quotes are stripped automatically"),
            Error::MalformedRow { .. } => {
                Some("Re-export the rules from the NAS, or pass --skip-malformed to drop the row")
            }
            Error::InvalidEntry { .. } => {
                Some("Use one address or CIDR per line, e.g. 203.0.113.7 or 198.51.100.0/24")
            }
            Error::MissingColumn(_) => {
                Some("The export must have a 'rules' column or a source column such as 'src_ip'")
            }
            Error::OutputIsInput(_) => Some("Pass --in-place to update the export directly"),
            Error::BackupMismatch { .. } => Some("Check free disk space and try again"),
            Error::IdOverflow(_) => Some("Run without --keep-ids to renumber the rules from 1"),
            Error::TooManyRules { .. } => Some("Split the IP list or prune unused rules first"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
