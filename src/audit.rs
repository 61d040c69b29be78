/// Audit logging for file-modifying operations
///
/// Every merge that writes a file (or fails trying) is recorded, so an
/// in-place update can be traced back to the allow-list that produced it.
use crate::core::merge::MergeStats;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Types of auditable events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WriteExport,
    UpdateInPlace,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Type of event
    pub event_type: EventType,

    /// Whether the operation succeeded
    pub success: bool,

    /// Additional structured data about the event
    pub details: serde_json::Value,

    /// Error message if operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    /// Creates a new audit event
    pub fn new(
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success,
            details,
            error,
        }
    }
}

/// Audit log writer
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Creates an audit log in the state directory
    ///
    /// # Errors
    ///
    /// Returns `Err` if the state directory cannot be determined or created
    pub fn new() -> std::io::Result<Self> {
        let dir = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        crate::utils::ensure_dir(&dir)?;
        Ok(Self::at(dir.join("audit.log")))
    }

    /// Creates an audit log writing to `log_path`
    pub fn at(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    /// Appends an event to the audit log
    ///
    /// Events are written as JSON-lines format (one JSON object per line)
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub fn log(&self, event: &AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(event)?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        Ok(())
    }

    /// Reads the most recent events from the log, newest first
    ///
    /// Lines that fail to parse are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read
    pub fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = match std::fs::read_to_string(&self.log_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(count)
            .collect())
    }

    /// Returns the path to the audit log file
    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

/// Logs a merge that wrote (or tried to write) an export
///
/// Best effort: a failing audit log only produces a warning.
///
/// # Arguments
///
/// * `log` - Target log; `None` uses the default location
/// * `input` - The export that was read
/// * `output` - The file written
/// * `stats` - What the merge did
/// * `error` - Error message if the operation failed
pub fn log_merge(
    log: Option<&AuditLog>,
    input: &Path,
    output: &Path,
    stats: &MergeStats,
    error: Option<String>,
) {
    let event_type = if input == output {
        EventType::UpdateInPlace
    } else {
        EventType::WriteExport
    };
    let event = AuditEvent::new(
        event_type,
        error.is_none(),
        serde_json::json!({
            "input": input.display().to_string(),
            "output": output.display().to_string(),
            "stats": stats,
        }),
        error,
    );

    let result = match log {
        Some(log) => log.log(&event),
        None => AuditLog::new().and_then(|log| log.log(&event)),
    };
    if let Err(e) = result {
        tracing::warn!("Failed to write audit log: {e}");
    }
}
