//! Output file handling
//!
//! Results are never written in place without a backup unless asked, and
//! never half-written: every write goes to a temporary file in the target
//! directory that is then renamed over the destination.

use crate::core::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where the merged export goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A separate file; `None` derives `<stem>.updated.<ext>` beside the input
    NewFile(Option<PathBuf>),
    /// Overwrite the input, optionally keeping `<input>.bak` first
    InPlace { backup: bool },
}

/// What was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
}

/// Derives the default output path for `input`.
///
/// `QuFirewall_01.csv` becomes `QuFirewall_01.updated.csv`, or
/// `QuFirewall_01.updated.keepids.csv` when ids are kept. Inputs without an
/// extension get `.csv`.
pub fn default_output_path(input: &Path, keep_ids: bool) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "export".into(), |s| s.to_string_lossy());
    let ext = input
        .extension()
        .map_or_else(|| "csv".into(), |s| s.to_string_lossy());
    let suffix = if keep_ids { ".updated.keepids" } else { ".updated" };
    input.with_file_name(format!("{stem}{suffix}.{ext}"))
}

/// Path of the backup made before an in-place update.
pub fn backup_path(input: &Path) -> PathBuf {
    let mut name = input.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    input.with_file_name(name)
}

/// Resolves the destination for `target`.
///
/// # Errors
///
/// Returns [`Error::OutputIsInput`] if a new-file target points at the input.
pub fn resolve_output(input: &Path, target: &OutputTarget, keep_ids: bool) -> Result<PathBuf> {
    match target {
        OutputTarget::InPlace { .. } => Ok(input.to_path_buf()),
        OutputTarget::NewFile(path) => {
            let path = path
                .clone()
                .unwrap_or_else(|| default_output_path(input, keep_ids));
            if is_same_file(input, &path) {
                return Err(Error::OutputIsInput(path));
            }
            Ok(path)
        }
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Writes `bytes` for `input` according to `target`.
///
/// # Errors
///
/// Returns `Err` if the destination is invalid, the backup cannot be made or
/// verified, or the write fails. The destination is untouched on error.
pub fn write_output(
    input: &Path,
    target: &OutputTarget,
    keep_ids: bool,
    bytes: &[u8],
) -> Result<WriteReport> {
    let path = resolve_output(input, target, keep_ids)?;

    let backup = match target {
        OutputTarget::InPlace { backup: true } => Some(create_backup(input)?),
        _ => None,
    };

    write_atomic(&path, bytes)?;
    info!("Wrote {} bytes to {}", bytes.len(), path.display());

    Ok(WriteReport { path, backup })
}

/// Copies `input` to `<input>.bak` and verifies the copy.
///
/// An existing backup is kept as is, so repeated in-place runs never
/// overwrite the copy of the original export.
///
/// # Errors
///
/// Returns [`Error::BackupMismatch`] if the copy's SHA-256 differs from the
/// original's, or an I/O error.
pub fn create_backup(input: &Path) -> Result<PathBuf> {
    let backup = backup_path(input);
    if backup.exists() {
        info!("Keeping existing backup {}", backup.display());
        return Ok(backup);
    }

    let original = std::fs::read(input)?;
    write_atomic(&backup, &original)?;

    let expected = sha256_hex(&original);
    let actual = sha256_hex(&std::fs::read(&backup)?);
    if expected != actual {
        return Err(Error::BackupMismatch { expected, actual });
    }

    debug!("Backup {} verified ({})", backup.display(), expected);
    Ok(backup)
}

/// Writes `bytes` to `path` via a temporary file and an atomic rename.
///
/// When `path` already exists its permissions carry over; new files keep the
/// temporary file's mode (0o600 on Unix).
///
/// # Errors
///
/// Returns `Err` if the temporary file cannot be created, written, synced or
/// renamed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;

    if let Ok(meta) = std::fs::metadata(path) {
        temp.as_file().set_permissions(meta.permissions())?;
    }

    temp.persist(path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot write output. Free up space and try again.",
            )
        } else {
            e.error
        }
    })?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        let input = Path::new("/data/QuFirewall_01.csv");
        assert_eq!(
            default_output_path(input, false),
            PathBuf::from("/data/QuFirewall_01.updated.csv")
        );
        assert_eq!(
            default_output_path(input, true),
            PathBuf::from("/data/QuFirewall_01.updated.keepids.csv")
        );
        assert_eq!(
            default_output_path(Path::new("rules"), false),
            PathBuf::from("rules.updated.csv")
        );
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/data/rules.csv")),
            PathBuf::from("/data/rules.csv.bak")
        );
    }

    #[test]
    fn test_resolve_rejects_input_as_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rules.csv");
        std::fs::write(&input, "a\n").unwrap();

        let target = OutputTarget::NewFile(Some(input.clone()));
        assert!(matches!(
            resolve_output(&input, &target, false),
            Err(Error::OutputIsInput(_))
        ));
        assert_eq!(
            resolve_output(&input, &OutputTarget::InPlace { backup: true }, false).unwrap(),
            input
        );
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.csv");
        std::fs::write(&path, b"old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        write_atomic(&path, b"new").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_in_place_write_makes_backup_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rules.csv");
        std::fs::write(&input, b"original").unwrap();
        let target = OutputTarget::InPlace { backup: true };

        let report = write_output(&input, &target, false, b"first run").unwrap();
        let backup = report.backup.unwrap();
        assert_eq!(std::fs::read(&backup).unwrap(), b"original");
        assert_eq!(std::fs::read(&input).unwrap(), b"first run");

        write_output(&input, &target, false, b"second run").unwrap();
        assert_eq!(std::fs::read(&backup).unwrap(), b"original");
        assert_eq!(std::fs::read(&input).unwrap(), b"second run");
    }

    #[test]
    fn test_in_place_without_backup() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rules.csv");
        std::fs::write(&input, b"original").unwrap();

        let report =
            write_output(&input, &OutputTarget::InPlace { backup: false }, false, b"x").unwrap();
        assert!(report.backup.is_none());
        assert!(!backup_path(&input).exists());
    }

    #[test]
    fn test_new_file_leaves_input_alone() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rules.csv");
        std::fs::write(&input, b"original").unwrap();

        let report = write_output(&input, &OutputTarget::NewFile(None), true, b"merged").unwrap();
        assert_eq!(report.path, dir.path().join("rules.updated.keepids.csv"));
        assert_eq!(std::fs::read(&input).unwrap(), b"original");
        assert_eq!(std::fs::read(&report.path).unwrap(), b"merged");
    }
}
