//! Tabular rule export reading and writing
//!
//! NAS firewall exports are comma-separated files with a header record. Some
//! firmware writes a UTF-8 byte-order mark and CRLF line endings, so both are
//! detected on read and reproduced on write. Fields are written with minimal
//! quoting, which is also what the devices produce.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// What to do with a data row whose field count differs from the header's
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
pub enum MalformedPolicy {
    /// Abort the run and report the offending line
    #[default]
    Fail,
    /// Drop the row with a warning
    Skip,
}

/// Byte-level details of the source file that are preserved on output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableFormat {
    pub bom: bool,
    pub crlf: bool,
}

/// An export loaded into memory: header plus data rows in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub format: TableFormat,
    /// Rows dropped under [`MalformedPolicy::Skip`]
    pub skipped_rows: usize,
}

impl ExportTable {
    /// Parses export bytes.
    ///
    /// # Errors
    ///
    /// Returns `Err` if:
    /// - The input has no header record
    /// - The CSV is not valid UTF-8 or cannot be tokenized
    /// - A row is malformed and `policy` is [`MalformedPolicy::Fail`]
    pub fn parse(bytes: &[u8], policy: MalformedPolicy) -> Result<Self> {
        let (bom, body) = match bytes.strip_prefix(UTF8_BOM) {
            Some(rest) => (true, rest),
            None => (false, bytes),
        };
        let format = TableFormat {
            bom,
            crlf: detect_crlf(body),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(body);
        let mut records = reader.records();

        let header: Vec<String> = match records.next() {
            Some(record) => record?.iter().map(String::from).collect(),
            None => return Err(Error::EmptyExport),
        };

        let mut rows = Vec::new();
        let mut skipped_rows = 0;
        for record in records {
            let record = record?;
            if record.len() != header.len() {
                let line = record.position().map_or(0, csv::Position::line);
                match policy {
                    MalformedPolicy::Fail => {
                        return Err(Error::MalformedRow {
                            line,
                            expected: header.len(),
                            found: record.len(),
                        });
                    }
                    MalformedPolicy::Skip => {
                        warn!(
                            "Skipping malformed row at line {}: expected {} fields, found {}",
                            line,
                            header.len(),
                            record.len()
                        );
                        skipped_rows += 1;
                        continue;
                    }
                }
            }
            rows.push(record.iter().map(String::from).collect());
        }

        Ok(Self {
            header,
            rows,
            format,
            skipped_rows,
        })
    }

    /// Serializes the table back to bytes in the source file's format.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the CSV writer fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        if self.format.bom {
            out.extend_from_slice(UTF8_BOM);
        }

        let terminator = if self.format.crlf {
            csv::Terminator::CRLF
        } else {
            csv::Terminator::Any(b'\n')
        };

        {
            let mut writer = csv::WriterBuilder::new()
                .terminator(terminator)
                .flexible(true)
                .from_writer(&mut out);
            writer.write_record(&self.header)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }

        Ok(out)
    }

    /// Finds the first column whose trimmed header matches any of `names`,
    /// ignoring ASCII case.
    pub fn column_index(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| {
            self.header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        })
    }
}

/// The record terminator is taken from the end of the first line.
fn detect_crlf(body: &[u8]) -> bool {
    body.iter()
        .position(|&b| b == b'\n')
        .is_some_and(|i| i > 0 && body[i - 1] == b'\r')
}
