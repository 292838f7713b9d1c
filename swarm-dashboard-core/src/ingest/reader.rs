//! Incremental NDJSON line reader
//!
//! # Error Handling
//!
//! The reader tolerates whatever an uncoordinated writer leaves behind:
//!
//! - **Malformed lines**: invalid UTF-8, invalid JSON, or JSON that is not an
//!   object. Counted, recorded as a warning, skipped. The bytes are still
//!   consumed so the same garbage is never re-read.
//!
//! - **Blank lines**: consumed silently.
//!
//! - **Incomplete last line**: the writer has not flushed its terminator yet.
//!   The line is left unconsumed and `new_offset` stops in front of it, so the
//!   next read picks it up once complete.
//!
//! Only failing to open, seek or read the file is an error.

use crate::error::{Error, Result};
use crate::types::{EventKind, EventRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Warnings kept per batch; the malformed count keeps counting past this.
const MAX_WARNINGS: usize = 20;

/// Field names accepted for the event timestamp, in priority order.
const TIMESTAMP_FIELDS: [&str; 3] = ["ts", "timestamp", "time"];

/// Field names accepted for the event kind, in priority order.
const KIND_FIELDS: [&str; 2] = ["kind", "type"];

/// Result of reading one file range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadBatch {
    pub start_offset: u64,
    /// Offset just past the last complete line
    pub new_offset: u64,
    pub records: Vec<EventRecord>,
    /// Complete lines that could not be decoded
    pub malformed: u64,
    pub warnings: Vec<String>,
}

impl ReadBatch {
    /// A batch that consumed nothing.
    pub fn empty(offset: u64) -> Self {
        Self {
            start_offset: offset,
            new_offset: offset,
            ..Default::default()
        }
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.new_offset - self.start_offset
    }
}

/// Read every complete line of `path` from `start_offset` to end of file.
pub fn read_new(path: &Path, start_offset: u64) -> Result<ReadBatch> {
    let file = File::open(path).map_err(|e| Error::file_access(path, &e))?;

    let mut reader = BufReader::new(file);
    if start_offset > 0 {
        reader
            .seek(SeekFrom::Start(start_offset))
            .map_err(|e| Error::file_access(path, &e))?;
    }

    let mut batch = ReadBatch::empty(start_offset);
    let mut current_offset = start_offset;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| Error::file_access(path, &e))?;
        if n == 0 {
            break;
        }
        if buf.last() != Some(&b'\n') {
            tracing::trace!(
                path = %path.display(),
                offset = current_offset,
                pending_bytes = n,
                "Leaving unterminated line for next read"
            );
            break;
        }

        let line_offset = current_offset;
        current_offset += n as u64;
        batch.new_offset = current_offset;

        match decode_line(&buf[..n - 1], line_offset) {
            Ok(Some(record)) => batch.records.push(record),
            Ok(None) => {}
            Err(reason) => {
                batch.malformed += 1;
                if batch.warnings.len() < MAX_WARNINGS {
                    batch
                        .warnings
                        .push(format!("line offset {}: {}", line_offset, reason));
                }
            }
        }
    }

    if batch.malformed > 0 {
        tracing::warn!(
            path = %path.display(),
            malformed = batch.malformed,
            decoded = batch.records.len(),
            "Skipped malformed log lines"
        );
    }

    Ok(batch)
}

/// Decode one line (without its `\n`).
///
/// Returns `Ok(None)` for blank lines and `Err(reason)` for malformed ones.
pub fn decode_line(line: &[u8], offset: u64) -> std::result::Result<Option<EventRecord>, String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let text = std::str::from_utf8(line).map_err(|e| format!("invalid UTF-8: {}", e))?;
    if text.trim().is_empty() {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| format!("JSON parse error: {}", e))?;
    let Value::Object(payload) = value else {
        return Err("expected a JSON object".to_string());
    };

    let timestamp = TIMESTAMP_FIELDS
        .iter()
        .find_map(|field| payload.get(*field).and_then(parse_timestamp));

    let raw_kind = KIND_FIELDS
        .iter()
        .find_map(|field| payload.get(*field).and_then(|v| v.as_str()))
        .unwrap_or_default()
        .to_string();

    let kind = if raw_kind.is_empty() && payload.contains_key("name") {
        EventKind::ToolUse
    } else {
        EventKind::from_raw(&raw_kind)
    };

    Ok(Some(EventRecord {
        timestamp,
        kind,
        raw_kind,
        offset,
        payload,
    }))
}

/// Parse an RFC 3339 string or a Unix epoch number (seconds, or milliseconds
/// when larger than 1e12).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_f64()?;
            if !raw.is_finite() || raw < 0.0 {
                return None;
            }
            let millis = if raw > 1e12 { raw } else { raw * 1000.0 };
            DateTime::<Utc>::from_timestamp_millis(millis as i64)
        }
        _ => None,
    }
}
