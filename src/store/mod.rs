//! TID Store
//!
//! Durable mapping from TID to `{status, note, timestamp}`. The dispatch
//! adapter is the only writer and serialises writes per TID, so `put` is a
//! plain last-writer-wins upsert.
//!
//! # Implementations
//!
//! - [`FileTidStore`] - indexed in memory, persisted through a CRC-checked WAL
//!   plus periodic snapshots; writes are on disk before `put` returns
//! - [`MemoryTidStore`] - same contract without durability
//!
//! # Text Format
//!
//! The line-oriented interchange format used by [`dump_text`] and
//! [`import_text`]:
//!
//! ```text
//! <timestamp> <tid:32-or-24-chars> <status-name> [<note>]
//! ```

pub mod file;
pub mod memory;
pub mod snapshot;
pub mod wal;

pub use file::{FileStoreConfig, FileTidStore};
pub use memory::MemoryTidStore;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use std::io::{BufRead, Write};

use crate::tid::Tid;
use crate::unit::{UnitError, UnitRecord, UnitState};

/// Storage contract for TID records
///
/// Every method fails with [`UnitError::StoreUnavailable`] when the backing
/// storage cannot be reached; callers must treat that as "cannot safely
/// execute".
pub trait TidStore: Send + Sync {
    /// Look up a record
    fn get(&self, tid: &Tid) -> Result<Option<UnitRecord>, UnitError>;

    /// Store `record` as is, replacing any record for its TID
    ///
    /// The record's timestamp is kept. Durable before returning `Ok`.
    fn insert_record(&self, record: UnitRecord) -> Result<UnitRecord, UnitError>;

    /// Create or overwrite the record for `tid`, stamped with the current time
    fn put(
        &self,
        tid: &Tid,
        status: UnitState,
        note: Option<&str>,
    ) -> Result<UnitRecord, UnitError> {
        self.insert_record(UnitRecord::new(tid.clone(), status, note.map(str::to_string)))
    }

    fn contains(&self, tid: &Tid) -> Result<bool, UnitError> {
        Ok(self.get(tid)?.is_some())
    }

    /// Remove a record, returning whether it existed
    fn delete(&self, tid: &Tid) -> Result<bool, UnitError>;

    /// Remove every record
    fn clear(&self) -> Result<(), UnitError>;

    /// Records for the given TIDs, or every record when `filter` is empty.
    /// Sorted by TID.
    fn list(&self, filter: &[Tid]) -> Result<Vec<UnitRecord>, UnitError>;

    fn len(&self) -> Result<usize, UnitError>;

    fn is_empty(&self) -> Result<bool, UnitError> {
        Ok(self.len()? == 0)
    }

    /// `put` for an unvalidated TID string
    fn write(
        &self,
        tid: &str,
        status: UnitState,
        note: Option<&str>,
    ) -> Result<UnitRecord, UnitError> {
        let tid = Tid::parse(tid)?;
        self.put(&tid, status, note)
    }
}

// ============================================================
// TEXT LINE FORMAT
// ============================================================

/// Render a record as one text log line (without newline)
pub fn format_line(record: &UnitRecord) -> String {
    let timestamp = record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);
    match &record.note {
        Some(note) if !note.is_empty() => {
            format!("{} {} {} {}", timestamp, record.tid, record.status, note)
        }
        _ => format!("{} {} {}", timestamp, record.tid, record.status),
    }
}

/// Parse one text log line
///
/// The timestamp is either one RFC 3339 token or the space-separated
/// `YYYY-MM-DD HH:MM:SS[.ffffff]` form (UTC) written by the older text log.
pub fn parse_line(line: &str) -> Result<UnitRecord, UnitError> {
    let invalid = || UnitError::CorruptLog(format!("line format invalid: '{}'", line));

    let (timestamp, rest) = split_timestamp(line.trim_end()).ok_or_else(invalid)?;
    let mut parts = rest.splitn(3, ' ');
    let tid = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let status = parts.next().ok_or_else(invalid)?;
    let note = parts.next().map(str::trim).filter(|s| !s.is_empty());

    Ok(UnitRecord {
        tid: Tid::parse(tid)?,
        status: status.parse()?,
        note: note.map(str::to_string),
        timestamp,
    })
}

fn split_timestamp(line: &str) -> Option<(DateTime<Utc>, &str)> {
    let (first, rest) = line.split_once(' ')?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(first) {
        return Some((ts.with_timezone(&Utc), rest));
    }

    NaiveDate::parse_from_str(first, "%Y-%m-%d").ok()?;
    let (time, rest) = rest.split_once(' ')?;
    let ts = NaiveDateTime::parse_from_str(&format!("{} {}", first, time), "%Y-%m-%d %H:%M:%S%.f")
        .ok()?;
    Some((ts.and_utc(), rest))
}

/// Write every record of `store` in text format
pub fn dump_text<W: Write>(store: &dyn TidStore, mut writer: W) -> Result<usize, UnitError> {
    let records = store.list(&[])?;
    for record in &records {
        writeln!(writer, "{}", format_line(record))?;
    }
    writer.flush()?;
    Ok(records.len())
}

/// Load text log lines into `store`
///
/// Later lines for the same TID win, matching an append-only log. Every line
/// is validated before the first write, so a malformed input imports nothing.
pub fn import_text<R: BufRead>(store: &dyn TidStore, reader: R) -> Result<usize, UnitError> {
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_line(&line)?);
    }

    let count = records.len();
    for record in records {
        store.insert_record(record)?;
    }

    tracing::info!(count, "Imported TID text log");
    Ok(count)
}
