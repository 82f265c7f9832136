//! File-backed TID store
//!
//! Records live in an in-memory index; every mutation is appended to the WAL
//! and flushed (and synced, if configured) before the index changes and
//! before the call returns.
//!
//! # Directory Layout
//!
//! ```text
//! <data_dir>/
//! ├── wal/current.wal      # mutations since the last snapshot
//! └── snapshots/tids.json  # full record set at `last_seq`
//! ```
//!
//! # Recovery
//!
//! 1. Load `snapshots/tids.json` if present
//! 2. Replay WAL entries with `seq_id > last_seq`
//! 3. Truncate a torn final entry, fail on a checksum mismatch
//!
//! # Failure Policy
//!
//! A failed WAL write leaves the file in an unknown state, so the store
//! closes itself; every later call reports `StoreUnavailable` until it is
//! reopened (which truncates any torn tail).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::TidStore;
use super::snapshot::{Snapshotter, TidSnapshot};
use super::wal::{TidWal, WalEntryType, WalReader};
use crate::tid::Tid;
use crate::unit::{UnitError, UnitRecord};

/// Configuration for the file store
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    pub data_dir: PathBuf,
    /// `sync_data` after each mutation
    pub sync_on_write: bool,
    /// Snapshot + truncate the WAL after this many mutations (0 = never)
    pub compact_every: u64,
}

impl FileStoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            sync_on_write: true,
            compact_every: 10_000,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("wal").join("current.wal")
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }
}

struct Inner {
    index: HashMap<Tid, UnitRecord>,
    wal: TidWal,
    since_compact: u64,
}

/// Durable TID store
pub struct FileTidStore {
    config: FileStoreConfig,
    inner: Mutex<Option<Inner>>,
}

/// What `open` found on disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub snapshot_records: usize,
    pub wal_entries: u64,
    pub torn_tail_truncated: bool,
    pub records: usize,
}

impl FileTidStore {
    /// Open (or create) the store, recovering from snapshot + WAL
    pub fn open(config: FileStoreConfig) -> Result<Self, UnitError> {
        let (store, _) = Self::open_with_stats(config)?;
        Ok(store)
    }

    pub fn open_with_stats(config: FileStoreConfig) -> Result<(Self, RecoveryStats), UnitError> {
        std::fs::create_dir_all(config.data_dir.join("wal"))?;

        let mut stats = RecoveryStats::default();
        let mut index = HashMap::new();

        let snapshot = Snapshotter::new(config.snapshot_dir())
            .load()
            .map_err(|e| UnitError::CorruptLog(format!("snapshot: {}", e)))?;
        let mut last_seq = 0;
        if let Some(snapshot) = snapshot {
            last_seq = snapshot.last_seq;
            stats.snapshot_records = snapshot.records.len();
            for record in snapshot.records {
                index.insert(record.tid.clone(), record);
            }
        }

        let wal_path = config.wal_path();
        let (replayed, max_seq, torn) = replay_wal(&wal_path, last_seq, &mut index)?;
        stats.wal_entries = replayed;
        stats.torn_tail_truncated = torn;
        stats.records = index.len();

        let wal = TidWal::open(&wal_path, max_seq.max(last_seq) + 1, config.sync_on_write)?;

        if stats.snapshot_records == 0 && replayed == 0 {
            tracing::info!(data_dir = %config.data_dir.display(), "TID store cold start");
        } else {
            tracing::info!(
                data_dir = %config.data_dir.display(),
                snapshot_records = stats.snapshot_records,
                wal_entries = replayed,
                records = stats.records,
                "TID store recovered"
            );
        }

        let store = Self {
            config,
            inner: Mutex::new(Some(Inner {
                index,
                wal,
                since_compact: replayed,
            })),
        };
        Ok((store, stats))
    }

    pub fn config(&self) -> &FileStoreConfig {
        &self.config
    }

    /// Flush and release the WAL; later calls fail with `StoreUnavailable`
    pub fn close(&self) -> Result<(), UnitError> {
        let mut guard = self.lock()?;
        if let Some(mut inner) = guard.take() {
            inner.wal.commit()?;
            tracing::info!(data_dir = %self.config.data_dir.display(), "TID store closed");
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Write a snapshot of every record and truncate the WAL
    pub fn compact(&self) -> Result<usize, UnitError> {
        let mut guard = self.lock()?;
        let inner = open_inner(&mut guard)?;
        let count = Self::compact_locked(&self.config, inner)?;
        Ok(count)
    }

    fn compact_locked(config: &FileStoreConfig, inner: &mut Inner) -> Result<usize, UnitError> {
        inner.wal.commit()?;
        let mut records: Vec<UnitRecord> = inner.index.values().cloned().collect();
        records.sort_by(|a, b| a.tid.cmp(&b.tid));
        let count = records.len();

        Snapshotter::new(config.snapshot_dir())
            .write(&TidSnapshot::new(inner.wal.current_seq(), records))?;
        inner.wal.truncate()?;
        inner.since_compact = 0;

        Ok(count)
    }

    /// Append one entry and make it durable; closes the store on failure
    fn append(
        &self,
        guard: &mut MutexGuard<'_, Option<Inner>>,
        entry_type: WalEntryType,
        payload: &[u8],
    ) -> Result<(), UnitError> {
        let inner = open_inner(guard)?;
        let result = inner
            .wal
            .append(entry_type, payload)
            .and_then(|_| inner.wal.commit());

        if let Err(e) = result {
            tracing::error!(
                error = %e,
                data_dir = %self.config.data_dir.display(),
                "TID WAL write failed, closing store"
            );
            guard.take();
            return Err(UnitError::StoreUnavailable(e.to_string()));
        }
        inner.since_compact += 1;
        Ok(())
    }

    fn maybe_compact(&self, guard: &mut MutexGuard<'_, Option<Inner>>) {
        if self.config.compact_every == 0 {
            return;
        }
        let Some(inner) = guard.as_mut() else {
            return;
        };
        if inner.since_compact < self.config.compact_every {
            return;
        }
        // The mutation is already durable in the WAL; a failed compaction only
        // delays truncation.
        if let Err(e) = Self::compact_locked(&self.config, inner) {
            tracing::warn!(error = %e, "TID store compaction failed");
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Inner>>, UnitError> {
        self.inner
            .lock()
            .map_err(|_| UnitError::StoreUnavailable("file store lock poisoned".into()))
    }
}

fn open_inner<'a>(guard: &'a mut MutexGuard<'_, Option<Inner>>) -> Result<&'a mut Inner, UnitError> {
    guard
        .as_mut()
        .ok_or_else(|| UnitError::StoreUnavailable("TID store is closed".into()))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, UnitError> {
    bincode::serialize(value).map_err(|e| UnitError::StoreUnavailable(e.to_string()))
}

/// Replay WAL entries newer than `after_seq` into `index`
///
/// Returns (entries applied, highest seq seen, torn tail truncated).
fn replay_wal(
    path: &Path,
    after_seq: u64,
    index: &mut HashMap<Tid, UnitRecord>,
) -> Result<(u64, u64, bool), UnitError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((0, 0, false)),
        Err(e) => return Err(e.into()),
    };

    let mut reader = WalReader::new(BufReader::new(file));
    let mut applied = 0u64;
    let mut max_seq = 0u64;

    loop {
        let entry = match reader.read_entry() {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return Err(UnitError::CorruptLog(e.to_string())),
        };
        max_seq = max_seq.max(entry.header.seq_id);
        if entry.header.seq_id <= after_seq {
            continue;
        }

        let corrupt = |e: Box<bincode::ErrorKind>| {
            UnitError::CorruptLog(format!("seq_id={}: {}", entry.header.seq_id, e))
        };
        let entry_type = WalEntryType::try_from(entry.header.entry_type)
            .map_err(|e| UnitError::CorruptLog(e.to_string()))?;
        match entry_type {
            WalEntryType::Put => {
                let record: UnitRecord = bincode::deserialize(&entry.payload).map_err(corrupt)?;
                index.insert(record.tid.clone(), record);
            }
            WalEntryType::Delete => {
                let tid: Tid = bincode::deserialize(&entry.payload).map_err(corrupt)?;
                index.remove(&tid);
            }
            WalEntryType::Clear => index.clear(),
        }
        applied += 1;
    }

    let torn = reader.torn_tail();
    if torn {
        tracing::warn!(
            path = %path.display(),
            valid_len = reader.valid_len(),
            "Truncating torn TID WAL tail"
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(reader.valid_len())?;
        file.sync_all()?;
    }

    Ok((applied, max_seq, torn))
}

impl TidStore for FileTidStore {
    fn get(&self, tid: &Tid) -> Result<Option<UnitRecord>, UnitError> {
        let mut guard = self.lock()?;
        Ok(open_inner(&mut guard)?.index.get(tid).cloned())
    }

    fn insert_record(&self, record: UnitRecord) -> Result<UnitRecord, UnitError> {
        let payload = encode(&record)?;

        let mut guard = self.lock()?;
        self.append(&mut guard, WalEntryType::Put, &payload)?;
        open_inner(&mut guard)?
            .index
            .insert(record.tid.clone(), record.clone());
        self.maybe_compact(&mut guard);

        Ok(record)
    }

    fn delete(&self, tid: &Tid) -> Result<bool, UnitError> {
        let mut guard = self.lock()?;
        if !open_inner(&mut guard)?.index.contains_key(tid) {
            return Ok(false);
        }
        self.append(&mut guard, WalEntryType::Delete, &encode(tid)?)?;
        open_inner(&mut guard)?.index.remove(tid);
        self.maybe_compact(&mut guard);
        Ok(true)
    }

    fn clear(&self) -> Result<(), UnitError> {
        let mut guard = self.lock()?;
        self.append(&mut guard, WalEntryType::Clear, &[])?;
        open_inner(&mut guard)?.index.clear();
        self.maybe_compact(&mut guard);
        Ok(())
    }

    fn list(&self, filter: &[Tid]) -> Result<Vec<UnitRecord>, UnitError> {
        let mut guard = self.lock()?;
        let index = &open_inner(&mut guard)?.index;
        let mut out: Vec<UnitRecord> = if filter.is_empty() {
            index.values().cloned().collect()
        } else {
            filter
                .iter()
                .filter_map(|tid| index.get(tid).cloned())
                .collect()
        };
        out.sort_by(|a, b| a.tid.cmp(&b.tid));
        out.dedup_by(|a, b| a.tid == b.tid);
        Ok(out)
    }

    fn len(&self) -> Result<usize, UnitError> {
        let mut guard = self.lock()?;
        Ok(open_inner(&mut guard)?.index.len())
    }
}
