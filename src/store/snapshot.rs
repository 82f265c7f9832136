//! TID Store Snapshot
//!
//! JSON image of the full record set, written atomically so the WAL can be
//! truncated afterwards.
//!
//! ```text
//! snapshots/
//! ├── .tmp-tids.json   # written and synced first
//! └── tids.json        # renamed into place
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::unit::UnitRecord;

const SNAPSHOT_FILE: &str = "tids.json";
const TMP_FILE: &str = ".tmp-tids.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TidSnapshot {
    pub format_version: u32,
    /// Highest WAL seq_id folded into this snapshot
    pub last_seq: u64,
    pub created_at: DateTime<Utc>,
    pub records: Vec<UnitRecord>,
}

impl TidSnapshot {
    pub const FORMAT_VERSION: u32 = 1;

    pub fn new(last_seq: u64, records: Vec<UnitRecord>) -> Self {
        Self {
            format_version: Self::FORMAT_VERSION,
            last_seq,
            created_at: Utc::now(),
            records,
        }
    }
}

pub struct Snapshotter {
    snapshot_dir: PathBuf,
}

impl Snapshotter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            snapshot_dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Write the snapshot via temp file + rename
    pub fn write(&self, snapshot: &TidSnapshot) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.snapshot_dir)?;

        let tmp_path = self.snapshot_dir.join(TMP_FILE);
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, snapshot)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        let final_path = self.snapshot_dir.join(SNAPSHOT_FILE);
        fs::rename(&tmp_path, &final_path)?;

        tracing::info!(
            last_seq = snapshot.last_seq,
            records = snapshot.records.len(),
            path = %final_path.display(),
            "TID snapshot written"
        );

        Ok(final_path)
    }

    /// Load the latest snapshot, `None` on cold start
    pub fn load(&self) -> io::Result<Option<TidSnapshot>> {
        let path = self.snapshot_dir.join(SNAPSHOT_FILE);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let snapshot: TidSnapshot = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if snapshot.format_version != TidSnapshot::FORMAT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "unsupported snapshot format version {}",
                    snapshot.format_version
                ),
            ));
        }

        Ok(Some(snapshot))
    }
}
