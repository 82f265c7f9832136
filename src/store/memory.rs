//! In-memory TID store
//!
//! Same contract as the file store minus durability. Used by tests and by
//! embedders that persist elsewhere.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::TidStore;
use crate::tid::Tid;
use crate::unit::{UnitError, UnitRecord};

pub struct MemoryTidStore {
    records: RwLock<HashMap<Tid, UnitRecord>>,
}

impl MemoryTidStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Tid, UnitRecord>>, UnitError> {
        self.records
            .read()
            .map_err(|_| UnitError::StoreUnavailable("memory store lock poisoned".into()))
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, HashMap<Tid, UnitRecord>>, UnitError> {
        self.records
            .write()
            .map_err(|_| UnitError::StoreUnavailable("memory store lock poisoned".into()))
    }
}

impl Default for MemoryTidStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TidStore for MemoryTidStore {
    fn get(&self, tid: &Tid) -> Result<Option<UnitRecord>, UnitError> {
        Ok(self.read()?.get(tid).cloned())
    }

    fn insert_record(&self, record: UnitRecord) -> Result<UnitRecord, UnitError> {
        self.write_lock()?.insert(record.tid.clone(), record.clone());
        Ok(record)
    }

    fn delete(&self, tid: &Tid) -> Result<bool, UnitError> {
        Ok(self.write_lock()?.remove(tid).is_some())
    }

    fn clear(&self) -> Result<(), UnitError> {
        self.write_lock()?.clear();
        Ok(())
    }

    fn list(&self, filter: &[Tid]) -> Result<Vec<UnitRecord>, UnitError> {
        let records = self.read()?;
        let mut out: Vec<UnitRecord> = if filter.is_empty() {
            records.values().cloned().collect()
        } else {
            filter
                .iter()
                .filter_map(|tid| records.get(tid).cloned())
                .collect()
        };
        out.sort_by(|a, b| a.tid.cmp(&b.tid));
        out.dedup_by(|a, b| a.tid == b.tid);
        Ok(out)
    }

    fn len(&self) -> Result<usize, UnitError> {
        Ok(self.read()?.len())
    }
}
