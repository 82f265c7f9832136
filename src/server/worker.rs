//! Retention Worker
//!
//! Background worker that purges CONFIRMED records once they are old enough
//! that no transport will redeliver the unit.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::store::TidStore;
use crate::unit::{UnitError, UnitState};

/// Configuration for the retention worker
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// How often to scan the store
    pub scan_interval: Duration,
    /// How long a CONFIRMED record is kept
    pub max_age: Duration,
    /// Maximum records deleted per scan
    pub batch_size: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(300),
            max_age: Duration::from_secs(7 * 24 * 3600),
            batch_size: 1000,
        }
    }
}

/// Retention Worker
///
/// Only CONFIRMED records are eligible: every other state may still see a
/// retry, and dropping it would re-arm `check` for that TID.
pub struct RetentionWorker {
    store: Arc<dyn TidStore>,
    config: RetentionConfig,
}

impl RetentionWorker {
    pub fn new(store: Arc<dyn TidStore>, config: RetentionConfig) -> Self {
        Self { store, config }
    }

    pub fn with_defaults(store: Arc<dyn TidStore>) -> Self {
        Self::new(store, RetentionConfig::default())
    }

    /// Run the retention loop forever
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            max_age_secs = self.config.max_age.as_secs(),
            "Starting retention worker"
        );

        loop {
            // Store I/O is blocking; keep it off the async worker threads
            let store = Arc::clone(&self.store);
            let config = self.config.clone();
            match tokio::task::spawn_blocking(move || purge_confirmed(store.as_ref(), &config)).await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!(error = %e, "Retention scan failed"),
                Err(e) => error!(error = %e, "Retention scan task aborted"),
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single scan, returning the number of records purged
    pub fn scan_and_purge(&self) -> Result<usize, UnitError> {
        purge_confirmed(self.store.as_ref(), &self.config)
    }
}

/// Delete up to `batch_size` CONFIRMED records older than `max_age`
pub fn purge_confirmed(store: &dyn TidStore, config: &RetentionConfig) -> Result<usize, UnitError> {
    let max_age = chrono::Duration::from_std(config.max_age)
        .map_err(|e| UnitError::NotConfigured(format!("retention max_age: {}", e)))?;
    let cutoff = Utc::now() - max_age;

    let expired: Vec<_> = store
        .list(&[])?
        .into_iter()
        .filter(|r| r.status == UnitState::Confirmed && r.timestamp <= cutoff)
        .take(config.batch_size)
        .collect();

    if expired.is_empty() {
        debug!("No expired TID records");
        return Ok(0);
    }

    let mut purged = 0;
    for record in &expired {
        if store.delete(&record.tid)? {
            purged += 1;
        }
    }

    info!(purged, cutoff = %cutoff, "Purged confirmed TID records");
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTidStore;
    use crate::tid::Tid;

    fn tid(c: char) -> Tid {
        Tid::parse(&c.to_string().repeat(32)).unwrap()
    }

    fn config(max_age: Duration, batch_size: usize) -> RetentionConfig {
        RetentionConfig {
            scan_interval: Duration::from_millis(10),
            max_age,
            batch_size,
        }
    }

    #[test]
    fn test_purges_only_confirmed() {
        let store = MemoryTidStore::new();
        store.put(&tid('A'), UnitState::Confirmed, None).unwrap();
        store.put(&tid('B'), UnitState::Committed, None).unwrap();
        store.put(&tid('C'), UnitState::RolledBack, None).unwrap();

        let purged = purge_confirmed(&store, &config(Duration::ZERO, 100)).unwrap();
        assert_eq!(purged, 1);
        assert!(!store.contains(&tid('A')).unwrap());
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_keeps_young_records() {
        let store = MemoryTidStore::new();
        store.put(&tid('A'), UnitState::Confirmed, None).unwrap();

        let purged = purge_confirmed(&store, &config(Duration::from_secs(3600), 100)).unwrap();
        assert_eq!(purged, 0);
        assert!(store.contains(&tid('A')).unwrap());
    }

    #[test]
    fn test_imported_old_confirmed_records_are_purged() {
        let store = MemoryTidStore::new();
        let text = format!(
            "2020-01-01T00:00:00.000000Z {} confirmed\n2020-01-01 00:00:00 {} committed\n",
            tid('A'),
            tid('B')
        );
        crate::store::import_text(&store, text.as_bytes()).unwrap();
        store.put(&tid('C'), UnitState::Confirmed, None).unwrap();

        let one_day = Duration::from_secs(24 * 3600);
        assert_eq!(purge_confirmed(&store, &config(one_day, 100)).unwrap(), 1);
        assert!(!store.contains(&tid('A')).unwrap());
        assert!(store.contains(&tid('B')).unwrap());
        assert!(store.contains(&tid('C')).unwrap());
    }

    #[test]
    fn test_batch_size_limits_scan() {
        let store = MemoryTidStore::new();
        for c in ['A', 'B', 'C'] {
            store.put(&tid(c), UnitState::Confirmed, None).unwrap();
        }

        let cfg = config(Duration::ZERO, 2);
        assert_eq!(purge_confirmed(&store, &cfg).unwrap(), 2);
        assert_eq!(purge_confirmed(&store, &cfg).unwrap(), 1);
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_worker_loop_purges() {
        let store: Arc<dyn TidStore> = Arc::new(MemoryTidStore::new());
        store.put(&tid('A'), UnitState::Confirmed, None).unwrap();

        let worker = RetentionWorker::new(Arc::clone(&store), config(Duration::ZERO, 10));
        let handle = tokio::spawn(async move {
            worker.run().await;
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();
        assert!(store.is_empty().unwrap());
    }
}
