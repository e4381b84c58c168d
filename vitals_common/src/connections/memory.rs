//! In-process stand-ins for Redis and PostgreSQL.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::{CacheStore, HealthRecord, RecordStore, StoreError};

struct CacheEntry {
    value: String,
    ttl: Duration,
    stored_at: Instant,
}

/// HashMap cache honouring TTLs. Expired keys are dropped on read and
/// swept on every write.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// TTL the key was last stored with.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|entry| entry.ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| entry.stored_at.elapsed() < entry.ttl);
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                ttl,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < entry.ttl => {
                return Ok(Some(entry.value.clone()))
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }
}

/// Records kept by [`MemoryRecordStore::new`] before the oldest are evicted.
pub const DEFAULT_MAX_RECORDS: usize = 100_000;

/// Bounded record store with sequential ids starting at 1. Ids keep counting
/// when old records are evicted.
pub struct MemoryRecordStore {
    records: Mutex<VecDeque<(i64, HealthRecord)>>,
    next_id: AtomicI64,
    max_records: usize,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::with_max_records(DEFAULT_MAX_RECORDS)
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_records(max_records: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            next_id: AtomicI64::new(0),
            max_records: max_records.max(1),
        }
    }

    /// Copy of everything inserted so far, in insertion order.
    pub fn records(&self) -> Vec<(i64, HealthRecord)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &HealthRecord) -> Result<i64, StoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        if records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back((id, record.clone()));
        Ok(id)
    }
}
