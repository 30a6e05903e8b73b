// 🗃️ Persistence collaborators
//
// The service reads inmate records and behavior history through these traits.
// Implementations must make append_batch atomic: either the whole batch lands
// or nothing does, and a second batch for the same (inmate, year, month) fails
// with StoreError::Conflict.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::records::{BehaviorLogEntry, InmateRecord, SubmissionBatch};

/// Read side of inmate management
pub trait InmateDirectory: Send + Sync {
    fn find_inmate(&self, inmate_id: &str) -> Result<Option<InmateRecord>, StoreError>;
}

/// Append-only behavior history
pub trait BehaviorStore: Send + Sync {
    /// All entries for an inmate, chronological
    fn list_entries(&self, inmate_id: &str) -> Result<Vec<BehaviorLogEntry>, StoreError>;

    /// All batches for an inmate, chronological
    fn list_batches(&self, inmate_id: &str) -> Result<Vec<SubmissionBatch>, StoreError>;

    /// Persist a batch with its entries, or fail with Conflict if the month is taken
    fn append_batch(&self, batch: &SubmissionBatch) -> Result<(), StoreError>;
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-process store backed by locks
///
/// Append-only like the SQLite store; the month check and the append happen
/// under the same write lock.
#[derive(Default)]
pub struct MemoryStore {
    inmates: RwLock<HashMap<String, InmateRecord>>,
    batches: RwLock<HashMap<String, Vec<SubmissionBatch>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an inmate record
    pub fn upsert_inmate(&self, record: InmateRecord) -> Result<(), StoreError> {
        let mut inmates = self.inmates.write().map_err(|_| StoreError::Poisoned)?;
        inmates.insert(record.inmate_id.clone(), record);
        Ok(())
    }

    /// Number of batches stored across all inmates
    pub fn batch_count(&self) -> Result<usize, StoreError> {
        let batches = self.batches.read().map_err(|_| StoreError::Poisoned)?;
        Ok(batches.values().map(Vec::len).sum())
    }
}

impl InmateDirectory for MemoryStore {
    fn find_inmate(&self, inmate_id: &str) -> Result<Option<InmateRecord>, StoreError> {
        let inmates = self.inmates.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inmates.get(inmate_id).cloned())
    }
}

impl BehaviorStore for MemoryStore {
    fn list_entries(&self, inmate_id: &str) -> Result<Vec<BehaviorLogEntry>, StoreError> {
        let batches = self.batches.read().map_err(|_| StoreError::Poisoned)?;
        Ok(batches
            .get(inmate_id)
            .map(|list| {
                list.iter()
                    .flat_map(|batch| batch.entries.iter().cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_batches(&self, inmate_id: &str) -> Result<Vec<SubmissionBatch>, StoreError> {
        let batches = self.batches.read().map_err(|_| StoreError::Poisoned)?;
        Ok(batches.get(inmate_id).cloned().unwrap_or_default())
    }

    fn append_batch(&self, batch: &SubmissionBatch) -> Result<(), StoreError> {
        let mut batches = self.batches.write().map_err(|_| StoreError::Poisoned)?;
        let list = batches.entry(batch.inmate_id.clone()).or_default();

        let (year, month) = batch.period();
        if list.iter().any(|existing| existing.period() == (year, month)) {
            warn!(
                inmate_id = %batch.inmate_id,
                year,
                month,
                "rejecting second behavior batch for month"
            );
            return Err(StoreError::Conflict {
                inmate_id: batch.inmate_id.clone(),
                year,
                month,
            });
        }

        list.push(batch.clone());
        debug!(inmate_id = %batch.inmate_id, batch_id = %batch.batch_id, "batch stored in memory");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
