use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::infrastructure::{LockStore, WriteOutcome};
use crate::types::{LockRecord, StoreError};

/// An in-process backing store: a mutex-guarded map of lock records.
///
/// The single mutex is what makes every conditional write atomic, which is
/// exactly the property the protocol leans on. Share one instance behind an
/// `Arc` to let multiple clients contend the way independent processes
/// would against a real store.
pub struct InMemoryLockStore {
    records: Mutex<HashMap<String, LockRecord>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, LockRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of records currently stored, locked or not.
    pub fn record_count(&self) -> usize {
        self.records().len()
    }
}

impl Default for InMemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LockStore for InMemoryLockStore {
    fn read(&self, name: &str) -> Result<Option<LockRecord>, StoreError> {
        Ok(self.records().get(name).cloned())
    }

    fn create(&self, record: &LockRecord) -> Result<WriteOutcome, StoreError> {
        let mut records = self.records();
        if records.contains_key(&record.name) {
            return Ok(WriteOutcome::Rejected);
        }
        records.insert(record.name.clone(), record.clone());
        Ok(WriteOutcome::Applied)
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected_version: &str,
        record: &LockRecord,
    ) -> Result<WriteOutcome, StoreError> {
        let mut records = self.records();
        match records.get(name) {
            Some(current) if current.version == expected_version => {
                records.insert(name.to_string(), record.clone());
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::Rejected),
        }
    }

    fn delete(
        &self,
        name: &str,
        expected_version: &str,
        expected_owner: &str,
    ) -> Result<WriteOutcome, StoreError> {
        let mut records = self.records();
        match records.get(name) {
            Some(current)
                if current.version == expected_version && current.owner == expected_owner =>
            {
                records.remove(name);
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::Rejected),
        }
    }
}
