use crate::types::{LockRecord, StoreError};

/// Outcome of a conditional write. `Rejected` means the store's
/// precondition failed (record exists, version mismatch); it is the normal
/// contention edge of the protocol, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    Rejected,
}

/// The contract the lock protocol needs from a backing store.
///
/// Four primitives are sufficient: no scans, no range queries, no
/// multi-record transactions. Two hard requirements on implementors:
/// every write precondition must be checked atomically with the write,
/// and `read` must be strongly consistent. The protocol is unsound over
/// eventually consistent reads.
pub trait LockStore: Send + Sync {
    /// Strongly consistent point read.
    fn read(&self, name: &str) -> Result<Option<LockRecord>, StoreError>;

    /// Put with the precondition "no record exists at this name".
    fn create(&self, record: &LockRecord) -> Result<WriteOutcome, StoreError>;

    /// Put with the precondition "the stored version equals
    /// `expected_version`".
    fn compare_and_swap(
        &self,
        name: &str,
        expected_version: &str,
        record: &LockRecord,
    ) -> Result<WriteOutcome, StoreError>;

    /// Delete with the precondition "version and owner both match".
    fn delete(
        &self,
        name: &str,
        expected_version: &str,
        expected_owner: &str,
    ) -> Result<WriteOutcome, StoreError>;
}

/// Maps the logical record fields to physical attribute names, for stores
/// whose table layout is caller-configurable. Defaults follow the compact
/// single-letter attributes of the original lock table.
#[derive(Debug, Clone)]
pub struct LockSchema {
    pub table_name: String,
    pub name: String,
    pub owner: String,
    pub version: String,
    pub is_locked: String,
    pub duration: String,
    pub acquired_at: String,
    pub payload: String,
}

impl Default for LockSchema {
    fn default() -> Self {
        Self {
            table_name: "locks".to_string(),
            name: "N".to_string(),
            owner: "O".to_string(),
            version: "V".to_string(),
            is_locked: "L".to_string(),
            duration: "D".to_string(),
            acquired_at: "A".to_string(),
            payload: "P".to_string(),
        }
    }
}
