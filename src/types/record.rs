use serde::{Deserialize, Serialize};

/// The durable state of a single named lock as stored in the backing store.
///
/// The `version` token changes on every successful write and is the token
/// every conditional write compares against; it is never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Unique lock name, the primary key in the backing store
    pub name: String,
    /// Opaque identifier of the client currently holding the lock
    pub owner: String,
    /// Opaque compare-and-swap token, fresh on every write
    pub version: String,
    /// True while the lock is held
    pub is_locked: bool,
    /// Lease length granted at the last write, in milliseconds
    pub duration_ms: u64,
    /// Wall-clock time of the last successful write, ms since the epoch
    pub acquired_at_ms: u64,
    /// Caller-supplied metadata, untouched by the protocol
    pub payload: Option<Vec<u8>>,
}

impl LockRecord {
    /// A record past its lease is abandoned and eligible for seizure
    /// regardless of who owns it.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.acquired_at_ms.saturating_add(self.duration_ms) < now_ms
    }

    /// Read-only projection with the version stripped, so callers cannot
    /// be tempted to reuse it for a conditional write.
    pub fn into_view(self) -> LockRecordView {
        LockRecordView {
            name: self.name,
            owner: self.owner,
            is_locked: self.is_locked,
            duration_ms: self.duration_ms,
            acquired_at_ms: self.acquired_at_ms,
            payload: self.payload,
        }
    }
}

/// What `retrieve` hands back: the logical value of a record without the
/// compare-and-swap token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecordView {
    pub name: String,
    pub owner: String,
    pub is_locked: bool,
    pub duration_ms: u64,
    pub acquired_at_ms: u64,
    pub payload: Option<Vec<u8>>,
}

/// A client's local view of a lock it believes it holds.
///
/// The owning `LockClient` keeps the canonical copy in its handle table;
/// copies handed to callers are snapshots, and `touch`/`release` always
/// consult the canonical entry by name. A handle is destroyed on release
/// or when renewal permanently fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHandle {
    pub name: String,
    pub owner: String,
    pub version: String,
    pub duration_ms: u64,
    pub acquired_at_ms: u64,
    pub payload: Option<Vec<u8>>,
    /// Local renewal time used to judge expiry without re-reading the store
    pub last_renewed_at_ms: u64,
}

impl LockHandle {
    pub fn from_record(record: LockRecord, now_ms: u64) -> Self {
        Self {
            name: record.name,
            owner: record.owner,
            version: record.version,
            duration_ms: record.duration_ms,
            acquired_at_ms: record.acquired_at_ms,
            payload: record.payload,
            last_renewed_at_ms: now_ms,
        }
    }

    /// Expiry judged from the last local renewal, not the store.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.last_renewed_at_ms.saturating_add(self.duration_ms) < now_ms
    }

    pub fn view(&self) -> LockRecordView {
        LockRecordView {
            name: self.name.clone(),
            owner: self.owner.clone(),
            is_locked: true,
            duration_ms: self.duration_ms,
            acquired_at_ms: self.acquired_at_ms,
            payload: self.payload.clone(),
        }
    }
}
