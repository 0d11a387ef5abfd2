use thiserror::Error;

/// Failures coming out of a backing-store adapter: network, auth, I/O.
///
/// A rejected conditional write is *not* an error; adapters report that
/// through `WriteOutcome::Rejected` and the client loops on it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backing store failure: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Backend {
            message: err.to_string(),
        }
    }
}

/// Errors surfaced by `LockClient` operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock could not be obtained before the acquire timeout, or a
    /// `no_wait` attempt found it held. Recoverable; the caller decides
    /// whether to retry. Carries the last transient store failure when
    /// store trouble, not contention, exhausted the budget.
    #[error("could not acquire lock `{name}`")]
    NotGranted {
        name: String,
        #[source]
        source: Option<StoreError>,
    },

    /// Touch or release attempted by a client that is not the recorded
    /// owner. Always a caller bug or a lock already lost; never retried.
    #[error("lock `{name}` is not owned by this client")]
    NotOwner { name: String },

    /// Lock names must be non-empty.
    #[error("invalid lock name `{name}`")]
    InvalidName { name: String },

    /// Pass-through adapter failure outside the acquire retry loop.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rejections raised when validating a `LockPolicy` at client construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The renewal period must leave room for at least one renewal attempt
    /// before the lease runs out.
    #[error("renew_period must be shorter than lock_duration")]
    RenewPeriodTooLong,

    #[error("{field} must be non-zero")]
    ZeroDuration { field: &'static str },
}
