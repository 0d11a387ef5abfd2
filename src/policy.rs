//! Timing policy and identity generation for a lock client.
//!
//! Everything configurable or non-deterministic lives here so the protocol
//! logic in `client` stays deterministic and testable: owner/version id
//! generation, the clock, and the four timing knobs.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nanoid::nanoid;

use crate::types::PolicyError;

/// Injectable time source. Milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time. The default for production clients.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Hand-driven clock for tests: time moves only when told to.
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// The timing and behavior policy for a `LockClient`.
///
/// Validated when the client is constructed; see [`LockPolicy::validate`].
#[derive(Clone)]
pub struct LockPolicy {
    /// Lease length granted to a newly acquired lock
    pub lock_duration: Duration,
    /// Hard deadline for a blocking `acquire` call
    pub acquire_timeout: Duration,
    /// Delay between probes while waiting on a contended lock
    pub retry_period: Duration,
    /// Interval on which the renewal worker re-touches held locks
    pub renew_period: Duration,
    /// Delete records on release instead of marking them unlocked
    pub delete_on_release: bool,
    /// Best-effort release of remaining handles during shutdown; disable
    /// to let locks expire naturally instead of blocking shutdown
    pub release_on_shutdown: bool,
    pub clock: Arc<dyn Clock>,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            lock_duration: Duration::from_secs(5 * 60),
            acquire_timeout: Duration::from_secs(5 * 60),
            retry_period: Duration::from_secs(1),
            renew_period: Duration::from_secs(60),
            delete_on_release: true,
            release_on_shutdown: true,
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for LockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockPolicy")
            .field("lock_duration", &self.lock_duration)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("retry_period", &self.retry_period)
            .field("renew_period", &self.renew_period)
            .field("delete_on_release", &self.delete_on_release)
            .field("release_on_shutdown", &self.release_on_shutdown)
            .finish_non_exhaustive()
    }
}

impl LockPolicy {
    /// Reject timing combinations that cannot keep a lease alive.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.retry_period.is_zero() {
            return Err(PolicyError::ZeroDuration {
                field: "retry_period",
            });
        }
        if self.renew_period.is_zero() {
            return Err(PolicyError::ZeroDuration {
                field: "renew_period",
            });
        }
        if self.lock_duration.is_zero() {
            return Err(PolicyError::ZeroDuration {
                field: "lock_duration",
            });
        }
        if self.renew_period >= self.lock_duration {
            return Err(PolicyError::RenewPeriodTooLong);
        }
        Ok(())
    }

    /// Owner id unique to this process instance: hostname plus a random id.
    /// Called once per client construction.
    pub fn new_owner_id(&self) -> String {
        let host = gethostname::gethostname();
        format!("{}.{}", host.to_string_lossy(), nanoid!())
    }

    /// Fresh compare-and-swap token, one per write.
    pub fn new_version_id(&self) -> String {
        nanoid!()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}
