//! The lock client: acquire, touch, release, retrieve.
//!
//! The client never coordinates locally; the backing store's conditional
//! writes are the only source of ordering truth. Whichever contender's
//! create or compare-and-swap the store accepts first wins, and every
//! other path loops back to a fresh probe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::infrastructure::{LockStore, WriteOutcome};
use crate::infrastructure_in_memory::InMemoryLockStore;
use crate::policy::LockPolicy;
use crate::types::{LockError, LockHandle, LockRecord, LockRecordView, PolicyError, StoreError};
use crate::worker::RenewalWorker;

/// Options for a single `acquire` call.
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Make exactly one attempt and fail immediately on contention
    pub no_wait: bool,
    /// Lease length for this lock, overriding the policy default
    pub duration: Option<Duration>,
    /// Opaque metadata carried with the lock record
    pub payload: Option<Vec<u8>>,
}

/// Options for a single `release` call.
#[derive(Debug, Clone, Default)]
pub struct ReleaseOptions {
    /// Delete the record instead of marking it unlocked; defaults to the
    /// policy's `delete_on_release`
    pub delete: Option<bool>,
}

/// State shared between the foreground client surface and the renewal
/// worker thread. The handle table is the watch set: whatever is in it,
/// the worker keeps alive.
pub(crate) struct ClientCore {
    pub(crate) store: Arc<dyn LockStore>,
    pub(crate) policy: LockPolicy,
    pub(crate) owner: String,
    held: Mutex<HashMap<String, LockHandle>>,
}

impl ClientCore {
    /// The table guard is held across the store write in `touch_by_name`
    /// and `release_by_name`. That serializes renewal against release, which
    /// is what keeps a handle from ever being renewed after its release.
    fn held(&self) -> MutexGuard<'_, HashMap<String, LockHandle>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn watch_set(&self) -> Vec<String> {
        self.held().keys().cloned().collect()
    }

    fn fresh_record(&self, name: &str, duration_ms: u64, payload: Option<Vec<u8>>) -> LockRecord {
        LockRecord {
            name: name.to_string(),
            owner: self.owner.clone(),
            version: self.policy.new_version_id(),
            is_locked: true,
            duration_ms,
            acquired_at_ms: self.policy.now_ms(),
            payload,
        }
    }

    /// Register a freshly written record in the watch set and hand back a
    /// snapshot for the caller.
    fn admit(&self, record: LockRecord) -> LockHandle {
        let handle = LockHandle::from_record(record, self.policy.now_ms());
        debug!(name = %handle.name, version = %handle.version, "lock acquired");
        self.held().insert(handle.name.clone(), handle.clone());
        handle
    }

    /// Renew the lease on a held lock by bumping its version.
    ///
    /// `Ok(false)` means the lock is no longer renewable: locally expired,
    /// already released, or taken by another party (in which case the
    /// handle leaves the watch set). A transport-level store failure keeps
    /// the handle so the next cycle can retry.
    pub(crate) fn touch_by_name(&self, name: &str) -> Result<bool, LockError> {
        let mut held = self.held();
        let Some(current) = held.get(name).cloned() else {
            return Ok(false);
        };

        let now = self.policy.now_ms();
        if current.is_expired(now) {
            warn!(name, "lease expired locally before renewal, dropping handle");
            held.remove(name);
            return Ok(false);
        }

        let record = LockRecord {
            name: current.name.clone(),
            owner: current.owner.clone(),
            version: self.policy.new_version_id(),
            is_locked: true,
            duration_ms: current.duration_ms,
            acquired_at_ms: now,
            payload: current.payload.clone(),
        };

        match self.store.compare_and_swap(name, &current.version, &record) {
            Ok(WriteOutcome::Applied) => {
                if let Some(handle) = held.get_mut(name) {
                    handle.version = record.version;
                    handle.acquired_at_ms = now;
                    handle.last_renewed_at_ms = now;
                }
                debug!(name, "lease renewed");
                Ok(true)
            }
            Ok(WriteOutcome::Rejected) => {
                warn!(name, "lock version changed underneath us, lease lost");
                held.remove(name);
                Ok(false)
            }
            Err(err) => {
                warn!(name, error = %err, "renewal write failed, keeping handle");
                Err(LockError::Store(err))
            }
        }
    }

    /// Remove the handle from the watch set, then write the release to the
    /// store. The removal happens first and is unconditional: even when the
    /// store write fails, the local handle is discarded and the failure is
    /// reported to the caller.
    pub(crate) fn release_by_name(&self, name: &str, delete: bool) -> Result<bool, LockError> {
        let mut held = self.held();
        let Some(handle) = held.remove(name) else {
            return Ok(false);
        };

        let outcome = if delete {
            self.store.delete(name, &handle.version, &handle.owner)
        } else {
            let record = LockRecord {
                name: handle.name.clone(),
                owner: handle.owner.clone(),
                version: self.policy.new_version_id(),
                is_locked: false,
                duration_ms: handle.duration_ms,
                acquired_at_ms: self.policy.now_ms(),
                payload: handle.payload,
            };
            self.store.compare_and_swap(name, &handle.version, &record)
        };

        match outcome {
            Ok(WriteOutcome::Applied) => {
                debug!(name, delete, "lock released");
                Ok(true)
            }
            Ok(WriteOutcome::Rejected) => {
                debug!(name, "release found the lock already taken or gone");
                Ok(false)
            }
            Err(err) => Err(LockError::Store(err)),
        }
    }
}

/// A distributed lease-lock client.
///
/// One owner id per instance; every lock this client acquires is held in
/// its name. Call [`startup`](LockClient::startup) to keep long-held locks
/// renewed in the background, and [`shutdown`](LockClient::shutdown) to
/// stop the worker and (per policy) release whatever is still held.
pub struct LockClient {
    core: Arc<ClientCore>,
    worker: Mutex<Option<RenewalWorker>>,
}

impl LockClient {
    pub fn new(store: Arc<dyn LockStore>, policy: LockPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        let owner = policy.new_owner_id();
        Ok(Self {
            core: Arc::new(ClientCore {
                store,
                policy,
                owner,
                held: Mutex::new(HashMap::new()),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Client over a private in-memory store. Mostly useful for tests and
    /// single-process coordination.
    pub fn in_memory(policy: LockPolicy) -> Result<Self, PolicyError> {
        Self::new(Arc::new(InMemoryLockStore::new()), policy)
    }

    /// The owner id all locks from this client are held under.
    pub fn owner(&self) -> &str {
        &self.core.owner
    }

    /// Names currently in the watch set.
    pub fn held_locks(&self) -> Vec<String> {
        self.core.watch_set()
    }

    /// Start the background renewal worker. Idempotent.
    pub fn startup(&self) {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(RenewalWorker::start(Arc::clone(&self.core)));
        }
    }

    /// Stop the renewal worker, waiting up to `join_timeout` for an
    /// in-flight cycle to finish, then best-effort release every remaining
    /// handle when the policy asks for it.
    pub fn shutdown(&self, join_timeout: Option<Duration>) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.stop(join_timeout);
        }
        if self.core.policy.release_on_shutdown && !self.release_all() {
            warn!(owner = %self.core.owner, "not all locks were released during shutdown");
        }
    }

    /// Acquire the named lock with the policy defaults, blocking up to
    /// `acquire_timeout` on contention.
    pub fn acquire(&self, name: &str) -> Result<LockHandle, LockError> {
        self.acquire_with(name, AcquireOptions::default())
    }

    /// Single-attempt acquire: fail fast instead of waiting.
    pub fn try_acquire(&self, name: &str) -> Result<LockHandle, LockError> {
        self.acquire_with(
            name,
            AcquireOptions {
                no_wait: true,
                ..AcquireOptions::default()
            },
        )
    }

    /// Acquire the named lock.
    ///
    /// Loops probe/act against the store until the store accepts a write,
    /// the timeout elapses, or (`no_wait`) the first attempt fails. An
    /// absent record is created; an unlocked or abandoned record is seized
    /// with a compare-and-swap carrying the observed version; a live lock
    /// is watched and re-probed every `retry_period`. Transient store
    /// failures are retried on the same cadence until the deadline.
    pub fn acquire_with(
        &self,
        name: &str,
        opts: AcquireOptions,
    ) -> Result<LockHandle, LockError> {
        if name.is_empty() {
            return Err(LockError::InvalidName {
                name: name.to_string(),
            });
        }

        let core = &self.core;
        let policy = &core.policy;
        let duration_ms = opts
            .duration
            .unwrap_or(policy.lock_duration)
            .as_millis() as u64;
        let deadline = policy
            .now_ms()
            .saturating_add(policy.acquire_timeout.as_millis() as u64);
        // Version remembered from the last probe of a live lock. Seizing an
        // abandoned lock requires the version not to have moved since we
        // first saw it; a record already expired on first sight is fair
        // game, the compare-and-swap still carries the observed version.
        let mut watched_version: Option<String> = None;
        let mut last_store_error: Option<StoreError> = None;

        loop {
            let mut contended = false;

            match core.store.read(name) {
                Ok(None) => {
                    let record = core.fresh_record(name, duration_ms, opts.payload.clone());
                    match core.store.create(&record) {
                        Ok(WriteOutcome::Applied) => return Ok(core.admit(record)),
                        Ok(WriteOutcome::Rejected) => {
                            // Another live contender just acted; re-probe
                            // without sleeping.
                            debug!(name, "lost the create race");
                        }
                        Err(err) => {
                            warn!(name, error = %err, "create attempt failed, retrying");
                            last_store_error = Some(err);
                            contended = true;
                        }
                    }
                }
                Ok(Some(current)) => {
                    let now = policy.now_ms();
                    let observed_before =
                        watched_version.as_deref() == Some(current.version.as_str());
                    let seizable = !current.is_locked
                        || (current.is_expired(now)
                            && (watched_version.is_none() || observed_before));

                    if seizable {
                        let record = core.fresh_record(name, duration_ms, opts.payload.clone());
                        match core.store.compare_and_swap(name, &current.version, &record) {
                            Ok(WriteOutcome::Applied) => return Ok(core.admit(record)),
                            Ok(WriteOutcome::Rejected) => {
                                debug!(name, "seize raced with another writer");
                                watched_version = None;
                            }
                            Err(err) => {
                                warn!(name, error = %err, "seize attempt failed, retrying");
                                last_store_error = Some(err);
                                contended = true;
                            }
                        }
                    } else {
                        if !observed_before {
                            // A different version than last time means a
                            // different observation; never assume the same
                            // holder, or a renew-at-the-last-moment holder
                            // could make us wait forever.
                            watched_version = Some(current.version.clone());
                        }
                        contended = true;
                    }
                }
                Err(err) => {
                    warn!(name, error = %err, "probe failed, retrying");
                    last_store_error = Some(err);
                    contended = true;
                }
            }

            if opts.no_wait {
                return Err(LockError::NotGranted {
                    name: name.to_string(),
                    source: last_store_error,
                });
            }
            if policy.now_ms() >= deadline {
                return Err(LockError::NotGranted {
                    name: name.to_string(),
                    source: last_store_error,
                });
            }
            if contended {
                thread::sleep(policy.retry_period);
            }
        }
    }

    /// Renew the lease on a held lock. `Ok(true)` on success; `Ok(false)`
    /// when the lock is no longer held by this client (the handle leaves
    /// the watch set). Touching another owner's handle is refused.
    pub fn touch(&self, handle: &LockHandle) -> Result<bool, LockError> {
        if handle.owner != self.core.owner {
            return Err(LockError::NotOwner {
                name: handle.name.clone(),
            });
        }
        self.core.touch_by_name(&handle.name)
    }

    /// Release a held lock with the policy default delete behavior.
    pub fn release(&self, handle: &LockHandle) -> Result<bool, LockError> {
        self.release_with(handle, ReleaseOptions::default())
    }

    /// Release a held lock. `Ok(true)` when the store accepted the release;
    /// `Ok(false)` when there was nothing to release (already released, or
    /// the store rejected the conditional write). Either way the handle is
    /// gone from the watch set afterwards.
    pub fn release_with(
        &self,
        handle: &LockHandle,
        opts: ReleaseOptions,
    ) -> Result<bool, LockError> {
        if handle.owner != self.core.owner {
            return Err(LockError::NotOwner {
                name: handle.name.clone(),
            });
        }
        let delete = opts.delete.unwrap_or(self.core.policy.delete_on_release);
        self.core.release_by_name(&handle.name, delete)
    }

    /// Release every lock this client currently holds. Returns true only
    /// when every release was accepted.
    pub fn release_all(&self) -> bool {
        let delete = self.core.policy.delete_on_release;
        let mut all_released = true;
        for name in self.core.watch_set() {
            match self.core.release_by_name(&name, delete) {
                Ok(released) => all_released &= released,
                Err(err) => {
                    warn!(name = %name, error = %err, "release failed");
                    all_released = false;
                }
            }
        }
        all_released
    }

    /// Read-only peek at a lock. Takes nothing, mutates nothing, and strips
    /// the version so the result cannot feed a conditional write. Records
    /// left behind in an unlocked state read as absent.
    pub fn retrieve(&self, name: &str) -> Result<Option<LockRecordView>, LockError> {
        if name.is_empty() {
            return Err(LockError::InvalidName {
                name: name.to_string(),
            });
        }
        if let Some(handle) = self.core.held().get(name) {
            return Ok(Some(handle.view()));
        }
        match self.core.store.read(name)? {
            Some(record) if record.is_locked => Ok(Some(record.into_view())),
            _ => Ok(None),
        }
    }

    /// Whether a handle still protects anything: held by this client, still
    /// in the watch set, and not past its lease locally. Lease loss is
    /// asynchronous to callers, so check this before trusting protected
    /// state after a long gap.
    pub fn is_lock_alive(&self, handle: &LockHandle) -> bool {
        if handle.owner != self.core.owner {
            return false;
        }
        match self.core.held().get(&handle.name) {
            Some(current) => !current.is_expired(self.core.policy.now_ms()),
            None => false,
        }
    }

    /// Acquire the named lock and release it when the guard drops.
    pub fn guard(&self, name: &str) -> Result<LockGuard<'_>, LockError> {
        let handle = self.acquire(name)?;
        Ok(LockGuard {
            client: self,
            handle,
        })
    }
}

/// RAII wrapper over a held lock: releases on drop. Release failures on
/// the drop path are logged, not surfaced; release explicitly through the
/// client when the outcome matters.
pub struct LockGuard<'a> {
    client: &'a LockClient,
    handle: LockHandle,
}

impl LockGuard<'_> {
    pub fn handle(&self) -> &LockHandle {
        &self.handle
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.client.release(&self.handle) {
            warn!(name = %self.handle.name, error = %err, "release on drop failed");
        }
    }
}
