//! Background lease renewal.
//!
//! One thread per client. Every `renew_period` it touches each lock in the
//! client's watch set so long-running holders never lose their lease to
//! expiry. Touch failures never propagate to the foreground: a lost lock
//! is logged and leaves the watch set, a transient store failure is logged
//! and retried next cycle.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::client::ClientCore;

struct WorkerState {
    stop: bool,
    finished: bool,
}

struct WorkerShared {
    state: Mutex<WorkerState>,
    signal: Condvar,
}

impl WorkerShared {
    fn state(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the renewal thread. Stopping is safe from any thread and
/// interrupts the sleep between cycles immediately; it never waits on an
/// in-flight touch longer than the caller allows.
pub(crate) struct RenewalWorker {
    shared: Arc<WorkerShared>,
    thread: Option<JoinHandle<()>>,
}

impl RenewalWorker {
    pub(crate) fn start(core: Arc<ClientCore>) -> Self {
        let shared = Arc::new(WorkerShared {
            state: Mutex::new(WorkerState {
                stop: false,
                finished: false,
            }),
            signal: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let thread = thread::spawn(move || Self::run(core, thread_shared));
        Self {
            shared,
            thread: Some(thread),
        }
    }

    fn run(core: Arc<ClientCore>, shared: Arc<WorkerShared>) {
        let period = core.policy.renew_period;
        debug!(owner = %core.owner, ?period, "renewal worker started");

        loop {
            let cycle_start = Instant::now();
            for name in core.watch_set() {
                match core.touch_by_name(&name) {
                    Ok(true) => {}
                    Ok(false) => warn!(name = %name, "lease lost, dropped from watch set"),
                    Err(err) => warn!(name = %name, error = %err, "renewal failed, will retry"),
                }
            }

            // Compensate for the time the touches took; an overlong cycle
            // rolls straight into the next one without a catch-up burst.
            let idle = period.saturating_sub(cycle_start.elapsed());
            let mut state = shared.state();
            if state.stop {
                break;
            }
            if !idle.is_zero() {
                let (next, _timed_out) = shared
                    .signal
                    .wait_timeout_while(state, idle, |s| !s.stop)
                    .unwrap_or_else(PoisonError::into_inner);
                state = next;
                if state.stop {
                    break;
                }
            }
        }

        let mut state = shared.state();
        state.finished = true;
        drop(state);
        shared.signal.notify_all();
        debug!("renewal worker stopped");
    }

    /// Signal the thread to stop and wait for it to wind down. With a
    /// timeout, an overrunning final cycle is detached rather than joined.
    pub(crate) fn stop(mut self, join_timeout: Option<Duration>) {
        {
            let mut state = self.shared.state();
            state.stop = true;
        }
        self.shared.signal.notify_all();

        match join_timeout {
            None => {
                if let Some(thread) = self.thread.take() {
                    let _ = thread.join();
                }
            }
            Some(limit) => {
                let state = self.shared.state();
                let (state, _timed_out) = self
                    .shared
                    .signal
                    .wait_timeout_while(state, limit, |s| !s.finished)
                    .unwrap_or_else(PoisonError::into_inner);
                if state.finished {
                    drop(state);
                    if let Some(thread) = self.thread.take() {
                        let _ = thread.join();
                    }
                } else {
                    warn!("renewal worker did not stop in time, detaching");
                    self.thread.take();
                }
            }
        }
    }
}
