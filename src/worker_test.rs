#[cfg(test)]
mod tests {
    use crate::client::LockClient;
    use crate::infrastructure::{LockStore, WriteOutcome};
    use crate::infrastructure_in_memory::InMemoryLockStore;
    use crate::policy::LockPolicy;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn worker_policy(duration: Duration, renew: Duration) -> LockPolicy {
        LockPolicy {
            lock_duration: duration,
            renew_period: renew,
            acquire_timeout: Duration::from_secs(1),
            retry_period: Duration::from_millis(10),
            ..LockPolicy::default()
        }
    }

    #[test]
    fn test_worker_keeps_short_lease_alive() {
        let store = Arc::new(InMemoryLockStore::new());
        let policy = worker_policy(Duration::from_millis(300), Duration::from_millis(100));
        let client = LockClient::new(store.clone(), policy).unwrap();

        let handle = client.acquire("long-job").unwrap();
        let initial_version = store.read("long-job").unwrap().unwrap().version;
        client.startup();

        // Without renewal the 300ms lease would lapse within this window
        thread::sleep(Duration::from_millis(450));

        assert!(client.is_lock_alive(&handle));
        let renewed = store.read("long-job").unwrap().unwrap();
        assert!(renewed.is_locked);
        assert_ne!(renewed.version, initial_version);

        client.shutdown(None);
        // Default policy releases (and deletes) held locks on shutdown
        assert!(store.read("long-job").unwrap().is_none());
        assert!(client.held_locks().is_empty());
    }

    #[test]
    fn test_worker_drops_lock_lost_to_another_writer() {
        let store = Arc::new(InMemoryLockStore::new());
        let policy = worker_policy(Duration::from_millis(500), Duration::from_millis(50));
        let client = LockClient::new(store.clone(), policy).unwrap();

        let handle = client.acquire("contested").unwrap();

        // Another party swaps the record out from under the client
        let current = store.read("contested").unwrap().unwrap();
        let mut stolen = current.clone();
        stolen.owner = "thief".to_string();
        stolen.version = "stolen-version".to_string();
        assert_eq!(
            store
                .compare_and_swap("contested", &current.version, &stolen)
                .unwrap(),
            WriteOutcome::Applied
        );

        // The first renewal cycle notices the version mismatch and drops it
        client.startup();
        thread::sleep(Duration::from_millis(200));
        assert!(client.held_locks().is_empty());
        assert!(!client.is_lock_alive(&handle));
        assert_eq!(client.touch(&handle).unwrap(), false);

        // The thief's record is untouched
        let stored = store.read("contested").unwrap().unwrap();
        assert_eq!(stored.owner, "thief");

        client.shutdown(None);
    }

    #[test]
    fn test_shutdown_can_leave_locks_to_expire() {
        let store = Arc::new(InMemoryLockStore::new());
        let policy = LockPolicy {
            release_on_shutdown: false,
            ..worker_policy(Duration::from_millis(500), Duration::from_millis(100))
        };
        let client = LockClient::new(store.clone(), policy).unwrap();

        client.acquire("leftover").unwrap();
        client.startup();
        client.shutdown(None);

        let stored = store.read("leftover").unwrap().unwrap();
        assert!(stored.is_locked);
    }

    #[test]
    fn test_shutdown_interrupts_the_renewal_sleep() {
        let policy = worker_policy(Duration::from_secs(60), Duration::from_secs(10));
        let client = LockClient::in_memory(policy).unwrap();
        client.startup();

        // Mid-sleep shutdown must return promptly, not after renew_period
        let started = Instant::now();
        client.shutdown(Some(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_startup_is_idempotent() {
        let policy = worker_policy(Duration::from_millis(500), Duration::from_millis(100));
        let client = LockClient::in_memory(policy).unwrap();
        client.startup();
        client.startup();
        client.shutdown(None);
    }
}
