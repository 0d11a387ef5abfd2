//! # leaselock
//!
//! Distributed mutual exclusion over a single strongly consistent,
//! conditional-write key-value store. The client implements lease-based
//! ownership, optimistic concurrency via version tokens, seizure of
//! abandoned locks, and background lease renewal; the store supplies the
//! atomicity that makes it correct.

pub mod client;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod policy;
pub mod types;
mod worker;

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
