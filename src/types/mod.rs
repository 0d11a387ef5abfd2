pub mod error;
pub mod record;

pub use error::{LockError, PolicyError, StoreError};
pub use record::{LockHandle, LockRecord, LockRecordView};
