mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStore};
pub use record::{AttemptRecord, AuditRecord, ClaimRecord, ServerRecord, UserRecord};
pub use traits::ClaimStore;
