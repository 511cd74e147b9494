mod backing_store;
mod in_memory;

pub mod common;
pub mod errors;

pub use backing_store::{BackingStore, BackingStoreSession, BackingStoreTransaction, TransactionOutcome};
pub use in_memory::InMemoryBackingStore;
