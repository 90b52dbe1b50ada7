//! Transactional dictionary store boundary.
//!
//! The saga store persists through this abstraction without making any storage
//! assumptions: named dictionaries of byte values, mutated inside transactions
//! with compare-and-swap updates and an explicit commit.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryBackingStore, InMemoryTransaction};
pub use postgres::{PostgresBackingStore, PostgresTransaction};
pub use r#trait::{BackingStore, BackingStoreError, Dictionary, StoreTransaction};
