//! Infrastructure layer: backing stores, codec, saga store, config.

pub mod backing_store;
pub mod codec;
pub mod config;
pub mod saga_store;
pub mod version_tracker;

#[cfg(test)]
mod test_support;

pub use backing_store::{
    BackingStore, BackingStoreError, Dictionary, InMemoryBackingStore, PostgresBackingStore, StoreTransaction,
};
pub use codec::{CodecError, JsonCodec, SagaCodec};
pub use config::{BackendKind, ConfigError, StoreConfig};
pub use saga_store::{SAGAS_DICTIONARY, SAGAS_INDEX_DICTIONARY, SagaStore, SagaStoreError, SagaStoreResult};
pub use version_tracker::VersionTracker;
