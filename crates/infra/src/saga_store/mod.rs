//! Saga persistence: dual-key storage with optimistic concurrency.
//!
//! Two dictionaries live in the backing store:
//!
//! - `"sagas"`: correlation key -> encoded saga state (primary)
//! - `"sagas-index"`: saga id -> correlation key (secondary index)
//!
//! Both entries of a saga are created in one transaction and removed in one
//! transaction. Writes after creation are compare-and-swap against the bytes the
//! caller's [`VersionTracker`] recorded when it last read the saga, so a writer
//! working from a stale read fails instead of overwriting a newer state.

mod error;

pub use error::{SagaStoreError, SagaStoreResult};

use core::fmt;

use tracing::{debug, error, instrument, warn};

use sagastore_core::{CorrelationKey, CorrelationProperty, SagaData, SagaDefinition, SagaId, build_key};

use crate::backing_store::{BackingStore, Dictionary, StoreTransaction};
use crate::codec::{JsonCodec, SagaCodec};
use crate::version_tracker::VersionTracker;

/// Name of the primary dictionary (correlation key -> saga state).
pub const SAGAS_DICTIONARY: &str = "sagas";

/// Name of the secondary index (saga id -> correlation key).
pub const SAGAS_INDEX_DICTIONARY: &str = "sagas-index";

/// Transactional saga store over a [`BackingStore`].
///
/// Each operation opens exactly one transaction and commits it only on success.
/// Failed operations abandon their transaction, so partial writes never reach the
/// backing store. No in-process locks are taken; ordering between concurrent
/// callers comes from the backing store's isolation plus the byte comparisons
/// against the caller's [`VersionTracker`].
#[derive(Debug)]
pub struct SagaStore<B, C = JsonCodec> {
    backing: B,
    codec: C,
    sagas: Dictionary,
    index: Dictionary,
}

impl<B: BackingStore> SagaStore<B, JsonCodec> {
    /// Open the store with the JSON codec, creating both dictionaries if needed.
    pub async fn open(backing: B) -> SagaStoreResult<Self> {
        Self::with_codec(backing, JsonCodec).await
    }
}

impl<B, C> SagaStore<B, C>
where
    B: BackingStore,
    C: SagaCodec,
{
    /// Open the store with a custom codec, creating both dictionaries if needed.
    pub async fn with_codec(backing: B, codec: C) -> SagaStoreResult<Self> {
        let sagas = backing.get_or_create_dictionary(SAGAS_DICTIONARY).await?;
        let index = backing.get_or_create_dictionary(SAGAS_INDEX_DICTIONARY).await?;

        Ok(Self {
            backing,
            codec,
            sagas,
            index,
        })
    }

    pub fn backing(&self) -> &B {
        &self.backing
    }

    pub fn sagas_dictionary(&self) -> &Dictionary {
        &self.sagas
    }

    pub fn index_dictionary(&self) -> &Dictionary {
        &self.index
    }

    /// Persist a new saga under its correlation property.
    ///
    /// Fails with [`SagaStoreError::DuplicateSaga`] if another saga already owns the
    /// correlation key.
    #[instrument(
        skip(self, record, correlation_property),
        fields(saga_id = %record.id(), correlation_key = %correlation_property.key()),
        err
    )]
    pub async fn save<T: SagaData>(
        &self,
        record: &T,
        correlation_property: &CorrelationProperty,
    ) -> SagaStoreResult<()> {
        let key = correlation_property.key();
        self.save_inner(record, &key)
            .await
            .map_err(|e| e.duplicate_for(&key))
    }

    async fn save_inner<T: SagaData>(&self, record: &T, key: &CorrelationKey) -> SagaStoreResult<()> {
        let id = record.id();
        let data = self.codec.encode(record)?;

        let mut tx = self.backing.begin_transaction().await?;

        if !tx.try_add(&self.sagas, key.as_str(), &data).await? {
            warn!("correlation key already taken");
            return Err(abandon(tx, SagaStoreError::DuplicateSaga { key: key.clone() }).await);
        }

        if !tx
            .try_add(&self.index, &id.index_key(), key.as_str().as_bytes())
            .await?
        {
            error!("saga id already present in secondary index");
            return Err(abandon(
                tx,
                SagaStoreError::IndexCorruption {
                    id,
                    key: key.clone(),
                },
            )
            .await);
        }

        tx.commit().await?;
        debug!(bytes = data.len(), "saga saved");
        Ok(())
    }

    /// Replace the state of an existing saga.
    ///
    /// The saga must have been read through `tracker` first; the write only succeeds
    /// if the stored bytes still equal that read. The tracker is left untouched, so a
    /// second update from the same read conflicts with the first.
    #[instrument(skip(self, tracker, record), fields(saga_id = %record.id()), err)]
    pub async fn update<T: SagaData>(&self, tracker: &VersionTracker, record: &T) -> SagaStoreResult<()> {
        let id = record.id();
        self.update_inner(tracker, record, id)
            .await
            .map_err(|e| e.conflict_for(id))
    }

    async fn update_inner<T: SagaData>(
        &self,
        tracker: &VersionTracker,
        record: &T,
        id: SagaId,
    ) -> SagaStoreResult<()> {
        let mut tx = self.backing.begin_transaction().await?;

        let Some(key) = self.resolve(&mut tx, id).await? else {
            return Err(abandon(tx, SagaStoreError::SagaNotFound { id }).await);
        };

        let Some(expected) = tracker.lookup(&id) else {
            return Err(abandon(tx, SagaStoreError::MissingReadBeforeWrite { id }).await);
        };

        let data = self.codec.encode(record)?;

        if !tx.try_update(&self.sagas, key.as_str(), &data, expected).await? {
            warn!(correlation_key = %key, "stored saga differs from last read");
            return Err(abandon(tx, SagaStoreError::ConcurrencyConflict { id }).await);
        }

        tx.commit().await?;
        debug!(correlation_key = %key, bytes = data.len(), "saga updated");
        Ok(())
    }

    /// Load a saga by id and record the bytes read in `tracker`.
    ///
    /// Returns `Ok(None)` if no saga has this id.
    #[instrument(skip(self, tracker), err)]
    pub async fn get_by_id<T: SagaData>(
        &self,
        tracker: &mut VersionTracker,
        id: SagaId,
    ) -> SagaStoreResult<Option<T>> {
        self.get_by_id_inner(tracker, id)
            .await
            .map_err(|e| e.conflict_for(id))
    }

    async fn get_by_id_inner<T: SagaData>(
        &self,
        tracker: &mut VersionTracker,
        id: SagaId,
    ) -> SagaStoreResult<Option<T>> {
        let mut tx = self.backing.begin_transaction().await?;

        let Some(key) = self.resolve(&mut tx, id).await? else {
            tx.commit().await?;
            return Ok(None);
        };

        let Some(bytes) = tx.try_get(&self.sagas, key.as_str()).await? else {
            error!(correlation_key = %key, "index entry points at a missing saga");
            return Err(abandon(tx, SagaStoreError::IndexCorruption { id, key }).await);
        };

        let record: T = self.codec.decode(&bytes)?;
        if record.id() != id {
            error!(correlation_key = %key, stored_id = %record.id(), "index entry points at another saga");
            return Err(abandon(tx, SagaStoreError::IndexCorruption { id, key }).await);
        }

        tx.commit().await?;
        tracker.record(id, bytes);
        Ok(Some(record))
    }

    /// Load a saga by correlation property and record the bytes read in `tracker`.
    ///
    /// Returns `Ok(None)` if no saga is stored under the correlation key.
    #[instrument(skip(self, tracker, value), fields(correlation_value = %value), err)]
    pub async fn get_by_correlation<T: SagaData>(
        &self,
        tracker: &mut VersionTracker,
        name: &str,
        value: impl fmt::Display + Send,
    ) -> SagaStoreResult<Option<T>> {
        let key = build_key(name, &value)?;

        let mut tx = self.backing.begin_transaction().await?;

        let Some(bytes) = tx.try_get(&self.sagas, key.as_str()).await? else {
            tx.commit().await?;
            return Ok(None);
        };

        let record: T = self.codec.decode(&bytes)?;
        let id = record.id();

        tx.commit().await.map_err(|e| SagaStoreError::from(e).conflict_for(id))?;
        tracker.record(id, bytes);
        Ok(Some(record))
    }

    /// Delete a saga once its workflow has finished.
    ///
    /// Both entries are removed in one transaction. If the removed state differs from
    /// what `tracker` last read, the removal is rolled back and the call fails with
    /// [`SagaStoreError::ConcurrencyConflict`].
    #[instrument(skip(self, tracker, record), fields(saga_id = %record.id()), err)]
    pub async fn complete<T: SagaData>(&self, tracker: &mut VersionTracker, record: &T) -> SagaStoreResult<()> {
        let id = record.id();
        self.complete_inner(tracker, id)
            .await
            .map_err(|e| e.conflict_for(id))?;
        tracker.forget(&id);
        Ok(())
    }

    async fn complete_inner(&self, tracker: &VersionTracker, id: SagaId) -> SagaStoreResult<()> {
        let mut tx = self.backing.begin_transaction().await?;

        let Some(key) = self.resolve(&mut tx, id).await? else {
            return Err(abandon(tx, SagaStoreError::SagaNotFound { id }).await);
        };

        if tx.try_remove(&self.index, &id.index_key()).await?.is_none() {
            error!(correlation_key = %key, "index entry vanished while completing");
            return Err(abandon(tx, SagaStoreError::IndexCorruption { id, key }).await);
        }

        let Some(removed) = tx.try_remove(&self.sagas, key.as_str()).await? else {
            error!(correlation_key = %key, "index entry points at a missing saga");
            return Err(abandon(tx, SagaStoreError::SagaNotFound { id }).await);
        };

        let Some(expected) = tracker.lookup(&id) else {
            return Err(abandon(tx, SagaStoreError::MissingReadBeforeWrite { id }).await);
        };

        if removed.as_slice() != expected {
            warn!(correlation_key = %key, "stored saga differs from last read; rolling back removal");
            return Err(abandon(tx, SagaStoreError::ConcurrencyConflict { id }).await);
        }

        tx.commit().await?;
        debug!(correlation_key = %key, "saga completed");
        Ok(())
    }

    /// Persist a new saga under the correlation property its definition declares.
    pub async fn save_saga<S: SagaDefinition>(&self, record: &S::Data) -> SagaStoreResult<()> {
        let property = S::correlation_property(record)?;
        debug!(saga_type = S::saga_type(), "saving saga");
        self.save(record, &property).await
    }

    /// Find a saga by the value of its definition's correlation property.
    pub async fn find_saga<S: SagaDefinition>(
        &self,
        tracker: &mut VersionTracker,
        correlation_value: impl fmt::Display + Send,
    ) -> SagaStoreResult<Option<S::Data>> {
        self.get_by_correlation(tracker, S::correlation_property_name(), correlation_value)
            .await
    }

    /// Resolve a saga id to its correlation key through the secondary index.
    async fn resolve(&self, tx: &mut B::Transaction, id: SagaId) -> SagaStoreResult<Option<CorrelationKey>> {
        let Some(raw) = tx.try_get(&self.index, &id.index_key()).await? else {
            return Ok(None);
        };

        match String::from_utf8(raw) {
            Ok(key) => Ok(Some(CorrelationKey::from_stored(key))),
            Err(e) => {
                let key = CorrelationKey::from_stored(String::from_utf8_lossy(e.as_bytes()));
                error!(correlation_key = %key, "secondary index holds a non-UTF-8 key");
                Err(SagaStoreError::IndexCorruption { id, key })
            }
        }
    }
}

/// Roll back `tx` and hand back the error that caused it.
///
/// Dropping the transaction would discard its writes as well; rolling back
/// explicitly lets the backend release resources before the error propagates.
async fn abandon<Tx: StoreTransaction>(tx: Tx, err: SagaStoreError) -> SagaStoreError {
    if let Err(rollback_err) = tx.rollback().await {
        warn!(error = %rollback_err, "rollback failed");
    }
    err
}
