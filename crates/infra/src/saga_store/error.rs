use thiserror::Error;

use sagastore_core::{CoreError, CorrelationKey, SagaId};

use crate::backing_store::BackingStoreError;
use crate::codec::CodecError;

pub type SagaStoreResult<T> = Result<T, SagaStoreError>;

/// Saga store operation error.
///
/// Every variant aborts the transaction of the failing operation; nothing it wrote
/// becomes visible. The store never retries: only the caller knows whether
/// re-reading and recomputing the saga state is safe.
///
/// ## Error Categories
///
/// - **DuplicateSaga**: another saga already owns the correlation key
/// - **ConcurrencyConflict**: the stored state changed since this unit of work read it (retryable)
/// - **SagaNotFound**: no index entry for the saga id
/// - **MissingReadBeforeWrite**: update/complete without a prior read in the same unit of work
/// - **IndexCorruption**: index and primary dictionary disagree (never repaired automatically)
/// - **Serialization / Deserialization**: the codec rejected the record or the stored bytes
#[derive(Debug, Error)]
pub enum SagaStoreError {
    #[error("a saga is already stored under correlation key '{key}'")]
    DuplicateSaga { key: CorrelationKey },

    #[error("saga {id} was modified after it was last read")]
    ConcurrencyConflict { id: SagaId },

    #[error("saga {id} not found")]
    SagaNotFound { id: SagaId },

    #[error("saga {id} must be read in this unit of work before it is written")]
    MissingReadBeforeWrite { id: SagaId },

    #[error("secondary index and primary dictionary disagree for saga {id} (key '{key}')")]
    IndexCorruption { id: SagaId, key: CorrelationKey },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("backing store failure: {0}")]
    Backing(#[from] BackingStoreError),
}

impl SagaStoreError {
    /// True for failures the caller may resolve by re-reading and trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Report a backing-store write conflict as a saga concurrency conflict.
    pub(crate) fn conflict_for(self, id: SagaId) -> Self {
        match self {
            Self::Backing(BackingStoreError::WriteConflict(_)) => Self::ConcurrencyConflict { id },
            other => other,
        }
    }

    /// Report a backing-store write conflict on insert as a duplicate saga.
    pub(crate) fn duplicate_for(self, key: &CorrelationKey) -> Self {
        match self {
            Self::Backing(BackingStoreError::WriteConflict(_)) => Self::DuplicateSaga { key: key.clone() },
            other => other,
        }
    }
}

impl From<CodecError> for SagaStoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Serialization(msg) => Self::Serialization(msg),
            CodecError::Deserialization(msg) => Self::Deserialization(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        let id = SagaId::new();
        assert!(SagaStoreError::ConcurrencyConflict { id }.is_retryable());
        assert!(!SagaStoreError::SagaNotFound { id }.is_retryable());
        assert!(!SagaStoreError::MissingReadBeforeWrite { id }.is_retryable());
    }

    #[test]
    fn write_conflicts_become_saga_conflicts() {
        let id = SagaId::new();
        let err = SagaStoreError::from(BackingStoreError::WriteConflict("sagas/k".into())).conflict_for(id);
        assert!(matches!(err, SagaStoreError::ConcurrencyConflict { id: got } if got == id));

        let err = SagaStoreError::from(BackingStoreError::Storage("down".into())).conflict_for(id);
        assert!(matches!(err, SagaStoreError::Backing(BackingStoreError::Storage(_))));
    }

    #[test]
    fn write_conflicts_on_insert_become_duplicates() {
        let key = sagastore_core::build_key("OrderId", "o-17").unwrap();

        let err = SagaStoreError::from(BackingStoreError::WriteConflict("sagas/OrderId_o-17".into()))
            .duplicate_for(&key);
        assert!(matches!(&err, SagaStoreError::DuplicateSaga { key: got } if *got == key));
        assert!(!err.is_retryable());

        let err = SagaStoreError::from(BackingStoreError::UnknownDictionary("sagas".into())).duplicate_for(&key);
        assert!(matches!(err, SagaStoreError::Backing(BackingStoreError::UnknownDictionary(_))));
    }

    #[test]
    fn codec_errors_keep_their_direction() {
        let err: SagaStoreError = CodecError::Deserialization("bad".into()).into();
        assert!(matches!(err, SagaStoreError::Deserialization(_)));
    }
}
