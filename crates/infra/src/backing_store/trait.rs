use async_trait::async_trait;
use thiserror::Error;

/// Handle to a named dictionary inside a backing store.
///
/// Obtained from [`BackingStore::get_or_create_dictionary`]; every transactional
/// operation names the dictionary it touches through this handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dictionary {
    name: String,
}

impl Dictionary {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Backing store operation error.
///
/// These are **infrastructure errors** (storage, isolation) as opposed to saga
/// store errors (duplicates, missing reads, stale versions).
///
/// ## Error Categories
///
/// - **UnknownDictionary**: a transaction referenced a dictionary that was never created
/// - **WriteConflict**: the transaction lost against a concurrently committed one
/// - **Storage**: anything else the underlying storage reports
#[derive(Debug, Error)]
pub enum BackingStoreError {
    #[error("unknown dictionary: {0}")]
    UnknownDictionary(String),

    #[error("write conflict: {0}")]
    WriteConflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Transactional key-value store holding named dictionaries of byte values.
///
/// The `BackingStore` is the **persistence layer** underneath the saga store. It is
/// consumed, never extended, by the saga store: every saga operation runs inside one
/// transaction obtained from [`BackingStore::begin_transaction`].
///
/// ## Isolation
///
/// Implementations must give each transaction a snapshot-style view:
/// - reads inside a transaction are repeatable
/// - writes are invisible to other transactions until `commit`
/// - when two transactions touch the same entry, at most one of them commits;
///   the other fails with [`BackingStoreError::WriteConflict`] (either at the
///   conflicting operation or at commit)
///
/// ## Abandonment
///
/// Dropping a transaction without calling `commit` discards all of its writes.
/// This is what makes cancelling an in-flight saga operation safe.
#[async_trait]
pub trait BackingStore: Send + Sync {
    type Transaction: StoreTransaction;

    /// Return the dictionary with the given name, creating it if needed.
    async fn get_or_create_dictionary(&self, name: &str) -> Result<Dictionary, BackingStoreError>;

    /// Start a new transaction.
    async fn begin_transaction(&self) -> Result<Self::Transaction, BackingStoreError>;
}

/// Unit of atomic work against a [`BackingStore`].
#[async_trait]
pub trait StoreTransaction: Send {
    /// Insert `key -> value` unless the key already exists.
    ///
    /// Returns `false` (and writes nothing) if the key is present.
    async fn try_add(
        &mut self,
        dictionary: &Dictionary,
        key: &str,
        value: &[u8],
    ) -> Result<bool, BackingStoreError>;

    /// Read the value at `key`.
    async fn try_get(
        &mut self,
        dictionary: &Dictionary,
        key: &str,
    ) -> Result<Option<Vec<u8>>, BackingStoreError>;

    /// Compare-and-swap: replace the value at `key` with `new_value` only if the
    /// current value equals `expected` byte for byte.
    ///
    /// Returns `false` if the key is absent or holds a different value.
    async fn try_update(
        &mut self,
        dictionary: &Dictionary,
        key: &str,
        new_value: &[u8],
        expected: &[u8],
    ) -> Result<bool, BackingStoreError>;

    /// Remove `key`, returning the value it held.
    async fn try_remove(
        &mut self,
        dictionary: &Dictionary,
        key: &str,
    ) -> Result<Option<Vec<u8>>, BackingStoreError>;

    /// Make every write of this transaction visible atomically.
    async fn commit(self) -> Result<(), BackingStoreError>;

    /// Discard every write of this transaction.
    ///
    /// Equivalent to dropping the transaction, but lets the backend report errors.
    async fn rollback(self) -> Result<(), BackingStoreError>;
}

#[async_trait]
impl<S> BackingStore for std::sync::Arc<S>
where
    S: BackingStore + ?Sized,
{
    type Transaction = S::Transaction;

    async fn get_or_create_dictionary(&self, name: &str) -> Result<Dictionary, BackingStoreError> {
        (**self).get_or_create_dictionary(name).await
    }

    async fn begin_transaction(&self) -> Result<Self::Transaction, BackingStoreError> {
        (**self).begin_transaction().await
    }
}
