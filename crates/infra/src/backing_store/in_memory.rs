use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use super::r#trait::{BackingStore, BackingStoreError, Dictionary, StoreTransaction};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    dictionary: String,
    key: String,
}

impl EntryKey {
    fn new(dictionary: &Dictionary, key: &str) -> Self {
        Self {
            dictionary: dictionary.name().to_string(),
            key: key.to_string(),
        }
    }
}

/// Committed state at one point in time.
///
/// `versions` maps an entry to the sequence number of the last commit that wrote
/// it, removals included, so a remove racing an add on the same key is still a
/// conflict. Versions no open transaction can observe are pruned on commit.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    dictionaries: HashSet<String>,
    entries: HashMap<EntryKey, Vec<u8>>,
    versions: HashMap<EntryKey, u64>,
    commit_seq: u64,
}

impl Snapshot {
    /// True if `key` was committed after the snapshot taken at `seq`.
    fn written_since(&self, key: &EntryKey, seq: u64) -> bool {
        self.versions.get(key).is_some_and(|v| *v > seq)
    }
}

/// Snapshot sequence numbers of live transactions, with a count per sequence.
type OpenSnapshots = Arc<Mutex<BTreeMap<u64, usize>>>;

fn poisoned<T>(_: T) -> BackingStoreError {
    BackingStoreError::Storage("lock poisoned".to_string())
}

/// In-memory transactional dictionary store.
///
/// Intended for tests/dev. Not optimized for performance: every commit that races
/// an open transaction copies the committed state. Version bookkeeping is bounded
/// by the entries written since the oldest open transaction began.
///
/// Each transaction works against the snapshot that was current when it began and
/// buffers its writes. Commit succeeds only if none of the entries it wrote were
/// committed by someone else in the meantime (first committer wins).
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackingStore {
    committed: Arc<RwLock<Arc<Snapshot>>>,
    open: OpenSnapshots,
}

impl InMemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed entries in a dictionary.
    pub fn entry_count(&self, dictionary: &Dictionary) -> Result<usize, BackingStoreError> {
        let current = self.current()?;
        Ok(current
            .entries
            .keys()
            .filter(|k| k.dictionary == dictionary.name())
            .count())
    }

    fn current(&self) -> Result<Arc<Snapshot>, BackingStoreError> {
        let guard = self.committed.read().map_err(poisoned)?;
        Ok(Arc::clone(&guard))
    }
}

#[async_trait]
impl BackingStore for InMemoryBackingStore {
    type Transaction = InMemoryTransaction;

    async fn get_or_create_dictionary(&self, name: &str) -> Result<Dictionary, BackingStoreError> {
        let mut guard = self.committed.write().map_err(poisoned)?;

        if !guard.dictionaries.contains(name) {
            Arc::make_mut(&mut *guard).dictionaries.insert(name.to_string());
        }

        Ok(Dictionary::new(name))
    }

    async fn begin_transaction(&self) -> Result<Self::Transaction, BackingStoreError> {
        // Registered under the read lock so no commit can prune past this snapshot
        // before it is visible in `open`.
        let guard = self.committed.read().map_err(poisoned)?;
        let snapshot = Arc::clone(&guard);
        *self.open.lock().map_err(poisoned)?.entry(snapshot.commit_seq).or_default() += 1;
        drop(guard);

        Ok(InMemoryTransaction {
            committed: Arc::clone(&self.committed),
            open: Arc::clone(&self.open),
            snapshot,
            writes: HashMap::new(),
        })
    }
}

/// Transaction over an [`InMemoryBackingStore`].
///
/// Dropping it without committing discards the buffered writes.
#[derive(Debug)]
pub struct InMemoryTransaction {
    committed: Arc<RwLock<Arc<Snapshot>>>,
    open: OpenSnapshots,
    snapshot: Arc<Snapshot>,
    /// `None` marks a removal.
    writes: HashMap<EntryKey, Option<Vec<u8>>>,
}

impl InMemoryTransaction {
    fn entry(&self, dictionary: &Dictionary, key: &str) -> Result<EntryKey, BackingStoreError> {
        if !self.snapshot.dictionaries.contains(dictionary.name()) {
            return Err(BackingStoreError::UnknownDictionary(dictionary.name().to_string()));
        }
        Ok(EntryKey::new(dictionary, key))
    }

    /// Value visible to this transaction: own writes first, then the snapshot.
    fn visible(&self, entry: &EntryKey) -> Option<&[u8]> {
        match self.writes.get(entry) {
            Some(written) => written.as_deref(),
            None => self.snapshot.entries.get(entry).map(Vec::as_slice),
        }
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn try_add(
        &mut self,
        dictionary: &Dictionary,
        key: &str,
        value: &[u8],
    ) -> Result<bool, BackingStoreError> {
        let entry = self.entry(dictionary, key)?;
        if self.visible(&entry).is_some() {
            return Ok(false);
        }
        self.writes.insert(entry, Some(value.to_vec()));
        Ok(true)
    }

    async fn try_get(
        &mut self,
        dictionary: &Dictionary,
        key: &str,
    ) -> Result<Option<Vec<u8>>, BackingStoreError> {
        let entry = self.entry(dictionary, key)?;
        Ok(self.visible(&entry).map(<[u8]>::to_vec))
    }

    async fn try_update(
        &mut self,
        dictionary: &Dictionary,
        key: &str,
        new_value: &[u8],
        expected: &[u8],
    ) -> Result<bool, BackingStoreError> {
        let entry = self.entry(dictionary, key)?;
        if self.visible(&entry) != Some(expected) {
            return Ok(false);
        }
        self.writes.insert(entry, Some(new_value.to_vec()));
        Ok(true)
    }

    async fn try_remove(
        &mut self,
        dictionary: &Dictionary,
        key: &str,
    ) -> Result<Option<Vec<u8>>, BackingStoreError> {
        let entry = self.entry(dictionary, key)?;
        let removed = self.visible(&entry).map(<[u8]>::to_vec);
        if removed.is_some() {
            self.writes.insert(entry, None);
        }
        Ok(removed)
    }

    async fn commit(mut self) -> Result<(), BackingStoreError> {
        if self.writes.is_empty() {
            return Ok(());
        }

        let mut guard = self.committed.write().map_err(poisoned)?;

        // First committer wins: every entry we wrote must be unchanged since our snapshot.
        let since = self.snapshot.commit_seq;
        for entry in self.writes.keys() {
            if guard.written_since(entry, since) {
                return Err(BackingStoreError::WriteConflict(format!(
                    "{}/{} was committed by a concurrent transaction",
                    entry.dictionary, entry.key
                )));
            }
        }

        // Versions at or below the oldest open snapshot can no longer cause a conflict.
        let horizon = self.open.lock().map_err(poisoned)?.keys().next().copied();

        let next = Arc::make_mut(&mut *guard);
        next.commit_seq += 1;
        let seq = next.commit_seq;

        for (entry, value) in std::mem::take(&mut self.writes) {
            match value {
                Some(bytes) => {
                    next.entries.insert(entry.clone(), bytes);
                }
                None => {
                    next.entries.remove(&entry);
                }
            }
            next.versions.insert(entry, seq);
        }
        let horizon = horizon.unwrap_or(seq);
        next.versions.retain(|_, v| *v > horizon);

        Ok(())
    }

    async fn rollback(self) -> Result<(), BackingStoreError> {
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        let Ok(mut open) = self.open.lock() else {
            return;
        };
        let seq = self.snapshot.commit_seq;
        if let Some(count) = open.get_mut(&seq) {
            *count -= 1;
            if *count == 0 {
                open.remove(&seq);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(name: &str) -> (InMemoryBackingStore, Dictionary) {
        let store = InMemoryBackingStore::new();
        let dict = store.get_or_create_dictionary(name).await.unwrap();
        (store, dict)
    }

    #[tokio::test]
    async fn committed_writes_are_visible_to_later_transactions() {
        let (store, dict) = store_with("d").await;

        let mut tx = store.begin_transaction().await.unwrap();
        assert!(tx.try_add(&dict, "k", b"v1").await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        assert_eq!(tx.try_get(&dict, "k").await.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.entry_count(&dict).unwrap(), 1);
    }

    #[tokio::test]
    async fn try_add_refuses_existing_key() {
        let (store, dict) = store_with("d").await;

        let mut tx = store.begin_transaction().await.unwrap();
        assert!(tx.try_add(&dict, "k", b"v1").await.unwrap());
        assert!(!tx.try_add(&dict, "k", b"v2").await.unwrap());
        assert_eq!(tx.try_get(&dict, "k").await.unwrap(), Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn try_update_compares_exact_bytes() {
        let (store, dict) = store_with("d").await;

        let mut tx = store.begin_transaction().await.unwrap();
        tx.try_add(&dict, "k", b"abc").await.unwrap();

        // Prefix and longer values are both mismatches.
        assert!(!tx.try_update(&dict, "k", b"new", b"ab").await.unwrap());
        assert!(!tx.try_update(&dict, "k", b"new", b"abcd").await.unwrap());
        assert!(!tx.try_update(&dict, "missing", b"new", b"abc").await.unwrap());

        assert!(tx.try_update(&dict, "k", b"new", b"abc").await.unwrap());
        assert_eq!(tx.try_get(&dict, "k").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let (store, dict) = store_with("d").await;

        {
            let mut tx = store.begin_transaction().await.unwrap();
            tx.try_add(&dict, "k", b"v").await.unwrap();
        }

        let mut tx = store.begin_transaction().await.unwrap();
        assert!(tx.try_get(&dict, "k").await.unwrap().is_none());
        assert_eq!(store.entry_count(&dict).unwrap(), 0);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let (store, dict) = store_with("d").await;

        let mut tx = store.begin_transaction().await.unwrap();
        tx.try_add(&dict, "k", b"v").await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.entry_count(&dict).unwrap(), 0);
    }

    #[tokio::test]
    async fn reads_see_the_snapshot_taken_at_begin() {
        let (store, dict) = store_with("d").await;

        let mut seed = store.begin_transaction().await.unwrap();
        seed.try_add(&dict, "k", b"v1").await.unwrap();
        seed.commit().await.unwrap();

        let mut reader = store.begin_transaction().await.unwrap();

        let mut writer = store.begin_transaction().await.unwrap();
        assert!(writer.try_update(&dict, "k", b"v2", b"v1").await.unwrap());
        writer.commit().await.unwrap();

        assert_eq!(reader.try_get(&dict, "k").await.unwrap(), Some(b"v1".to_vec()));
        // Read-only transactions never conflict.
        reader.commit().await.unwrap();
    }

    #[tokio::test]
    async fn first_committer_wins_on_the_same_entry() {
        let (store, dict) = store_with("d").await;

        let mut seed = store.begin_transaction().await.unwrap();
        seed.try_add(&dict, "k", b"v0").await.unwrap();
        seed.commit().await.unwrap();

        let mut a = store.begin_transaction().await.unwrap();
        let mut b = store.begin_transaction().await.unwrap();
        assert!(a.try_update(&dict, "k", b"a", b"v0").await.unwrap());
        assert!(b.try_update(&dict, "k", b"b", b"v0").await.unwrap());

        a.commit().await.unwrap();
        let err = b.commit().await.unwrap_err();
        assert!(matches!(err, BackingStoreError::WriteConflict(_)));

        let mut check = store.begin_transaction().await.unwrap();
        assert_eq!(check.try_get(&dict, "k").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn remove_racing_update_conflicts() {
        let (store, dict) = store_with("d").await;

        let mut seed = store.begin_transaction().await.unwrap();
        seed.try_add(&dict, "k", b"v").await.unwrap();
        seed.commit().await.unwrap();

        let mut remover = store.begin_transaction().await.unwrap();
        let mut updater = store.begin_transaction().await.unwrap();
        assert_eq!(remover.try_remove(&dict, "k").await.unwrap(), Some(b"v".to_vec()));
        assert!(updater.try_update(&dict, "k", b"w", b"v").await.unwrap());

        remover.commit().await.unwrap();
        assert!(matches!(
            updater.commit().await,
            Err(BackingStoreError::WriteConflict(_))
        ));
    }

    #[tokio::test]
    async fn unknown_dictionary_is_rejected() {
        let store = InMemoryBackingStore::new();
        let mut tx = store.begin_transaction().await.unwrap();
        let err = tx
            .try_get(&Dictionary::new("never-created"), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, BackingStoreError::UnknownDictionary(name) if name == "never-created"));
    }

    #[tokio::test]
    async fn dictionaries_are_isolated_namespaces() {
        let store = InMemoryBackingStore::new();
        let a = store.get_or_create_dictionary("a").await.unwrap();
        let b = store.get_or_create_dictionary("b").await.unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        tx.try_add(&a, "k", b"in-a").await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        assert!(tx.try_get(&b, "k").await.unwrap().is_none());
        assert_eq!(store.entry_count(&a).unwrap(), 1);
        assert_eq!(store.entry_count(&b).unwrap(), 0);
    }

    #[tokio::test]
    async fn completed_keys_do_not_accumulate_versions() {
        let (store, dict) = store_with("d").await;

        for n in 0..100 {
            let key = format!("k{n}");
            let mut tx = store.begin_transaction().await.unwrap();
            tx.try_add(&dict, &key, b"v").await.unwrap();
            tx.commit().await.unwrap();

            let mut tx = store.begin_transaction().await.unwrap();
            tx.try_remove(&dict, &key).await.unwrap();
            tx.commit().await.unwrap();
        }

        assert_eq!(store.entry_count(&dict).unwrap(), 0);
        assert!(store.current().unwrap().versions.len() <= 1);
        assert!(store.open.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn versions_stay_visible_to_old_transactions() {
        let (store, dict) = store_with("d").await;

        let mut old = store.begin_transaction().await.unwrap();

        for _ in 0..3 {
            let mut tx = store.begin_transaction().await.unwrap();
            tx.try_add(&dict, "k", b"churn").await.unwrap();
            tx.commit().await.unwrap();

            let mut tx = store.begin_transaction().await.unwrap();
            tx.try_remove(&dict, "k").await.unwrap();
            tx.commit().await.unwrap();
        }

        // "k" is absent both in `old`'s snapshot and now, but it was written in between.
        assert!(old.try_add(&dict, "k", b"late").await.unwrap());
        assert!(matches!(old.commit().await, Err(BackingStoreError::WriteConflict(_))));
    }
}
