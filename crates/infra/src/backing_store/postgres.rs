//! Postgres-backed dictionary store.
//!
//! All dictionaries share one table, `saga_dictionary_entries`, keyed by
//! `(dictionary, key)`. Dictionary names are registered in `saga_dictionaries`.
//! Transactions run at `REPEATABLE READ`, which gives every saga operation a
//! snapshot view and makes Postgres abort the second of two writers touching the
//! same row.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | BackingStoreError | Scenario |
//! |------------|----------------------|-------------------|----------|
//! | Database (serialization failure) | `40001` | `WriteConflict` | Concurrent transaction updated the same row |
//! | Database (deadlock detected) | `40P01` | `WriteConflict` | Two transactions locked rows in opposite order |
//! | Database (unique violation) | `23505` | `WriteConflict` | Concurrent insert of the same key |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed | N/A | `Storage` | Connection pool was closed |
//! | Other | N/A | `Storage` | Network errors, connection failures, etc. |
//!
//! ## Thread Safety
//!
//! `PostgresBackingStore` is `Send + Sync` and can be shared across tasks.
//! Dropping a [`PostgresTransaction`] without committing rolls it back.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use super::r#trait::{BackingStore, BackingStoreError, Dictionary, StoreTransaction};

/// Postgres-backed transactional dictionary store.
#[derive(Debug, Clone)]
pub struct PostgresBackingStore {
    pool: Arc<PgPool>,
}

impl PostgresBackingStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the dictionary tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), BackingStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS saga_dictionaries (
                name TEXT PRIMARY KEY
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_dictionaries_table", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS saga_dictionary_entries (
                dictionary TEXT NOT NULL REFERENCES saga_dictionaries (name),
                key TEXT NOT NULL,
                value BYTEA NOT NULL,
                PRIMARY KEY (dictionary, key)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_entries_table", e))?;

        Ok(())
    }
}

#[async_trait]
impl BackingStore for PostgresBackingStore {
    type Transaction = PostgresTransaction;

    #[instrument(skip(self), err)]
    async fn get_or_create_dictionary(&self, name: &str) -> Result<Dictionary, BackingStoreError> {
        sqlx::query(
            r#"
            INSERT INTO saga_dictionaries (name)
            VALUES ($1)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_or_create_dictionary", e))?;

        Ok(Dictionary::new(name))
    }

    async fn begin_transaction(&self) -> Result<Self::Transaction, BackingStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation_level", e))?;

        Ok(PostgresTransaction { tx })
    }
}

/// Transaction over a [`PostgresBackingStore`].
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn try_add(
        &mut self,
        dictionary: &Dictionary,
        key: &str,
        value: &[u8],
    ) -> Result<bool, BackingStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO saga_dictionary_entries (dictionary, key, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (dictionary, key) DO NOTHING
            "#,
        )
        .bind(dictionary.name())
        .bind(key)
        .bind(value)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_dictionary_error("try_add", dictionary, e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn try_get(
        &mut self,
        dictionary: &Dictionary,
        key: &str,
    ) -> Result<Option<Vec<u8>>, BackingStoreError> {
        let row = sqlx::query(
            r#"
            SELECT value
            FROM saga_dictionary_entries
            WHERE dictionary = $1 AND key = $2
            "#,
        )
        .bind(dictionary.name())
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("try_get", e))?;

        row.map(|r| r.try_get::<Vec<u8>, _>("value"))
            .transpose()
            .map_err(|e| map_sqlx_error("decode_value", e))
    }

    async fn try_update(
        &mut self,
        dictionary: &Dictionary,
        key: &str,
        new_value: &[u8],
        expected: &[u8],
    ) -> Result<bool, BackingStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE saga_dictionary_entries
            SET value = $3
            WHERE dictionary = $1 AND key = $2 AND value = $4
            "#,
        )
        .bind(dictionary.name())
        .bind(key)
        .bind(new_value)
        .bind(expected)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("try_update", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn try_remove(
        &mut self,
        dictionary: &Dictionary,
        key: &str,
    ) -> Result<Option<Vec<u8>>, BackingStoreError> {
        let row = sqlx::query(
            r#"
            DELETE FROM saga_dictionary_entries
            WHERE dictionary = $1 AND key = $2
            RETURNING value
            "#,
        )
        .bind(dictionary.name())
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("try_remove", e))?;

        row.map(|r| r.try_get::<Vec<u8>, _>("value"))
            .transpose()
            .map_err(|e| map_sqlx_error("decode_value", e))
    }

    async fn commit(self) -> Result<(), BackingStoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), BackingStoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Map errors from statements that insert into a dictionary.
///
/// A foreign-key violation there means the dictionary was never registered.
fn map_dictionary_error(operation: &str, dictionary: &Dictionary, err: sqlx::Error) -> BackingStoreError {
    if sqlstate(&err).as_deref() == Some("23503") {
        return BackingStoreError::UnknownDictionary(dictionary.name().to_string());
    }
    map_sqlx_error(operation, err)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> BackingStoreError {
    match sqlstate(&err).as_deref() {
        Some("40001") | Some("40P01") | Some("23505") => {
            BackingStoreError::WriteConflict(format!("{operation}: {err}"))
        }
        _ => BackingStoreError::Storage(format!("{operation}: {err}")),
    }
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}
