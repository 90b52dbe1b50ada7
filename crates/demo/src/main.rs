mod sample;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use sagastore_infra::{BackendKind, BackingStore, InMemoryBackingStore, PostgresBackingStore, SagaStore, StoreConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sagastore_observability::init();

    let config = StoreConfig::from_env().context("invalid saga store configuration")?;
    tracing::info!(backend = ?config.backend, "starting saga store demo");

    match config.backend {
        BackendKind::Memory => run(InMemoryBackingStore::new()).await,
        BackendKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres backend")?;
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(url)
                .await
                .context("failed to connect to Postgres")?;

            let backing = PostgresBackingStore::new(pool);
            backing.ensure_schema().await.context("failed to create saga tables")?;
            run(backing).await
        }
    }
}

async fn run<B: BackingStore>(backing: B) -> anyhow::Result<()> {
    let store = SagaStore::open(backing).await.context("failed to open saga store")?;
    sample::run_scenario(&store).await?;
    tracing::info!("demo finished");
    Ok(())
}
