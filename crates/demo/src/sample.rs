//! Sample counter saga driven through its whole lifecycle.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sagastore_core::{SagaData, SagaDefinition, SagaId};
use sagastore_infra::{BackingStore, SagaStore, SagaStoreError, VersionTracker};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSagaData {
    pub id: SagaId,
    pub business_id: String,
    pub counter: u32,
}

impl SagaData for SampleSagaData {
    fn id(&self) -> SagaId {
        self.id
    }
}

pub struct SampleSaga;

impl SagaDefinition for SampleSaga {
    type Data = SampleSagaData;

    fn saga_type() -> &'static str {
        "saga.sample"
    }

    fn correlation_property_name() -> &'static str {
        "BusinessCorrelationId"
    }

    fn correlation_value(data: &Self::Data) -> String {
        data.business_id.clone()
    }
}

/// Save a saga, increment it, show that a stale writer is refused, then complete it.
pub async fn run_scenario<B: BackingStore>(store: &SagaStore<B>) -> anyhow::Result<()> {
    let business_id = format!("order-{}", SagaId::new());
    let saga = SampleSagaData {
        id: SagaId::new(),
        business_id: business_id.clone(),
        counter: 0,
    };

    store.save_saga::<SampleSaga>(&saga).await?;
    info!(saga_id = %saga.id, business_id = %business_id, "saga created");

    let mut first = VersionTracker::new();
    let loaded = store
        .find_saga::<SampleSaga>(&mut first, &business_id)
        .await?
        .context("saga vanished after save")?;

    let incremented = SampleSagaData {
        counter: loaded.counter + 1,
        ..loaded.clone()
    };
    store.update(&first, &incremented).await?;
    info!(counter = incremented.counter, "saga updated");

    // `first` still holds the pre-update bytes.
    let stale = SampleSagaData {
        counter: loaded.counter + 10,
        ..loaded
    };
    match store.update(&first, &stale).await {
        Err(SagaStoreError::ConcurrencyConflict { id }) => {
            warn!(saga_id = %id, "stale update refused as expected");
        }
        Err(e) => return Err(e.into()),
        Ok(()) => bail!("stale update was accepted"),
    }

    let mut second = VersionTracker::new();
    let current = store
        .get_by_id::<SampleSagaData>(&mut second, saga.id)
        .await?
        .context("saga vanished after update")?;
    info!(counter = current.counter, "saga reloaded");

    store.complete(&mut second, &current).await?;
    info!(saga_id = %saga.id, "saga completed");

    if store
        .get_by_id::<SampleSagaData>(&mut second, saga.id)
        .await?
        .is_some()
    {
        bail!("completed saga is still stored");
    }
    Ok(())
}
