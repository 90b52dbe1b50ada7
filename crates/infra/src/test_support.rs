//! Saga fixtures shared by the crate's tests.

use serde::{Deserialize, Serialize};

use sagastore_core::{SagaData, SagaDefinition, SagaId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSagaData {
    pub id: SagaId,
    pub business_id: String,
    pub counter: u32,
}

impl SagaData for CounterSagaData {
    fn id(&self) -> SagaId {
        self.id
    }
}

pub struct CounterSaga;

impl SagaDefinition for CounterSaga {
    type Data = CounterSagaData;

    fn saga_type() -> &'static str {
        "saga.counter"
    }

    fn correlation_property_name() -> &'static str {
        "BusinessCorrelationId"
    }

    fn correlation_value(data: &Self::Data) -> String {
        data.business_id.clone()
    }
}

pub fn counter(business_id: &str, counter: u32) -> CounterSagaData {
    CounterSagaData {
        id: SagaId::new(),
        business_id: business_id.to_string(),
        counter,
    }
}
