//! Record contract for saga state (storage mechanics only, no business rules).
//!
//! - Saga state is a caller-defined serde type exposing a stable [`SagaId`]
//! - Each saga type declares exactly one correlation property (name + accessor)
//! - The store never interprets the state beyond its id and correlation value

use serde::{Serialize, de::DeserializeOwned};

use crate::correlation::CorrelationProperty;
use crate::error::CoreResult;
use crate::id::SagaId;

/// State of one saga instance, as persisted by the saga store.
pub trait SagaData: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier assigned at creation. Must never change for the saga's lifetime.
    fn id(&self) -> SagaId;
}

/// Saga type declaration.
///
/// Implementors define:
/// - the typed state persisted for each instance
/// - the name of the single correlation property
/// - how to read the correlation value out of the state
pub trait SagaDefinition: Send + Sync + 'static {
    type Data: SagaData;

    /// Stable saga type identifier (used in logs, e.g. "saga.sample").
    fn saga_type() -> &'static str;

    /// Name of the correlation property (must not contain the key separator).
    fn correlation_property_name() -> &'static str;

    /// Correlation value carried by a saga instance.
    fn correlation_value(data: &Self::Data) -> String;

    /// Correlation property of a saga instance.
    fn correlation_property(data: &Self::Data) -> CoreResult<CorrelationProperty> {
        CorrelationProperty::new(Self::correlation_property_name(), Self::correlation_value(data))
    }
}
