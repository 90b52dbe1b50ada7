//! `sagastore-core` — saga store building blocks.
//!
//! This crate contains the storage-agnostic primitives shared by every backend:
//! saga identifiers, correlation keys and the record contract saga types implement.

pub mod correlation;
pub mod error;
pub mod id;
pub mod saga;

pub use correlation::{CorrelationKey, CorrelationProperty, KEY_SEPARATOR, build_key};
pub use error::{CoreError, CoreResult};
pub use id::SagaId;
pub use saga::{SagaData, SagaDefinition};
