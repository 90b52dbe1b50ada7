//! Saga identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Identifier of a saga instance.
///
/// Assigned once when the saga is created and never changed afterwards. This is the
/// key of the secondary index, so its string form must stay stable: it is always the
/// hyphenated lowercase UUID.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaId(Uuid);

impl SagaId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Tests that need a fixed id convert one from a
    /// `Uuid`.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Key used for this saga in the secondary index.
    pub fn index_key(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SagaId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for SagaId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<SagaId> for Uuid {
    fn from(value: SagaId) -> Self {
        value.0
    }
}

impl FromStr for SagaId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s).map_err(|e| CoreError::invalid_id(format!("SagaId: {e}")))?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_key_round_trips_through_from_str() {
        let id = SagaId::new();
        let parsed: SagaId = id.index_key().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn index_key_is_hyphenated_lowercase() {
        let uuid = Uuid::from_u128(0x0192_7A4B_C3D2_7E10_8F00_00AB_CDEF_0123);
        let id = SagaId::from(uuid);
        assert_eq!(id.index_key(), "01927a4b-c3d2-7e10-8f00-00abcdef0123");
        assert_eq!(Uuid::from(id), uuid);
    }

    #[test]
    fn rejects_garbage() {
        let err = "not-a-uuid".parse::<SagaId>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidId(_)));
    }
}
