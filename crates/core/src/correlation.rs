//! Correlation properties and the primary-dictionary key derived from them.
//!
//! A saga is found by business data through exactly one correlation property, a
//! `(name, value)` pair. The primary dictionary is keyed by `name + "_" + value`.
//! Names may not contain the separator, so the first separator in a key always
//! marks the end of the name and the key can be parsed back unambiguously.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Separator between correlation name and value in a [`CorrelationKey`].
pub const KEY_SEPARATOR: char = '_';

/// A correlation property: the business data used to locate an existing saga.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationProperty {
    name: String,
    value: String,
}

impl CorrelationProperty {
    /// Build a correlation property from a name and any displayable value.
    ///
    /// Fails if the name is empty or contains [`KEY_SEPARATOR`].
    pub fn new(name: impl Into<String>, value: impl fmt::Display) -> CoreResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            value: value.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Primary-dictionary key for this property.
    pub fn key(&self) -> CorrelationKey {
        CorrelationKey(format!("{}{}{}", self.name, KEY_SEPARATOR, self.value))
    }
}

/// Key of an entry in the primary saga dictionary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    /// Wrap a key read back from storage (e.g. a secondary-index value).
    ///
    /// No validation happens here; use [`CorrelationKey::parse`] to inspect it.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the key back into `(name, value)`.
    ///
    /// Returns `None` for keys that were not produced by [`build_key`].
    pub fn parse(&self) -> Option<(&str, &str)> {
        let (name, value) = self.0.split_once(KEY_SEPARATOR)?;
        if name.is_empty() {
            return None;
        }
        Some((name, value))
    }

    /// True if this key was built from the given correlation name and value.
    pub fn matches(&self, name: &str, value: &str) -> bool {
        self.parse() == Some((name, value))
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the primary key for a correlation `(name, value)` pair.
pub fn build_key(name: &str, value: impl fmt::Display) -> CoreResult<CorrelationKey> {
    Ok(CorrelationProperty::new(name, value)?.key())
}

fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_correlation("correlation name is empty"));
    }
    if name.contains(KEY_SEPARATOR) {
        return Err(CoreError::invalid_correlation(format!(
            "correlation name '{name}' contains the key separator '{KEY_SEPARATOR}'"
        )));
    }
    Ok(())
}
