// SPDX-License-Identifier: MIT OR Apache-2.0

//! Points of interest handed to providers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A geographic entity (e.g. a car park) and its free-form properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poi {
    /// Identifier of the POI in the calling system.
    pub id: String,
    /// Free-form properties; `operator` and `ref` are the ones providers read.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Poi {
    /// Create a POI without properties.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Add or replace a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The entity operating this POI, if known.
    pub fn operator(&self) -> Option<&str> {
        self.properties.get("operator").map(String::as_str)
    }

    /// The identifier of this POI in the operator's own system.
    pub fn reference(&self) -> Option<&str> {
        self.properties.get("ref").map(String::as_str)
    }
}
