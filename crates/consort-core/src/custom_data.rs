//! Opaque key/value state not covered by parameters.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

pub const CUSTOM_DATA_STRING: &str = "string";
pub const CUSTOM_DATA_PATH: &str = "path";
pub const CUSTOM_DATA_CHUNK: &str = "chunk";
pub const CUSTOM_DATA_BINARY: &str = "binary";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomData {
    #[serde(rename = "type")]
    pub kind: String,
    pub key: String,
    pub value: String,
}

impl CustomData {
    pub fn new(kind: &str, key: &str, value: &str) -> Self {
        Self {
            kind: kind.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Ordered list with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomDataList {
    entries: Vec<CustomData>,
}

impl CustomDataList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, or replace the value of an existing key in place.
    pub fn set(&mut self, data: CustomData) -> Result<()> {
        if data.kind.is_empty() {
            return Err(Error::InvalidCustomData(format!(
                "empty type for key '{}'",
                data.key
            )));
        }
        if data.key.is_empty() {
            return Err(Error::InvalidCustomData("empty key".into()));
        }
        if let Some(existing) = self.entries.iter_mut().find(|e| e.key == data.key) {
            existing.kind = data.kind;
            existing.value = data.value;
        } else {
            self.entries.push(data);
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&CustomData> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CustomData> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
