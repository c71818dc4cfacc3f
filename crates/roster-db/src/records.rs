use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};

use crate::Database;

/// JSON-typed access on top of the raw string store.
impl Database {
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_value(key)? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt record at key '{}'", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.put_value(key, &raw)
    }
}

/// Serialize a value for a batched `put_values` call.
pub fn entry<T: Serialize>(key: impl Into<String>, value: &T) -> Result<(String, String)> {
    Ok((key.into(), serde_json::to_string(value)?))
}
