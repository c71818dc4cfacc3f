use std::collections::BTreeMap;

use anyhow::{Result, bail};
use futures_util::future::BoxFuture;
use serde_json::Value;

/// Path -> value pairs written by one multi-path update.
pub type Updates = BTreeMap<String, Value>;

/// A hierarchical JSON tree addressed by `/`-separated paths.
pub trait RemoteStore: Send + Sync {
    /// Value at `path`, or `None` when nothing is stored there.
    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<Value>>>;

    fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.get(path).await?.is_some()) })
    }

    /// Write every path or none of them.
    fn update(&self, updates: Updates) -> BoxFuture<'_, Result<()>>;
}

/// Split a path into its segments, rejecting characters the remote tree does
/// not allow in keys.
pub fn path_segments(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        bail!("Empty remote path");
    }

    for segment in &segments {
        if segment.chars().any(|c| matches!(c, '.' | '#' | '$' | '[' | ']') || c.is_control()) {
            bail!("Invalid remote path segment '{}' in '{}'", segment, path);
        }
    }

    Ok(segments)
}
