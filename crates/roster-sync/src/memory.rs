use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use crate::remote::{RemoteStore, Updates, path_segments};

/// In-process remote tree for tests and local experiments. The server never
/// falls back to it; without a remote URL the sync is disabled.
pub struct MemoryRemote {
    root: Mutex<Value>,
    update_calls: AtomicUsize,
    paths_written: AtomicUsize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::with_data(Value::Object(Map::new()))
    }

    pub fn with_data(root: Value) -> Self {
        Self {
            root: Mutex::new(root),
            update_calls: AtomicUsize::new(0),
            paths_written: AtomicUsize::new(0),
        }
    }

    /// Copy of the whole tree.
    pub fn snapshot(&self) -> Result<Value> {
        Ok(self.lock()?.clone())
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::Relaxed)
    }

    pub fn paths_written(&self) -> usize {
        self.paths_written.load(Ordering::Relaxed)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Value>> {
        self.root
            .lock()
            .map_err(|e| anyhow::anyhow!("Remote tree lock poisoned: {}", e))
    }
}

impl RemoteStore for MemoryRemote {
    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
        Box::pin(async move {
            let segments = path_segments(path)?;
            let root = self.lock()?;

            let mut node = &*root;
            for segment in segments {
                match node.get(segment) {
                    Some(child) => node = child,
                    None => return Ok(None),
                }
            }

            Ok(if node.is_null() { None } else { Some(node.clone()) })
        })
    }

    fn update(&self, updates: Updates) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            // Validate everything before touching the tree
            let parsed = updates
                .iter()
                .map(|(path, value)| path_segments(path).map(|segments| (segments, value)))
                .collect::<Result<Vec<_>>>()?;

            let mut root = self.lock()?;
            for (segments, value) in parsed {
                set_at(&mut root, &segments, value.clone());
            }

            self.update_calls.fetch_add(1, Ordering::Relaxed);
            self.paths_written.fetch_add(updates.len(), Ordering::Relaxed);
            Ok(())
        })
    }
}

/// Write `value` at `segments`, creating intermediate objects. A null value
/// deletes the key.
fn set_at(root: &mut Value, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut node = root;
    for segment in parents {
        node = as_object(node)
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let map = as_object(node);
    if value.is_null() {
        map.remove(*last);
    } else {
        map.insert(last.to_string(), value);
    }
}

/// Scalars in the way of a write are replaced by an empty object.
fn as_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_and_exists() {
        let remote = MemoryRemote::with_data(json!({ "members": { "01": { "bio": "x" } } }));

        assert_eq!(remote.get("members/01").await.unwrap(), Some(json!({ "bio": "x" })));
        assert!(remote.exists("members/01").await.unwrap());
        assert!(!remote.exists("members/02").await.unwrap());
        assert!(!remote.exists("users/01").await.unwrap());
    }

    #[tokio::test]
    async fn multi_path_update_is_all_or_nothing() {
        let remote = MemoryRemote::new();

        let mut bad = Updates::new();
        bad.insert("members/01".into(), json!({ "bio": "a" }));
        bad.insert("members/bad.id".into(), json!({ "bio": "b" }));
        assert!(remote.update(bad).await.is_err());
        assert_eq!(remote.snapshot().unwrap(), json!({}));
        assert_eq!(remote.update_calls(), 0);

        let mut good = Updates::new();
        good.insert("members/01".into(), json!({ "bio": "a" }));
        good.insert("members/02".into(), json!({ "bio": "b" }));
        remote.update(good).await.unwrap();
        assert_eq!(
            remote.snapshot().unwrap(),
            json!({ "members": { "01": { "bio": "a" }, "02": { "bio": "b" } } })
        );
        assert_eq!(remote.update_calls(), 1);
        assert_eq!(remote.paths_written(), 2);
    }

    #[tokio::test]
    async fn null_deletes_and_scalars_are_replaced() {
        let remote = MemoryRemote::with_data(json!({ "members": "scalar" }));

        let mut updates = Updates::new();
        updates.insert("members/01".into(), json!(1));
        remote.update(updates).await.unwrap();
        assert_eq!(remote.snapshot().unwrap(), json!({ "members": { "01": 1 } }));

        let mut updates = Updates::new();
        updates.insert("members/01".into(), Value::Null);
        remote.update(updates).await.unwrap();
        assert!(!remote.exists("members/01").await.unwrap());
    }
}
