//! JSON-file backed key-value store with dotted-path addressing.
//!
//! Paths look like `"1234567890.status"`: the first segment is a top-level
//! key, the rest traverse (or create, on writes) nested objects. There is no
//! schema; callers serialize whatever they need into `serde_json::Value`.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::warn;

use crate::errors::BotError;

pub struct JsonStore {
    path: PathBuf,
    data: Mutex<Map<String, Value>>,
}

impl JsonStore {
    /// Opens the store, loading existing data when the file is present.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, BotError> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, data: Mutex::new(data) })
    }

    pub async fn get(&self, path: &str) -> Option<Value> {
        let data = self.data.lock().await;
        let mut segments = path.split('.');
        let mut current = data.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current.clone())
    }

    pub async fn has(&self, path: &str) -> bool {
        self.get(path).await.is_some()
    }

    /// All top-level entries, in insertion order.
    pub async fn all(&self) -> Vec<(String, Value)> {
        let data = self.data.lock().await;
        data.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub async fn set(&self, path: &str, value: Value) -> Result<(), BotError> {
        let mut data = self.data.lock().await;
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop().unwrap_or(path);

        let mut current = &mut *data;
        for segment in segments {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(next) = entry else {
                return Err(BotError::config("store path collided with a non-object value"));
            };
            current = next;
        }
        current.insert(last.to_string(), value);
        self.persist(&data).await
    }

    /// Removes a path, returning whether anything was deleted.
    pub async fn delete(&self, path: &str) -> Result<bool, BotError> {
        let mut data = self.data.lock().await;
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop().unwrap_or(path);

        let mut current = &mut *data;
        for segment in segments {
            match current.get_mut(segment).and_then(Value::as_object_mut) {
                Some(next) => current = next,
                None => return Ok(false),
            }
        }
        let removed = current.remove(last).is_some();
        if removed {
            self.persist(&data).await?;
        }
        Ok(removed)
    }

    async fn persist(&self, data: &Map<String, Value>) -> Result<(), BotError> {
        let bytes = serde_json::to_vec_pretty(data)?;
        if let Err(err) = tokio::fs::write(&self.path, bytes).await {
            warn!(path = %self.path.display(), error = %err, "failed to persist store");
            return Err(err.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::JsonStore;

    async fn temp_store() -> (tempfile::TempDir, JsonStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::open(dir.path().join("store.json"))
            .await
            .expect("open");
        (dir, store)
    }

    #[tokio::test]
    async fn set_get_roundtrip_with_dotted_paths() {
        let (_dir, store) = temp_store().await;
        store.set("111.status", json!("Open")).await.unwrap();
        store.set("111.userID", json!("42")).await.unwrap();

        assert_eq!(store.get("111.status").await, Some(json!("Open")));
        assert_eq!(
            store.get("111").await,
            Some(json!({ "status": "Open", "userID": "42" }))
        );
        assert!(store.has("111.userID").await);
        assert!(!store.has("111.claimUser").await);
    }

    #[tokio::test]
    async fn delete_removes_nested_and_top_level_keys() {
        let (_dir, store) = temp_store().await;
        store.set("222.status", json!("Closed")).await.unwrap();

        assert!(store.delete("222.status").await.unwrap());
        assert!(!store.delete("222.status").await.unwrap());
        assert!(store.has("222").await);
        assert!(store.delete("222").await.unwrap());
        assert!(!store.has("222").await);
    }

    #[tokio::test]
    async fn all_lists_top_level_entries() {
        let (_dir, store) = temp_store().await;
        store.set("user-1", json!({ "reason": "spam" })).await.unwrap();
        store.set("role-2", json!({ "reason": "raid" })).await.unwrap();

        let entries = store.all().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|(k, _)| k == "user-1"));
    }

    #[tokio::test]
    async fn reopen_reads_persisted_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        {
            let store = JsonStore::open(&path).await.unwrap();
            store.set("333.ticketType", json!("support")).await.unwrap();
        }
        let store = JsonStore::open(&path).await.unwrap();
        assert_eq!(store.get("333.ticketType").await, Some(json!("support")));
    }
}
