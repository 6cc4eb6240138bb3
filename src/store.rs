//! Memory and cache collaborators.
//!
//! The loops only see the [`MemoryStore`] and [`Cache`] traits; the binary
//! wires in [`LocalStore`] and [`FileCache`] and shares them between clients.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::types::{Connection, MemoryRecord};

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemoryRecord>>;

    /// Insert a record. An existing record with the same id is left as is.
    async fn create(&self, record: MemoryRecord) -> Result<()>;

    /// Records in a room, newest first.
    async fn list_by_room(&self, room_id: Uuid) -> Result<Vec<MemoryRecord>>;

    /// Register a user as a participant of a room.
    async fn ensure_connection(&self, connection: &Connection) -> Result<()>;
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    records: HashMap<Uuid, MemoryRecord>,
    #[serde(default)]
    connections: Vec<Connection>,
}

/// In-process memory store, optionally mirrored to a JSON file.
pub struct LocalStore {
    inner: RwLock<Snapshot>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Snapshot::default()),
            path: None,
        }
    }

    /// Open (or start) a store persisted at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        debug!(
            "Opened memory store {} ({} records)",
            path.display(),
            snapshot.records.len()
        );
        Ok(Self {
            inner: RwLock::new(snapshot),
            path: Some(path),
        })
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn flush(&self, snapshot: &Snapshot) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string(snapshot).context("failed to serialize memory store")?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for LocalStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemoryRecord>> {
        Ok(self.inner.read().await.records.get(&id).cloned())
    }

    async fn create(&self, record: MemoryRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.records.contains_key(&record.id) {
            return Ok(());
        }
        inner.records.insert(record.id, record);
        self.flush(&inner).await
    }

    async fn list_by_room(&self, room_id: Uuid) -> Result<Vec<MemoryRecord>> {
        let inner = self.inner.read().await;
        let mut out: Vec<MemoryRecord> = inner
            .records
            .values()
            .filter(|r| r.room_id == room_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn ensure_connection(&self, connection: &Connection) -> Result<()> {
        let mut inner = self.inner.write().await;
        let exists = inner
            .connections
            .iter()
            .any(|c| c.room_id == connection.room_id && c.user_id == connection.user_id);
        if exists {
            return Ok(());
        }
        inner.connections.push(connection.clone());
        self.flush(&inner).await
    }
}

/// Cache kept in process memory.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Cache that maps `a/b/c.txt` keys to files under a root directory.
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        if key.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("invalid cache key {key:?}");
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl Cache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, value)
            .await
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Content;
    use chrono::{Duration, Utc};

    fn record(id: Uuid, room: Uuid, text: &str, age_secs: i64) -> MemoryRecord {
        MemoryRecord {
            id,
            agent_id: Uuid::nil(),
            user_id: Uuid::nil(),
            room_id: room,
            content: Content::text(text),
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "social-agent-{name}-{}-{nanos}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let store = LocalStore::in_memory();
        let id = Uuid::from_u128(1);
        store.create(record(id, Uuid::nil(), "first", 0)).await.unwrap();
        store.create(record(id, Uuid::nil(), "second", 0)).await.unwrap();
        let got = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(got.content.text, "first");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn list_by_room_newest_first() {
        let store = LocalStore::in_memory();
        let room = Uuid::from_u128(9);
        store.create(record(Uuid::from_u128(1), room, "old", 300)).await.unwrap();
        store.create(record(Uuid::from_u128(2), room, "new", 10)).await.unwrap();
        store
            .create(record(Uuid::from_u128(3), Uuid::from_u128(8), "elsewhere", 0))
            .await
            .unwrap();
        let texts: Vec<String> = store
            .list_by_room(room)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.content.text)
            .collect();
        assert_eq!(texts, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = scratch_dir("store");
        let path = dir.join("memory.json");
        {
            let store = LocalStore::open(&path).await.unwrap();
            assert!(store.is_empty().await);
            store.create(record(Uuid::from_u128(5), Uuid::nil(), "kept", 0)).await.unwrap();
        }
        let reopened = LocalStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn file_cache_roundtrip_and_key_checks() {
        let dir = scratch_dir("cache");
        let cache = FileCache::new(&dir);
        assert_eq!(cache.get("twitter/mark").await.unwrap(), None);
        cache.set("twitter/mark", "200").await.unwrap();
        assert_eq!(cache.get("twitter/mark").await.unwrap().as_deref(), Some("200"));
        assert!(cache.set("../escape", "x").await.is_err());
        assert!(cache.set("/abs", "x").await.is_err());
        assert!(cache.set("", "x").await.is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
