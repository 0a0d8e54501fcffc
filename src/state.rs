//! User state
//!
//! The key-value store shared with the settings collaborator, and the typed
//! records read from it: own posts, last-seen posts per thread and the stored
//! settings object. Values are JSON so both sides agree on the layout.

use crate::error::StateError;
use crate::model::PostKey;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const OWN_POSTS_KEY: &str = "yourPosts";
pub const LAST_SEEN_KEY: &str = "lastSeenPosts";
pub const SETTINGS_KEY: &str = "settings";

/// Async key-value store holding JSON values.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StateError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StateError>;
    async fn remove(&self, key: &str) -> Result<(), StateError>;
}

/// In-process store, used by tests and one-shot commands.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StateError> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StateError> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// Sled-backed store
pub struct SledStateStore {
    db: sled::Db,
}

impl SledStateStore {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StateError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StateError> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        let bytes = serde_json::to_vec(&value)?;
        self.db.insert(key.as_bytes(), bytes)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StateError> {
        self.db.remove(key.as_bytes())?;
        self.db.flush_async().await?;
        Ok(())
    }
}

/// Typed view over a [`StateStore`].
///
/// Read-modify-write updates are serialized so two toggles never lose each
/// other's change.
#[derive(Clone)]
pub struct UserState {
    store: Arc<dyn StateStore>,
    write_lock: Arc<Mutex<()>>,
}

impl UserState {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStateStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Posts marked as written by the user.
    pub async fn own_posts(&self) -> Result<BTreeSet<PostKey>, StateError> {
        let value = self.store.get(OWN_POSTS_KEY).await?;
        Ok(parse_own_posts(value.as_ref()))
    }

    pub async fn is_own(&self, key: &PostKey) -> Result<bool, StateError> {
        Ok(self.own_posts().await?.contains(key))
    }

    /// Flip the own-post mark. Returns whether the post is now marked.
    pub async fn toggle_own_post(&self, key: &PostKey) -> Result<bool, StateError> {
        let _guard = self.write_lock.lock().await;
        let mut posts = self.own_posts().await?;
        let marked = if posts.remove(key) {
            false
        } else {
            posts.insert(key.clone());
            true
        };
        let value = Value::Array(posts.iter().map(|k| Value::String(k.to_string())).collect());
        self.store.set(OWN_POSTS_KEY, value).await?;
        debug!(post = %key, marked, "Toggled own post");
        Ok(marked)
    }

    /// Highest post id seen in `board/thread`.
    pub async fn last_seen(&self, board: &str, thread: &str) -> Result<Option<u64>, StateError> {
        let value = self.store.get(LAST_SEEN_KEY).await?;
        Ok(value
            .as_ref()
            .and_then(|v| v.get(thread_key(board, thread)))
            .and_then(as_u64))
    }

    /// Record `post_id` as seen. The stored value only ever grows; returns the
    /// value in effect afterwards.
    pub async fn mark_seen(&self, board: &str, thread: &str, post_id: u64) -> Result<u64, StateError> {
        let _guard = self.write_lock.lock().await;
        let mut map = match self.store.get(LAST_SEEN_KEY).await? {
            Some(Value::Object(map)) => map,
            Some(other) => {
                warn!(found = %other, "Replacing malformed last-seen record");
                Map::new()
            }
            None => Map::new(),
        };
        let key = thread_key(board, thread);
        let current = map.get(&key).and_then(as_u64).unwrap_or(0);
        let newest = current.max(post_id);
        if newest != current || !map.contains_key(&key) {
            map.insert(key, Value::from(newest));
            self.store.set(LAST_SEEN_KEY, Value::Object(map)).await?;
        }
        Ok(newest)
    }

    /// Raw settings object written by the settings collaborator.
    pub async fn stored_settings(&self) -> Result<Option<Value>, StateError> {
        self.store.get(SETTINGS_KEY).await
    }
}

fn thread_key(board: &str, thread: &str) -> String {
    format!("{}:{}", board, thread)
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Accepts the list form and the older `{ "board:id": true }` object form.
fn parse_own_posts(value: Option<&Value>) -> BTreeSet<PostKey> {
    let keys: Vec<&str> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, v)| v.as_bool().unwrap_or(true))
            .map(|(k, _)| k.as_str())
            .collect(),
        _ => Vec::new(),
    };
    keys.into_iter()
        .filter_map(|k| {
            let parsed = PostKey::parse(k);
            if parsed.is_none() {
                warn!(entry = k, "Skipping malformed own-post entry");
            }
            parsed
        })
        .collect()
}
