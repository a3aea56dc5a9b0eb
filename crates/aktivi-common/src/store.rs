//! String-keyed JSON storage used for sessions, pending authorization
//! requests and handoff nonces.
//!
//! Two scopes exist in practice: a durable store that survives restarts and a
//! page-session store that lives as long as one browsing context. Both are
//! just [`KeyValueStore`] instances; which one a caller gets is decided by
//! whoever wires the components together.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Errors emitted by key-value stores.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum StoreError {
    /// Filesystem or I/O error
    #[error("I/O error: {0}")]
    #[diagnostic(code(aktivi::store::io))]
    Io(#[from] std::io::Error),
    /// Serialization error (e.g., JSON)
    #[error("serialization error: {0}")]
    #[diagnostic(code(aktivi::store::serde))]
    Serde(#[from] serde_json::Error),
    /// Any other error from a backend implementation
    #[error(transparent)]
    #[diagnostic(code(aktivi::store::other))]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

/// Pluggable storage for JSON records under string keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value under `key`, if present.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    /// Write `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    /// Remove `key`. Removing an absent key is not an error.
    async fn del(&self, key: &str) -> Result<(), StoreError>;
    /// Keys starting with `prefix`, in no particular order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Read and remove in one step.
    ///
    /// The default implementation is not atomic across processes; in-memory
    /// stores override it to hold the lock for both halves.
    async fn take(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.del(key).await?;
        }
        Ok(value)
    }
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.as_ref().get(key).await
    }
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.as_ref().set(key, value).await
    }
    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.as_ref().del(key).await
    }
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.as_ref().keys_with_prefix(prefix).await
    }
    async fn take(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.as_ref().take(key).await
    }
}

/// Read `key` and decode it as `T`.
///
/// A value that no longer decodes is reported as a serde error rather than
/// silently treated as absent.
pub async fn get_json<T, S>(store: &S, key: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encode `value` and write it under `key`.
pub async fn set_json<T, S>(store: &S, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    store.set(key, serde_json::to_value(value)?).await
}

/// In-memory store suitable for page-session scope and tests.
#[derive(Clone, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<String, Value>>>);

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.0.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.0.read().await.is_empty()
    }

    /// Snapshot of all keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.0.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.0.read().await.get(key).cloned())
    }
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.0.write().await.insert(key.to_string(), value);
        Ok(())
    }
    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.0.write().await.remove(key);
        Ok(())
    }
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .0
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
    async fn take(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.0.write().await.remove(key))
    }
}

/// File-backed store holding every key in one JSON object.
///
/// Not encrypted; tokens are written in the clear. Fine for a CLI on a
/// single-user machine, not for anything shared. A missing file reads as
/// empty; writes go to a sibling `.tmp` file which is then renamed over the
/// store, so a crash mid-write leaves the previous contents intact.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Debug)]
pub struct FileStore {
    /// Path to the JSON file.
    pub path: PathBuf,
    lock: Arc<RwLock<()>>,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStore {
    /// Store backed by the file at `path`. Nothing is touched on disk until
    /// the first write.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Arc::new(RwLock::new(())),
        }
    }

    async fn read_all(&self) -> Result<serde_json::Map<String, Value>, StoreError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(serde_json::Map::new());
            }
            Err(e) => return Err(e.into()),
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Map::new());
        }
        match serde_json::from_slice(&data)? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::Other("store file is not a JSON object".into())),
        }
    }

    async fn write_all(&self, map: &serde_json::Map<String, Value>) -> Result<(), StoreError> {
        let buf = serde_json::to_vec_pretty(map)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &buf).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        #[cfg(feature = "tracing")]
        tracing::trace!(path = %self.path.display(), keys = map.len(), "file store written");
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.read().await;
        Ok(self.read_all().await?.get(key).cloned())
    }
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        let mut map = self.read_all().await?;
        map.insert(key.to_string(), value);
        self.write_all(&map).await
    }
    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        let mut map = self.read_all().await?;
        if map.remove(key).is_some() {
            self.write_all(&map).await?;
        }
        Ok(())
    }
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.read().await;
        Ok(self
            .read_all()
            .await?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
    async fn take(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.write().await;
        let mut map = self.read_all().await?;
        let value = map.remove(key);
        if value.is_some() {
            self.write_all(&map).await?;
        }
        Ok(value)
    }
}
