/// Durable key-value storage for client-side settings.
///
/// Two backends:
/// - `File`: a single JSON object file, one string value per key. The default.
/// - `Redis`: used when `REDIS_URL` is configured.
///
/// File writes go through a sibling temp file and a rename so a crash never leaves a
/// half-written object behind. Writers sharing a `FileStore` (and its clones) take turns on
/// the load-modify-save cycle.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::CommonError;
use crate::redis::RedisCache;

const STORE_FILE_NAME: &str = "credentials.json";

#[derive(Clone)]
pub enum KeyValueStore {
    File(FileStore),
    Redis(RedisCache),
}

impl KeyValueStore {
    /// Select a backend from the environment.
    ///
    /// Optional:
    /// - `REDIS_URL`: use Redis instead of the file backend
    /// - `NIPTUCK_STORE_PATH`: explicit path of the JSON store file
    pub fn from_env() -> Result<Self, CommonError> {
        if let Ok(url) = std::env::var("REDIS_URL") {
            return Ok(Self::Redis(RedisCache::new(&url)?));
        }
        let path = match std::env::var("NIPTUCK_STORE_PATH") {
            Ok(p) => PathBuf::from(p),
            Err(_) => default_store_path()?,
        };
        Ok(Self::File(FileStore::new(path)))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Redis(_) => "redis",
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::File(store) => store
                .get(key)
                .await
                .inspect_err(|e| warn!(error = %e, key, "store read failed"))
                .ok()
                .flatten(),
            Self::Redis(cache) => cache.get(key).await,
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), CommonError> {
        match self {
            Self::File(store) => store.set(key, value).await,
            Self::Redis(cache) => {
                if !cache.set(key, value).await {
                    warn!(key, "redis unavailable, value not persisted");
                }
                Ok(())
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), CommonError> {
        match self {
            Self::File(store) => store.delete(key).await,
            Self::Redis(cache) => {
                cache.delete(key).await;
                Ok(())
            }
        }
    }
}

fn default_store_path() -> Result<PathBuf, CommonError> {
    let dirs = directories::ProjectDirs::from("com", "NipTuck", "NipTuck")
        .ok_or(CommonError::NoDataDir)?;
    Ok(dirs.data_dir().join(STORE_FILE_NAME))
}

/// JSON object file holding string values.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CommonError> {
        let mut map = self.load().await?;
        Ok(map.remove(key))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), CommonError> {
        let _write = self.write_lock.lock().await;
        let mut map = self.load().await?;
        map.insert(key.to_string(), value.to_string());
        self.save(&map).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CommonError> {
        let _write = self.write_lock.lock().await;
        let mut map = self.load().await?;
        if map.remove(key).is_some() {
            self.save(&map).await?;
        }
        Ok(())
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, CommonError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(self.io_error(source)),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|source| CommonError::StoreFormat {
            path: self.path.display().to_string(),
            source,
        })
    }

    async fn save(&self, map: &BTreeMap<String, String>) -> Result<(), CommonError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.io_error(source))?;
        }
        let json = serde_json::to_string_pretty(map).map_err(|source| CommonError::StoreFormat {
            path: self.path.display().to_string(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| self.io_error(source))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| self.io_error(source))?;
        debug!(path = %self.path.display(), keys = map.len(), "store saved");
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> CommonError {
        CommonError::StoreIo {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("nested").join("store.json"));
        assert_eq!(store.get("geminiApiKey").await.expect("read"), None);
    }

    #[tokio::test]
    async fn set_then_get_survives_a_new_handle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("store.json");

        FileStore::new(&path)
            .set("geminiApiKey", "AIza-first")
            .await
            .expect("write");
        FileStore::new(&path)
            .set("other", "kept")
            .await
            .expect("write");

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get("geminiApiKey").await.expect("read").as_deref(),
            Some("AIza-first")
        );
        assert_eq!(reopened.get("other").await.expect("read").as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn delete_removes_only_that_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = KeyValueStore::File(FileStore::new(dir.path().join("store.json")));
        store.set("a", "1").await.expect("write");
        store.set("b", "2").await.expect("write");
        store.delete("a").await.expect("delete");
        assert_eq!(store.get("a").await, None);
        assert_eq!(store.get("b").await.as_deref(), Some("2"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_on_clones_keep_every_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("store.json"));

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.set(&format!("key{i}"), &format!("v{i}")).await })
            })
            .collect();
        for writer in writers {
            writer.await.expect("join").expect("write");
        }

        let reopened = FileStore::new(store.path());
        for i in 0..16 {
            assert_eq!(
                reopened.get(&format!("key{i}")).await.expect("read"),
                Some(format!("v{i}"))
            );
        }
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_format_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        std::fs::write(&path, "[1, 2, 3]").expect("seed");
        let err = FileStore::new(&path).get("k").await.unwrap_err();
        assert!(matches!(err, CommonError::StoreFormat { .. }));
    }
}
