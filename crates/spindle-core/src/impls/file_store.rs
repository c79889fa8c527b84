//! JsonFileStore - JSON ファイルによる StateStore
//!
//! key は `root` からの相対パスです（例: `TASK_QUEUE.vf.json`, `themes/a/queue.json`）。
//! 書き込みは一時ファイル + rename で行い、読み手が書きかけのファイルを見ないようにします。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::StoreError;
use crate::ports::StateStore;

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` under `root`. Absolute keys and `..` segments are rejected.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if key.is_empty() || escapes {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.path_for(key)?;
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "queue document not found");
                return Ok(None);
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let document = serde_json::from_str(&contents).map_err(|source| StoreError::Malformed {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(document))
    }

    async fn write(&self, key: &str, document: &serde_json::Value) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let json = serde_json::to_string_pretty(document).map_err(|source| {
            StoreError::Malformed {
                key: key.to_string(),
                source,
            }
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json)
            .await
            .map_err(|source| StoreError::Write {
                path: tmp.clone(),
                source,
            })?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "queue document written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_and_read_back() {
        let temp_dir = tempdir().unwrap();
        let store = JsonFileStore::new(temp_dir.path());

        let doc = serde_json::json!({"workingItem": null, "queues": {"high": {"items": []}}});
        store.write("TASK_QUEUE.vf.json", &doc).await.unwrap();

        let loaded = store.read("TASK_QUEUE.vf.json").await.unwrap();
        assert_eq!(loaded, Some(doc));
        assert!(!temp_dir.path().join("TASK_QUEUE.vf.json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_file_is_absent() {
        let temp_dir = tempdir().unwrap();
        let store = JsonFileStore::new(temp_dir.path());

        assert!(store.read("nonexistent.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let temp_dir = tempdir().unwrap();
        std::fs::write(temp_dir.path().join("broken.json"), "{ not json").unwrap();
        let store = JsonFileStore::new(temp_dir.path());

        let err = store.read("broken.json").await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let temp_dir = tempdir().unwrap();
        let store = JsonFileStore::new(temp_dir.path());

        store
            .write("nested/dir/queue.json", &serde_json::json!({}))
            .await
            .unwrap();
        assert!(temp_dir.path().join("nested/dir/queue.json").exists());
    }

    #[test]
    fn rejects_keys_outside_root() {
        let store = JsonFileStore::new("/tmp/spindle");
        assert!(matches!(
            store.path_for("../escape.json"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            store.path_for("/etc/passwd"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(store.path_for("themes/a/queue.json").is_ok());
    }
}
