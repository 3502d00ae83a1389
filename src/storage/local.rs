use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{encode_object_path, validate_object_path, ObjectStore};
use crate::error::StorageError;

const META_SUFFIX: &str = ".meta.json";

/// Object store on the local filesystem.
///
/// Each object is a file under `root`, with its content type kept in a
/// `.meta.json` sidecar. Retrieval URLs are `{base_url}/{path}` with each
/// path segment percent-encoded.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
}

/// An object read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    content_type: String,
    size_bytes: usize,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_file(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_object_path(path)?;
        if path.ends_with(META_SUFFIX) {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(path))
    }

    fn meta_file(file: &Path) -> PathBuf {
        let mut name = file.as_os_str().to_owned();
        name.push(META_SUFFIX);
        PathBuf::from(name)
    }

    pub async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let file = self.object_file(path)?;
        Ok(fs::try_exists(&file).await.unwrap_or(false))
    }

    /// Read an object and its content type.
    pub async fn get(&self, path: &str) -> Result<StoredObject, StorageError> {
        let file = self.object_file(path)?;
        let bytes = match fs::read(&file).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => return Err(StorageError::Upload(e.to_string())),
        };

        let content_type = match fs::read_to_string(Self::meta_file(&file)).await {
            Ok(raw) => serde_json::from_str::<ObjectMeta>(&raw)
                .map(|meta| meta.content_type)
                .unwrap_or_else(|_| "application/octet-stream".to_string()),
            Err(_) => "application/octet-stream".to_string(),
        };

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }
}

impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let file = self.object_file(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Upload(e.to_string()))?;
        }

        let mut handle = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file)
            .await
        {
            Ok(handle) => handle,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(path.to_string()))
            }
            Err(e) => return Err(StorageError::Upload(e.to_string())),
        };

        handle
            .write_all(&bytes)
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;
        handle
            .flush()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        let meta = ObjectMeta {
            content_type: content_type.to_string(),
            size_bytes: bytes.len(),
        };
        let meta = serde_json::to_vec(&meta).map_err(|e| StorageError::Upload(e.to_string()))?;
        fs::write(Self::meta_file(&file), meta)
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        tracing::debug!(path = %path, size = bytes.len(), "Stored object");
        Ok(())
    }

    async fn url(&self, path: &str) -> Result<String, StorageError> {
        if !self.exists(path).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(format!("{}/{}", self.base_url, encode_object_path(path)))
    }
}
