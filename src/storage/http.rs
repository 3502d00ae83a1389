use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{encode_object_path, validate_object_path, ObjectStore};
use crate::error::StorageError;

/// Object store on a remote chore-sync server (`/proofs` and `/proof-urls`).
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct UrlResponse {
    url: String,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

async fn error_from_response(response: reqwest::Response, path: &str) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => StorageError::NotFound(path.to_string()),
        StatusCode::CONFLICT => StorageError::AlreadyExists(path.to_string()),
        StatusCode::BAD_REQUEST => StorageError::InvalidPath(path.to_string()),
        _ => StorageError::Upload(format!("{}: {}", status, body)),
    }
}

impl ObjectStore for HttpObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        validate_object_path(path)?;
        let response = self
            .client
            .put(format!("{}/proofs/{}", self.base_url, encode_object_path(path)))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, path).await);
        }
        Ok(())
    }

    async fn url(&self, path: &str) -> Result<String, StorageError> {
        validate_object_path(path)?;
        let response = self
            .client
            .get(format!(
                "{}/proof-urls/{}",
                self.base_url,
                encode_object_path(path)
            ))
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, path).await);
        }
        let body: UrlResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Upload(format!("unreadable URL response: {e}")))?;
        Ok(body.url)
    }
}
