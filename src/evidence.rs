//! Photo evidence acquisition.
//!
//! The platform side of the proof pipeline: asking for access to the photo
//! library and letting the member pick (or decline to pick) an image.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// An image chosen as proof. Bytes are read lazily, during upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub file_name: String,
    pub content_type: String,
    source: AssetSource,
}

#[derive(Debug, Clone, PartialEq)]
enum AssetSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl ImageAsset {
    pub fn from_bytes(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            source: AssetSource::Bytes(bytes),
        }
    }

    /// An asset backed by a file. The content type is guessed from the
    /// extension and falls back to JPEG, the usual camera format.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let content_type = mime_guess::from_path(&path)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "image/jpeg".to_string());
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            file_name,
            content_type,
            source: AssetSource::File(path),
        }
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            AssetSource::Bytes(bytes) => Ok(bytes.clone()),
            AssetSource::File(path) => tokio::fs::read(path).await,
        }
    }
}

pub trait EvidenceSource: Send + Sync {
    fn request_permission(&self) -> impl Future<Output = PermissionStatus> + Send;

    /// The chosen image, or `None` when the member cancels.
    fn pick_image(&self) -> impl Future<Output = Option<ImageAsset>> + Send;
}

/// Evidence from the local filesystem, for the command line.
///
/// With a preset path the image is picked without asking; otherwise the
/// member is prompted for a path on stderr and an empty answer cancels.
#[derive(Debug, Clone)]
pub struct FileEvidenceSource {
    preset: Option<PathBuf>,
}

impl FileEvidenceSource {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            preset: Some(path.into()),
        }
    }

    pub fn interactive() -> Self {
        Self { preset: None }
    }
}

async fn readable(path: &Path) -> PermissionStatus {
    match tokio::fs::File::open(path).await {
        Err(e) if e.kind() == ErrorKind::PermissionDenied => PermissionStatus::Denied,
        _ => PermissionStatus::Granted,
    }
}

impl EvidenceSource for FileEvidenceSource {
    async fn request_permission(&self) -> PermissionStatus {
        match &self.preset {
            Some(path) => readable(path).await,
            None => PermissionStatus::Granted,
        }
    }

    async fn pick_image(&self) -> Option<ImageAsset> {
        if let Some(path) = &self.preset {
            return Some(ImageAsset::from_file(path));
        }

        let mut stderr = tokio::io::stderr();
        let prompt = async {
            stderr
                .write_all(b"Path to proof photo (leave empty to cancel): ")
                .await?;
            stderr.flush().await
        };
        if let Err(e) = prompt.await {
            tracing::warn!(error = %e, "Failed to show the photo prompt");
        }

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(0) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read the photo path");
                None
            }
            Ok(_) => {
                let answer = line.trim();
                if answer.is_empty() {
                    None
                } else {
                    Some(ImageAsset::from_file(answer))
                }
            }
        }
    }
}
