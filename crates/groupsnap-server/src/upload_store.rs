//! On-disk storage for contributed photos and composed results.
//!
//! Everything for a session lives under `sessions/<session-id>/`:
//! contributions in a per-day sub-directory, the collage next to it. The
//! database stores only the relative file reference.

use std::path::{Component, Path, PathBuf};

use chrono::NaiveDate;
use groupsnap_shared::types::{SessionId, UserId};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;

/// Verify that a resolved path stays within the expected base directory.
/// Prevents path traversal attacks.
fn ensure_within(base: &Path, relative: &Path) -> Result<PathBuf, ServerError> {
    let mut resolved = base.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ServerError::BadRequest("Path traversal detected".to_string()));
            }
        }
    }
    if resolved == base || !resolved.starts_with(base) {
        return Err(ServerError::BadRequest("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

/// Image encodings accepted for contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoFormat {
    Png,
    Jpeg,
}

impl PhotoFormat {
    /// Sniff the format from the file header.
    pub fn detect(data: &[u8]) -> Option<Self> {
        match image::guess_format(data).ok()? {
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    base_path: PathBuf,
    max_size: usize,
}

impl UploadStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::Storage(format!(
                "Failed to create upload directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        let base_path = base_path.canonicalize().unwrap_or(base_path);
        info!(path = %base_path.display(), "Upload store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Check size and format of a contributed photo.
    pub fn validate_photo(&self, data: &[u8]) -> Result<PhotoFormat, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("Empty upload".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::UploadTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }
        PhotoFormat::detect(data).ok_or(ServerError::UnsupportedMedia)
    }

    /// Write a contributed photo and return its file reference.
    pub async fn store_contribution(
        &self,
        session: SessionId,
        contributor: UserId,
        day: NaiveDate,
        data: &[u8],
    ) -> Result<String, ServerError> {
        let format = self.validate_photo(data)?;
        let file_ref = format!(
            "sessions/{}/{}/{}-{}.{}",
            session,
            day.format("%Y-%m-%d"),
            contributor,
            Uuid::new_v4().simple(),
            format.extension()
        );
        self.write(&file_ref, data).await?;
        Ok(file_ref)
    }

    /// Write a composed collage and return its file reference.
    pub async fn store_result(&self, session: SessionId, jpeg: &[u8]) -> Result<String, ServerError> {
        let file_ref = format!("sessions/{}/result-{}.jpg", session, Uuid::new_v4().simple());
        self.write(&file_ref, jpeg).await?;
        Ok(file_ref)
    }

    pub async fn read(&self, file_ref: &str) -> Result<Vec<u8>, ServerError> {
        let path = self.resolve(file_ref)?;

        let data = fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ServerError::NotFound(format!("File {file_ref}")),
            _ => ServerError::Storage(format!("Failed to read {}: {}", file_ref, e)),
        })?;

        debug!(file = %file_ref, size = data.len(), "Read stored file");
        Ok(data)
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, file_ref: &str) -> Result<(), ServerError> {
        let path = self.resolve(file_ref)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(file = %file_ref, "Removed stored file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServerError::Storage(format!("Failed to delete {}: {}", file_ref, e))),
        }
    }

    /// Remove every file of a session.
    pub async fn remove_session(&self, session: SessionId) -> Result<(), ServerError> {
        let dir = self.resolve(&format!("sessions/{session}"))?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServerError::Storage(format!(
                "Failed to delete files of session {}: {}",
                session, e
            ))),
        }
    }

    async fn write(&self, file_ref: &str, data: &[u8]) -> Result<(), ServerError> {
        let path = self.resolve(file_ref)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ServerError::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        fs::write(&path, data)
            .await
            .map_err(|e| ServerError::Storage(format!("Failed to write {}: {}", file_ref, e)))?;

        debug!(file = %file_ref, size = data.len(), "Stored file");
        Ok(())
    }

    fn resolve(&self, file_ref: &str) -> Result<PathBuf, ServerError> {
        ensure_within(&self.base_path, Path::new(file_ref))
    }
}
