//! Upload directory access with path containment
//!
//! Every filename coming from a URL goes through [`UploadDir::resolve`]
//! before touching the filesystem: it must be a single plain path segment,
//! and once resolved it must still live under the upload directory after
//! symlinks are followed.

use chrono::{DateTime, Utc};
use qms_common::time;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::file_types;
use crate::sanitize;

/// URL prefix the stored files are served under
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Prefix of in-flight upload files; never listed or served
const TEMP_PREFIX: &str = ".upload-";

/// Upload descriptor, as returned to the client and stored on records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileDescriptor {
    /// Stored filename (unique, includes the timestamp suffix)
    pub id: String,
    /// Original filename as the user knows it
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Public URL path of the file
    pub path: String,
    #[serde(rename = "uploadTime")]
    pub upload_time: String,
}

/// The directory uploads are written to and served from
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a URL filename to a path inside the directory
    ///
    /// Anything other than one plain segment (`..`, absolute paths,
    /// separators) is forbidden.
    pub fn resolve(&self, filename: &str) -> ApiResult<PathBuf> {
        let forbidden = || ApiError::Forbidden(format!("Access denied: {}", filename));

        if filename.is_empty() || filename.contains('\\') {
            return Err(forbidden());
        }
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(segment)), None) if segment == filename => {
                Ok(self.root.join(filename))
            }
            _ => Err(forbidden()),
        }
    }

    /// Resolve a filename that must exist as a regular file
    pub async fn existing(&self, filename: &str) -> ApiResult<PathBuf> {
        let path = self.resolve(filename)?;
        let not_found = || ApiError::NotFound(format!("File not found: {}", filename));

        if filename.starts_with('.') {
            return Err(not_found());
        }
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(not_found());
        }

        // A symlink planted in the directory must not lead outside it
        let canonical = tokio::fs::canonicalize(&path).await?;
        let root = tokio::fs::canonicalize(&self.root).await?;
        if !canonical.starts_with(&root) {
            return Err(ApiError::Forbidden(format!("Access denied: {}", filename)));
        }
        Ok(path)
    }

    /// Descriptor for a stored file
    pub async fn describe(&self, filename: &str) -> ApiResult<FileDescriptor> {
        let path = self.existing(filename).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| time::now());

        Ok(FileDescriptor {
            id: filename.to_string(),
            name: sanitize::original_name(filename),
            size: metadata.len(),
            mime_type: file_types::mime_for_name(filename).to_string(),
            path: public_path(filename),
            upload_time: time::to_rfc3339(modified),
        })
    }

    /// All stored files, newest first
    pub async fn list(&self) -> ApiResult<Vec<FileDescriptor>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match self.describe(&name).await {
                Ok(descriptor) => files.push(descriptor),
                // Directories and dangling links are skipped
                Err(ApiError::NotFound(_)) | Err(ApiError::Forbidden(_)) => {
                    debug!("Skipping {} in upload directory", name)
                }
                Err(e) => return Err(e),
            }
        }

        files.sort_by(|a, b| {
            b.upload_time
                .cmp(&a.upload_time)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(files)
    }

    /// Remove a stored file
    pub async fn delete(&self, filename: &str) -> ApiResult<()> {
        let path = self.existing(filename).await?;
        tokio::fs::remove_file(&path).await?;
        info!("Deleted upload {}", filename);
        Ok(())
    }

    /// Fresh path for an upload in progress
    pub fn temp_path(&self) -> PathBuf {
        self.root
            .join(format!("{}{}.tmp", TEMP_PREFIX, uuid::Uuid::new_v4()))
    }

    /// Move a finished upload into place under a unique stored name
    ///
    /// The name is claimed with a hard link, which fails if the target
    /// exists, so two uploads racing for the same name never overwrite each
    /// other. The timestamp suffix is bumped while the name is taken.
    pub async fn persist(&self, temp: &Path, stem: &str, ext: Option<&str>) -> ApiResult<String> {
        let mut millis = time::epoch_millis();
        loop {
            let stored = sanitize::with_suffix(stem, ext, millis);
            let target = self.root.join(&stored);
            match tokio::fs::hard_link(temp, &target).await {
                Ok(()) => {
                    if let Err(e) = tokio::fs::remove_file(temp).await {
                        warn!("Failed to remove temp upload {}: {}", temp.display(), e);
                    }
                    return Ok(stored);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => millis += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Public URL path for a stored filename
pub fn public_path(filename: &str) -> String {
    format!("{}/{}", PUBLIC_PREFIX, filename)
}
