//! Backing file lifecycle.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tradebox_shared::{TradeboxError, TradeboxResult};

/// A backing file that is not yet a valid image.
///
/// Created at a temporary path next to the final output; deleted on drop
/// unless [`commit`](PendingImage::commit) renamed it into place. This is
/// what makes a build atomic from the caller's perspective: the output path
/// only ever holds a fully populated image.
pub struct PendingImage {
    path: PathBuf,
    committed: bool,
}

impl PendingImage {
    /// Allocate a zero-filled backing file of exactly `capacity` bytes at a
    /// temporary path derived from `dest`. Sparse allocation is fine; the
    /// capacity invariant is enforced by the size estimate upstream.
    pub fn allocate(dest: &Path, capacity: u64) -> TradeboxResult<Self> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TradeboxError::Storage(format!(
                        "failed to create output directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let path = PathBuf::from(format!("{}.partial", dest.display()));

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                TradeboxError::Storage(format!(
                    "failed to create backing file {}: {}",
                    path.display(),
                    e
                ))
            })?;

        file.set_len(capacity).map_err(|e| {
            TradeboxError::Storage(format!(
                "failed to allocate {} bytes for {}: {}",
                capacity,
                path.display(),
                e
            ))
        })?;

        tracing::debug!(
            "Allocated backing file: {} ({} bytes)",
            path.display(),
            capacity
        );

        Ok(Self {
            path,
            committed: false,
        })
    }

    /// Path of the in-progress backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the backing file to `dest` and disarm cleanup.
    pub fn commit(mut self, dest: &Path) -> TradeboxResult<PathBuf> {
        std::fs::rename(&self.path, dest).map_err(|e| {
            TradeboxError::Storage(format!(
                "failed to move image into place at {}: {}",
                dest.display(),
                e
            ))
        })?;
        self.committed = true;
        tracing::info!("Image committed: {}", dest.display());
        Ok(dest.to_path_buf())
    }
}

impl Drop for PendingImage {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(
                    "Failed to clean up partial image {}: {}",
                    self.path.display(),
                    e
                );
            } else {
                tracing::debug!("Cleaned up partial image: {}", self.path.display());
            }
        }
    }
}
