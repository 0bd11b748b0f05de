//! Offline payload update.
//!
//! The one supported way to change the payload of a built image without a
//! full rebuild: mount the image from outside the guest, overwrite the
//! payload entry in place, unmount.

use std::path::Path;

use tradebox_shared::layout;
use tradebox_shared::{TradeboxError, TradeboxResult};

use crate::disk::ext4::{mount_loop, unmount};

/// Overwrite the payload entry of `image` with `artifact`.
pub fn patch_payload(image: &Path, artifact: &Path) -> TradeboxResult<()> {
    if !image.is_file() {
        return Err(TradeboxError::Storage(format!(
            "image not found: {}",
            image.display()
        )));
    }
    if !artifact.is_file() {
        return Err(TradeboxError::Storage(format!(
            "payload artifact not found: {}",
            artifact.display()
        )));
    }

    let mount_dir = tempfile::Builder::new()
        .prefix("tradebox-patch-")
        .tempdir()
        .map_err(|e| {
            TradeboxError::Population(format!("failed to create mount point: {}", e))
        })?;

    mount_loop(image, mount_dir.path())?;

    let patched = overwrite_entry(artifact, mount_dir.path());

    if patched.is_err() {
        if let Err(e) = unmount(mount_dir.path()) {
            tracing::warn!("Unmount after failed patch also failed: {}", e);
        }
        return patched;
    }

    unmount(mount_dir.path())?;
    tracing::info!(
        "Patched payload entry in {} from {}",
        image.display(),
        artifact.display()
    );
    Ok(())
}

/// Overwrite the well-known payload entry inside the mounted image. The
/// entry must already exist - patching cannot introduce a payload into an
/// image that was built without one.
fn overwrite_entry(artifact: &Path, mount_point: &Path) -> TradeboxResult<()> {
    let entry = mount_point.join(layout::PAYLOAD_ENTRY.trim_start_matches('/'));
    if !entry.is_file() {
        return Err(TradeboxError::Population(format!(
            "image does not contain the payload entry {}",
            layout::PAYLOAD_ENTRY
        )));
    }

    std::fs::copy(artifact, &entry).map_err(|e| {
        TradeboxError::Population(format!(
            "failed to overwrite payload entry {}: {}",
            entry.display(),
            e
        ))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_image_is_rejected_before_mounting() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("main.py");
        std::fs::write(&artifact, "pass\n").unwrap();

        let err = patch_payload(&dir.path().join("nope.ext4"), &artifact).unwrap_err();
        assert!(matches!(err, TradeboxError::Storage(_)));
    }

    #[test]
    fn missing_artifact_is_rejected_before_mounting() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("rootfs.ext4");
        std::fs::write(&image, b"not really an image").unwrap();

        let err = patch_payload(&image, &dir.path().join("nope.py")).unwrap_err();
        assert!(matches!(err, TradeboxError::Storage(_)));
    }
}
