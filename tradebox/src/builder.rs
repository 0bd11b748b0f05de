//! Build orchestration.

use std::path::{Path, PathBuf};

use tradebox_shared::{TradeboxError, TradeboxResult};

use crate::disk::{self, PendingImage};
use crate::plan::ImagePlan;
use crate::rootfs;

/// Produces one bootable disk image from a plan.
///
/// Every step blocks and runs in strict order: stage, capacity check,
/// allocate, format, populate, commit. A failure at any step leaves nothing
/// at the output path - the in-progress backing file lives at a temporary
/// path guarded by [`PendingImage`] until the final rename.
pub struct ImageBuilder {
    plan: ImagePlan,
}

impl ImageBuilder {
    pub fn new(plan: ImagePlan) -> Self {
        Self { plan }
    }

    /// Run the full pipeline, returning the committed image path.
    pub fn build(&self, output: &Path) -> TradeboxResult<PathBuf> {
        self.plan.validate()?;

        let capacity = self.plan.capacity_bytes();
        tracing::info!(
            "Building image: {} ({} MiB capacity)",
            output.display(),
            self.plan.capacity_mib
        );

        let stage_dir = tempfile::Builder::new()
            .prefix("tradebox-stage-")
            .tempdir()
            .map_err(|e| {
                TradeboxError::Storage(format!("failed to create staging directory: {}", e))
            })?;

        rootfs::stage(&self.plan, stage_dir.path())?;

        let content = disk::estimate_tree_size(stage_dir.path())?;
        if content > capacity {
            return Err(TradeboxError::CapacityExceeded { content, capacity });
        }
        tracing::debug!(
            "Capacity check passed: {} of {} bytes",
            content,
            capacity
        );

        let pending = PendingImage::allocate(output, capacity)?;
        disk::format(pending.path())?;
        disk::populate(pending.path(), stage_dir.path())?;

        let committed = pending.commit(output)?;
        tracing::info!("✅ Image build complete: {}", committed.display());
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn plan_with_payload_size(dir: &Path, capacity_mib: u64, payload_bytes: usize) -> ImagePlan {
        let entry = dir.join("main.py");
        let init = dir.join("tradebox-init");
        fs::write(&entry, vec![b'#'; payload_bytes]).unwrap();
        fs::write(&init, b"\x7fELF").unwrap();

        ImagePlan {
            capacity_mib,
            base_rootfs: None,
            packages: Vec::new(),
            requirements: None,
            payload: vec![entry],
            data_dir: None,
            init_binary: init,
            cache_dir: None,
        }
    }

    #[test]
    fn oversized_content_fails_with_capacity_exceeded() {
        let dir = TempDir::new().unwrap();
        // 3 MiB of payload against a 1 MiB image.
        let plan = plan_with_payload_size(dir.path(), 1, 3 * 1024 * 1024);
        let output = dir.path().join("rootfs.ext4");

        let err = ImageBuilder::new(plan).build(&output).unwrap_err();
        match err {
            TradeboxError::CapacityExceeded { content, capacity } => {
                assert!(content > capacity);
                assert_eq!(capacity, 1024 * 1024);
            }
            other => panic!("expected CapacityExceeded, got {other:?}"),
        }
    }

    #[test]
    fn failed_build_leaves_no_artifact() {
        let dir = TempDir::new().unwrap();
        let plan = plan_with_payload_size(dir.path(), 1, 3 * 1024 * 1024);
        let output = dir.path().join("rootfs.ext4");

        let _ = ImageBuilder::new(plan).build(&output);

        assert!(!output.exists());
        let partial = dir.path().join("rootfs.ext4.partial");
        assert!(!partial.exists());
    }

    #[test]
    fn invalid_plan_fails_before_any_io() {
        let dir = TempDir::new().unwrap();
        let mut plan = plan_with_payload_size(dir.path(), 1024, 16);
        plan.payload.clear();
        let output = dir.path().join("rootfs.ext4");

        assert!(matches!(
            ImageBuilder::new(plan).build(&output),
            Err(TradeboxError::Config(_))
        ));
        assert!(!output.exists());
    }
}
