//! Ext4 formatting and population.
//!
//! The backing file is formatted with `mkfs.ext4` and populated through a
//! temporary loop mount. Population failures clean up the mount point; the
//! partial backing file itself is cleaned up by its `PendingImage` guard.

use std::path::Path;
use std::process::Command;

use tradebox_shared::{TradeboxError, TradeboxResult};
use walkdir::WalkDir;

use super::constants::{BLOCK_SIZE, INODE_SIZE};
use crate::util;

/// Estimate the on-disk footprint of a staged tree on ext4.
///
/// Counts file content rounded up to 4 KiB blocks, one block per directory,
/// and inode overhead per entry. Deliberately ignores journal and superblock
/// overhead: the estimate gates the declared capacity against content size,
/// and a tree that passes here but trips metadata overhead still fails
/// cleanly at the populate step.
pub fn estimate_tree_size(tree: &Path) -> TradeboxResult<u64> {
    let mut blocks = 0u64;
    let mut entries = 0u64;

    for entry in WalkDir::new(tree).follow_links(false) {
        let entry = entry.map_err(|e| {
            TradeboxError::Storage(format!(
                "failed to walk staged tree {}: {}",
                tree.display(),
                e
            ))
        })?;

        entries += 1;

        if let Ok(meta) = entry.metadata() {
            if meta.is_file() {
                blocks += meta.len().div_ceil(BLOCK_SIZE).max(1);
            } else if meta.is_dir() {
                blocks += 1;
            }
        }
    }

    Ok(blocks * BLOCK_SIZE + entries * INODE_SIZE)
}

/// Format the backing file as ext4.
pub fn format(image: &Path) -> TradeboxResult<()> {
    let mkfs = util::find_binary("mkfs.ext4")
        .map_err(|e| TradeboxError::Format(e.to_string()))?;

    tracing::info!("Formatting image as ext4: {}", image.display());

    // -F: don't prompt about formatting a regular file
    // -q: quiet
    let output = Command::new(&mkfs)
        .arg("-F")
        .arg("-q")
        .arg(image)
        .output()
        .map_err(|e| {
            TradeboxError::Format(format!("failed to run {}: {}", mkfs.display(), e))
        })?;

    if !output.status.success() {
        return Err(TradeboxError::Format(format!(
            "mkfs.ext4 failed with exit code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(())
}

/// Copy the staged tree into the formatted image via a temporary loop mount.
///
/// Sequence: mount, copy, unmount. A copy failure still unmounts
/// (best-effort) before reporting; an unmount failure after a clean copy is
/// reported too, since the image cannot be declared complete while a stale
/// mount may hold unflushed writes.
pub fn populate(image: &Path, tree: &Path) -> TradeboxResult<()> {
    let mount_dir = tempfile::Builder::new()
        .prefix("tradebox-mnt-")
        .tempdir()
        .map_err(|e| {
            TradeboxError::Population(format!("failed to create mount point: {}", e))
        })?;

    mount_loop(image, mount_dir.path())?;
    tracing::info!(
        "Populating image from staged tree: {} → {}",
        tree.display(),
        mount_dir.path().display()
    );

    let copied = copy_tree(tree, mount_dir.path());

    if copied.is_err() {
        // Report the copy failure; the unmount is just mount-point hygiene.
        if let Err(e) = unmount(mount_dir.path()) {
            tracing::warn!("Unmount after failed copy also failed: {}", e);
        }
        return copied;
    }

    unmount(mount_dir.path())
}

/// Loop-mount `image` at `mount_point`.
pub(crate) fn mount_loop(image: &Path, mount_point: &Path) -> TradeboxResult<()> {
    let output = Command::new("mount")
        .args(["-o", "loop"])
        .arg(image)
        .arg(mount_point)
        .output()
        .map_err(|e| TradeboxError::Population(format!("failed to run mount: {}", e)))?;

    if !output.status.success() {
        return Err(TradeboxError::Population(format!(
            "mount of {} at {} failed: {}",
            image.display(),
            mount_point.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}

/// Unmount a previously mounted image.
pub(crate) fn unmount(mount_point: &Path) -> TradeboxResult<()> {
    let output = Command::new("umount")
        .arg(mount_point)
        .output()
        .map_err(|e| TradeboxError::Population(format!("failed to run umount: {}", e)))?;

    if !output.status.success() {
        return Err(TradeboxError::Population(format!(
            "umount of {} failed: {}",
            mount_point.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}

/// Copy the staged tree into the mounted filesystem with full metadata
/// preservation.
fn copy_tree(tree: &Path, mount_point: &Path) -> TradeboxResult<()> {
    let output = Command::new("cp")
        .args(["-a", "--"])
        .arg(format!("{}/.", tree.display()))
        .arg(mount_point)
        .output()
        .map_err(|e| TradeboxError::Population(format!("failed to run cp: {}", e)))?;

    if !output.status.success() {
        return Err(TradeboxError::Population(format!(
            "copy into image failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn estimate_counts_block_rounded_content() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("one-byte"), b"x").unwrap();

        let size = estimate_tree_size(dir.path()).unwrap();
        // root dir block + one file block + two inodes
        assert_eq!(size, 2 * BLOCK_SIZE + 2 * INODE_SIZE);
    }

    #[test]
    fn estimate_grows_with_content() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("big"), vec![0u8; (BLOCK_SIZE * 3) as usize + 1]).unwrap();

        let size = estimate_tree_size(dir.path()).unwrap();
        assert!(size >= BLOCK_SIZE * 4);
    }

    #[test]
    fn estimate_counts_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();

        let size = estimate_tree_size(dir.path()).unwrap();
        assert_eq!(size, 4 * BLOCK_SIZE + 4 * INODE_SIZE);
    }
}
