//! Layer materialization into the staging directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;

use tradebox_shared::layout;
use tradebox_shared::{TradeboxError, TradeboxResult};

use super::vendor;
use crate::plan::ImagePlan;

/// Default cache directory for resolved runtime dependencies, relative to
/// the working directory when the plan does not name one.
const DEFAULT_CACHE_DIR: &str = "dep-cache";

/// Materialize the plan's layers into `dest`.
///
/// Layers apply in declaration order; a later layer overwrites an earlier
/// one at the same path. After all layers, the staged tree is checked for
/// the two well-known entries every image must carry.
pub fn stage(plan: &ImagePlan, dest: &Path) -> TradeboxResult<()> {
    if let Some(base) = &plan.base_rootfs {
        extract_base(base, dest)?;
    }

    if !plan.packages.is_empty() {
        install_packages(&plan.packages, dest)?;
    }

    if let Some(requirements) = &plan.requirements {
        let cache_dir = plan
            .cache_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
        vendor::install(requirements, &guest_path(dest, layout::VENDOR_DIR), &cache_dir)?;
    }

    install_payload(&plan.payload, dest)?;

    if let Some(data) = &plan.data_dir {
        copy_data(data, dest)?;
    }

    install_init(&plan.init_binary, dest)?;
    ensure_required_dirs(dest)?;
    verify_entries(dest)?;

    tracing::info!("Staged root filesystem at {}", dest.display());
    Ok(())
}

/// Map an absolute guest path onto the staging directory.
fn guest_path(dest: &Path, guest: &str) -> PathBuf {
    dest.join(guest.trim_start_matches('/'))
}

/// Extract the base OS tarball at the stage root.
fn extract_base(tarball: &Path, dest: &Path) -> TradeboxResult<()> {
    tracing::info!("Extracting base rootfs: {}", tarball.display());

    let file = File::open(tarball).map_err(|e| {
        TradeboxError::Storage(format!(
            "failed to open base rootfs {}: {}",
            tarball.display(),
            e
        ))
    })?;

    let gzipped = tarball
        .extension()
        .is_some_and(|ext| ext == "gz" || ext == "tgz");

    let unpack = |mut archive: tar::Archive<Box<dyn std::io::Read>>| -> std::io::Result<()> {
        archive.set_preserve_permissions(true);
        archive.unpack(dest)
    };

    let reader: Box<dyn std::io::Read> = if gzipped {
        Box::new(flate2::read::GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    unpack(tar::Archive::new(reader)).map_err(|e| {
        TradeboxError::Storage(format!(
            "failed to extract base rootfs {}: {}",
            tarball.display(),
            e
        ))
    })
}

/// Install OS packages by chrooting into the stage and running the base
/// image's package manager. Needs root and a working resolv.conf inside
/// the stage.
fn install_packages(packages: &[String], dest: &Path) -> TradeboxResult<()> {
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return Err(TradeboxError::Storage(
            "installing OS packages requires root (chroot into the stage)".into(),
        ));
    }

    let etc = dest.join("etc");
    std::fs::create_dir_all(&etc).map_err(|e| {
        TradeboxError::Storage(format!("failed to create {}: {}", etc.display(), e))
    })?;
    std::fs::write(etc.join("resolv.conf"), "nameserver 8.8.8.8\n").map_err(|e| {
        TradeboxError::Storage(format!("failed to write resolv.conf: {}", e))
    })?;

    tracing::info!("Installing OS packages: {}", packages.join(" "));

    let script = format!("apk add --no-cache {}", packages.join(" "));
    let output = Command::new("chroot")
        .arg(dest)
        .args(["/bin/sh", "-c", &script])
        .output()
        .map_err(|e| TradeboxError::Storage(format!("failed to run chroot: {}", e)))?;

    if !output.status.success() {
        return Err(TradeboxError::Storage(format!(
            "package installation failed with exit code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}

/// Copy payload artifacts into the payload directory in order.
fn install_payload(artifacts: &[PathBuf], dest: &Path) -> TradeboxResult<()> {
    let payload_dir = guest_path(dest, layout::PAYLOAD_DIR);
    std::fs::create_dir_all(&payload_dir).map_err(|e| {
        TradeboxError::Storage(format!(
            "failed to create payload directory {}: {}",
            payload_dir.display(),
            e
        ))
    })?;

    for artifact in artifacts {
        let name = artifact.file_name().ok_or_else(|| {
            TradeboxError::Config(format!(
                "payload artifact has no file name: {}",
                artifact.display()
            ))
        })?;
        let target = payload_dir.join(name);

        std::fs::copy(artifact, &target).map_err(|e| {
            TradeboxError::Storage(format!(
                "failed to install payload artifact {}: {}",
                artifact.display(),
                e
            ))
        })?;
        tracing::debug!(
            "Installed payload artifact: {} → {}",
            artifact.display(),
            target.display()
        );
    }

    set_executable(&guest_path(dest, layout::PAYLOAD_ENTRY))
}

/// Copy the static data directory byte-for-byte into the image.
fn copy_data(data: &Path, dest: &Path) -> TradeboxResult<()> {
    let target = guest_path(dest, layout::DATA_DIR);
    std::fs::create_dir_all(&target).map_err(|e| {
        TradeboxError::Storage(format!(
            "failed to create data directory {}: {}",
            target.display(),
            e
        ))
    })?;

    let output = Command::new("cp")
        .args(["-a", "--"])
        .arg(format!("{}/.", data.display()))
        .arg(&target)
        .output()
        .map_err(|e| TradeboxError::Storage(format!("failed to run cp: {}", e)))?;

    if !output.status.success() {
        return Err(TradeboxError::Storage(format!(
            "failed to copy data directory {}: {}",
            data.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}

/// Install the compiled init binary at the init entry path.
fn install_init(init_binary: &Path, dest: &Path) -> TradeboxResult<()> {
    let target = guest_path(dest, layout::INIT_PATH);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            TradeboxError::Storage(format!("failed to create {}: {}", parent.display(), e))
        })?;
    }

    std::fs::copy(init_binary, &target).map_err(|e| {
        TradeboxError::Storage(format!(
            "failed to install init binary {}: {}",
            init_binary.display(),
            e
        ))
    })?;

    set_executable(&target)
}

/// Create the mount points and scratch directories init and the kernel
/// expect, whether or not a base layer provided them.
fn ensure_required_dirs(dest: &Path) -> TradeboxResult<()> {
    for dir in layout::REQUIRED_DIRS {
        let path = dest.join(dir);
        std::fs::create_dir_all(&path).map_err(|e| {
            TradeboxError::Storage(format!("failed to create {}: {}", path.display(), e))
        })?;
    }
    Ok(())
}

/// The staged tree must carry both well-known entries before it may become
/// an image.
fn verify_entries(dest: &Path) -> TradeboxResult<()> {
    for entry in [layout::INIT_PATH, layout::PAYLOAD_ENTRY] {
        if !guest_path(dest, entry).is_file() {
            return Err(TradeboxError::Config(format!(
                "staged tree is missing the well-known entry {}",
                entry
            )));
        }
    }
    Ok(())
}

fn set_executable(path: &Path) -> TradeboxResult<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
        TradeboxError::Storage(format!(
            "failed to set permissions on {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn plan_with(dir: &Path, payload: Vec<PathBuf>) -> ImagePlan {
        let init = dir.join("tradebox-init");
        fs::write(&init, b"\x7fELF-init").unwrap();
        ImagePlan {
            capacity_mib: 1024,
            base_rootfs: None,
            packages: Vec::new(),
            requirements: None,
            payload,
            data_dir: None,
            init_binary: init,
            cache_dir: None,
        }
    }

    fn write_payload(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn stage_installs_wellknown_entries() {
        let dir = TempDir::new().unwrap();
        let entry = write_payload(dir.path(), "main.py", "print('agent')\n");
        let plan = plan_with(dir.path(), vec![entry]);

        let stage_dir = TempDir::new().unwrap();
        stage(&plan, stage_dir.path()).unwrap();

        let init = stage_dir.path().join("sbin/init");
        let payload = stage_dir.path().join("opt/agent/main.py");
        assert!(init.is_file());
        assert!(payload.is_file());

        // Both entries are executable.
        for path in [init, payload] {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111, "{} not executable", path.display());
        }
    }

    #[test]
    fn stage_creates_mount_points() {
        let dir = TempDir::new().unwrap();
        let entry = write_payload(dir.path(), "main.py", "pass\n");
        let plan = plan_with(dir.path(), vec![entry]);

        let stage_dir = TempDir::new().unwrap();
        stage(&plan, stage_dir.path()).unwrap();

        for mount in ["proc", "sys", "dev", "tmp", "run"] {
            assert!(stage_dir.path().join(mount).is_dir(), "missing /{}", mount);
        }
    }

    #[test]
    fn later_payload_artifact_wins_at_colliding_path() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a");
        let second = dir.path().join("b");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        let old = write_payload(&first, "main.py", "print('old')\n");
        let new = write_payload(&second, "main.py", "print('new')\n");

        let plan = plan_with(dir.path(), vec![old, new]);
        let stage_dir = TempDir::new().unwrap();
        stage(&plan, stage_dir.path()).unwrap();

        let staged = fs::read_to_string(stage_dir.path().join("opt/agent/main.py")).unwrap();
        assert_eq!(staged, "print('new')\n");
    }

    #[test]
    fn data_directory_is_copied_byte_for_byte() {
        let dir = TempDir::new().unwrap();
        let entry = write_payload(dir.path(), "main.py", "pass\n");

        let data = dir.path().join("historical");
        fs::create_dir_all(data.join("ohlcv")).unwrap();
        fs::write(data.join("ohlcv/AAPL.csv"), "ts,open,close\n1,2,3\n").unwrap();

        let mut plan = plan_with(dir.path(), vec![entry]);
        plan.data_dir = Some(data);

        let stage_dir = TempDir::new().unwrap();
        stage(&plan, stage_dir.path()).unwrap();

        let staged =
            fs::read_to_string(stage_dir.path().join("opt/agent/data/ohlcv/AAPL.csv")).unwrap();
        assert_eq!(staged, "ts,open,close\n1,2,3\n");
    }

    #[test]
    fn staging_twice_yields_identical_trees() {
        let dir = TempDir::new().unwrap();
        let entry = write_payload(dir.path(), "main.py", "print('agent')\n");
        let plan = plan_with(dir.path(), vec![entry]);

        let listing = |root: &Path| -> Vec<(PathBuf, Option<Vec<u8>>)> {
            let mut entries: Vec<_> = WalkDir::new(root)
                .follow_links(false)
                .into_iter()
                .map(|e| e.unwrap())
                .map(|e| {
                    let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
                    let bytes = e
                        .file_type()
                        .is_file()
                        .then(|| fs::read(e.path()).unwrap());
                    (rel, bytes)
                })
                .collect();
            entries.sort();
            entries
        };

        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        stage(&plan, first.path()).unwrap();
        stage(&plan, second.path()).unwrap();

        assert_eq!(listing(first.path()), listing(second.path()));
    }
}
