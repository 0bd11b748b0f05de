//! Vendored runtime dependencies with content-addressed caching.
//!
//! Resolving third-party dependencies is by far the slowest staging layer,
//! so resolved trees are cached under a key derived from the requirements
//! text. Identical requirements reuse the cached tree; a failed resolution
//! removes its partial cache entry.

use std::path::Path;
use std::process::Command;

use sha2::{Digest, Sha256};
use tradebox_shared::{TradeboxError, TradeboxResult};

/// Wheel platform tag matched to the guest OS.
const PIP_PLATFORM: &str = "manylinux2014_x86_64";

/// Interpreter version inside the guest image. Must match the runtime the
/// base layer installs.
const PIP_PYTHON_VERSION: &str = "3.11";

/// ABI tag matching the guest interpreter.
const PIP_ABI: &str = "cp311";

/// Cache key for a requirements text.
pub fn cache_key(requirements_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(requirements_text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolve the requirements file into `dest`, going through the cache.
pub fn install(requirements: &Path, dest: &Path, cache_dir: &Path) -> TradeboxResult<()> {
    let text = std::fs::read_to_string(requirements).map_err(|e| {
        TradeboxError::Storage(format!(
            "failed to read requirements file {}: {}",
            requirements.display(),
            e
        ))
    })?;

    if text.trim().is_empty() {
        tracing::debug!("Requirements file is empty, skipping vendor layer");
        return Ok(());
    }

    let key = cache_key(&text);
    let cached = cache_dir.join(&key);

    if cached.is_dir() {
        tracing::info!("Vendor cache hit: {}", key);
    } else {
        tracing::info!("Vendor cache miss, resolving dependencies: {}", key);
        resolve(requirements, &cached)?;
    }

    copy_cached(&cached, dest)
}

/// Resolve dependencies into a fresh cache entry with pinned platform/ABI
/// flags, so the wheels match the guest regardless of the build host.
fn resolve(requirements: &Path, cached: &Path) -> TradeboxResult<()> {
    std::fs::create_dir_all(cached).map_err(|e| {
        TradeboxError::Storage(format!(
            "failed to create cache entry {}: {}",
            cached.display(),
            e
        ))
    })?;

    let result = match Command::new("pip")
        .arg("install")
        .arg("-r")
        .arg(requirements)
        .arg("--target")
        .arg(cached)
        .arg("--no-cache-dir")
        // Pre-built wheels only: the build host must not compile for the guest.
        .arg("--only-binary=:all:")
        .args(["--platform", PIP_PLATFORM])
        .args(["--python-version", PIP_PYTHON_VERSION])
        .args(["--implementation", "cp"])
        .args(["--abi", PIP_ABI])
        .output()
    {
        Err(e) => Err(TradeboxError::Storage(format!("failed to run pip: {}", e))),
        Ok(out) if !out.status.success() => Err(TradeboxError::Storage(format!(
            "pip install failed with exit code {:?}: {}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr).trim()
        ))),
        Ok(_) => Ok(()),
    };

    if result.is_err() {
        // A partial cache entry would poison every later build with the
        // same requirements.
        if let Err(e) = std::fs::remove_dir_all(cached) {
            tracing::warn!(
                "Failed to remove partial cache entry {}: {}",
                cached.display(),
                e
            );
        }
        return result;
    }

    tracing::info!("Dependencies resolved into cache: {}", cached.display());
    Ok(())
}

/// Copy a cached vendor tree into the staged destination.
fn copy_cached(cached: &Path, dest: &Path) -> TradeboxResult<()> {
    std::fs::create_dir_all(dest).map_err(|e| {
        TradeboxError::Storage(format!(
            "failed to create vendor directory {}: {}",
            dest.display(),
            e
        ))
    })?;

    let output = Command::new("cp")
        .args(["-a", "--"])
        .arg(format!("{}/.", cached.display()))
        .arg(dest)
        .output()
        .map_err(|e| TradeboxError::Storage(format!("failed to run cp: {}", e)))?;

    if !output.status.success() {
        return Err(TradeboxError::Storage(format!(
            "failed to copy cached dependencies into {}: {}",
            dest.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}
