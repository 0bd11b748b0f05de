//! Declarative build input.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tradebox_shared::constants::image::DEFAULT_CAPACITY_MIB;
use tradebox_shared::layout;
use tradebox_shared::{TradeboxError, TradeboxResult};

fn default_capacity_mib() -> u64 {
    DEFAULT_CAPACITY_MIB
}

/// Everything a build needs, in the order the layers are applied.
///
/// Deserializable from the YAML manifest the CLI accepts. All paths are
/// host-side; relative paths are resolved against the manifest location
/// before the plan reaches the builder.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ImagePlan {
    /// Target image capacity in MiB.
    #[serde(default = "default_capacity_mib")]
    pub capacity_mib: u64,

    /// Base OS root filesystem tarball (plain or gzipped), extracted at `/`.
    #[serde(default)]
    pub base_rootfs: Option<PathBuf>,

    /// OS packages installed into the staged tree via the base image's
    /// package manager. Requires root at build time.
    #[serde(default)]
    pub packages: Vec<String>,

    /// Requirements file resolving the payload's third-party runtime
    /// dependencies into the vendor directory.
    #[serde(default)]
    pub requirements: Option<PathBuf>,

    /// Locally-built payload artifacts, installed under the payload
    /// directory in order. Later artifacts overwrite earlier ones at
    /// colliding names.
    pub payload: Vec<PathBuf>,

    /// Static data directory copied byte-for-byte into the image.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Compiled guest init binary, installed at the init entry path.
    pub init_binary: PathBuf,

    /// Cache directory for resolved runtime dependencies. Defaults to
    /// `dep-cache` under the current directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl ImagePlan {
    /// Declared capacity in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_mib * 1024 * 1024
    }

    /// Resolve every relative path in the plan against `base`.
    pub fn resolve_relative(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                let joined = base.join(p.as_path());
                *p = joined;
            }
        };

        if let Some(p) = self.base_rootfs.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.requirements.as_mut() {
            resolve(p);
        }
        for p in self.payload.iter_mut() {
            resolve(p);
        }
        if let Some(p) = self.data_dir.as_mut() {
            resolve(p);
        }
        resolve(&mut self.init_binary);
        if let Some(p) = self.cache_dir.as_mut() {
            resolve(p);
        }
    }

    /// Check the plan is complete and its inputs exist on the host.
    ///
    /// The payload entry invariant is enforced here: at least one artifact
    /// must supply the well-known entry file name, since init execs that
    /// exact path inside the guest.
    pub fn validate(&self) -> TradeboxResult<()> {
        if self.capacity_mib == 0 {
            return Err(TradeboxError::Config(
                "image capacity must be non-zero".into(),
            ));
        }

        if self.payload.is_empty() {
            return Err(TradeboxError::Config(
                "plan declares no payload artifacts".into(),
            ));
        }

        let entry_name = Path::new(layout::PAYLOAD_ENTRY)
            .file_name()
            .expect("payload entry has a file name");
        if !self
            .payload
            .iter()
            .any(|p| p.file_name() == Some(entry_name))
        {
            return Err(TradeboxError::Config(format!(
                "no payload artifact supplies the entry file '{}'",
                entry_name.to_string_lossy()
            )));
        }

        for artifact in &self.payload {
            if !artifact.is_file() {
                return Err(TradeboxError::Config(format!(
                    "payload artifact not found: {}",
                    artifact.display()
                )));
            }
        }

        if !self.init_binary.is_file() {
            return Err(TradeboxError::Config(format!(
                "init binary not found: {}",
                self.init_binary.display()
            )));
        }

        if let Some(base) = &self.base_rootfs {
            if !base.is_file() {
                return Err(TradeboxError::Config(format!(
                    "base rootfs tarball not found: {}",
                    base.display()
                )));
            }
        }

        if let Some(req) = &self.requirements {
            if !req.is_file() {
                return Err(TradeboxError::Config(format!(
                    "requirements file not found: {}",
                    req.display()
                )));
            }
        }

        if let Some(data) = &self.data_dir {
            if !data.is_dir() {
                return Err(TradeboxError::Config(format!(
                    "data directory not found: {}",
                    data.display()
                )));
            }
        }

        if !self.packages.is_empty() && self.base_rootfs.is_none() {
            return Err(TradeboxError::Config(
                "packages declared without a base rootfs to install into".into(),
            ));
        }

        Ok(())
    }
}
