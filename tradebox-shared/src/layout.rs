//! Guest filesystem layout.
//!
//! These paths must be identical on both sides of the host/guest boundary:
//! the builder installs files at them, init mounts and execs against them.

/// Init entry point inside the guest. The VM monitor boots the kernel with
/// `init=` pointing here; the builder installs the compiled init binary at
/// this path.
pub const INIT_PATH: &str = "/sbin/init";

/// Directory holding the payload and everything it owns.
pub const PAYLOAD_DIR: &str = "/opt/agent";

/// The payload entry point init execs. Also the one file the offline update
/// path is allowed to overwrite in place.
pub const PAYLOAD_ENTRY: &str = "/opt/agent/main.py";

/// Vendored third-party runtime dependencies (pip `--target` output).
pub const VENDOR_DIR: &str = "/opt/agent/vendor";

/// Static data directory baked into the image.
pub const DATA_DIR: &str = "/opt/agent/data";

/// Python interpreter the payload runs under.
pub const PYTHON_BIN: &str = "/usr/bin/python3";

/// Mount point for the process-information pseudo-filesystem.
pub const PROC_MOUNT: &str = "/proc";

/// Mount point for the system/device-information pseudo-filesystem.
pub const SYS_MOUNT: &str = "/sys";

/// Directories that must exist in every image even when no layer provides
/// them: mount points and scratch space the kernel and payload expect.
pub const REQUIRED_DIRS: &[&str] = &["proc", "sys", "dev", "tmp", "run"];
