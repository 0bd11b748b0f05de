//! Shared constants between the image builder and the boot-time contract.

/// Image defaults.
pub mod image {
    /// Default image capacity in MiB (1 GiB).
    pub const DEFAULT_CAPACITY_MIB: u64 = 1024;
}

/// Boot-time contract with the VM monitor.
pub mod boot {
    /// Kernel command line the monitor is expected to boot the image with.
    ///
    /// `panic=1` makes PID-1 exit panic the kernel immediately, so a dead
    /// payload surfaces as a dead guest the host can observe. `init=` names
    /// the init entry baked by the builder.
    pub const BOOT_ARGS: &str = "console=ttyS0 reboot=k panic=1 pci=off init=/sbin/init";
}

/// Environment contract between init and the payload.
pub mod env {
    /// Declares the static data directory location to the payload.
    pub const DATA_PATH: &str = "DATA_PATH";

    /// Makes the vendored dependencies importable by the runtime.
    pub const PYTHONPATH: &str = "PYTHONPATH";

    /// Minimal PATH handed to the payload.
    pub const PATH_VALUE: &str = "/usr/local/bin:/usr/bin:/bin";
}
