//! The boot sequence.
//!
//! A linear state machine with no branching and no retries:
//!
//! ```text
//! START → PROC_MOUNTED → SYS_MOUNTED → PAYLOAD_RUNNING
//! ```
//!
//! Every transition is fatal on failure - there is no process above PID 1
//! to retry anything. The transitions live behind [`BootOps`] so the
//! sequence itself can be exercised with a recording double.

use tradebox_shared::{TradeboxError, TradeboxResult};

/// States of the boot sequence, in the only order they can occur.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootStage {
    Start,
    ProcMounted,
    SysMounted,
    PayloadRunning,
}

/// The three side-effecting transitions of the boot sequence.
pub trait BootOps {
    /// Mount the process-information pseudo-filesystem.
    fn mount_proc(&mut self) -> TradeboxResult<()>;

    /// Mount the system/device-information pseudo-filesystem.
    fn mount_sys(&mut self) -> TradeboxResult<()>;

    /// Replace this process with the payload. The real implementation never
    /// returns on success; `Ok` is only observable from a test double.
    fn exec_payload(&mut self) -> TradeboxResult<()>;
}

/// Drive the sequence to completion or first failure.
pub fn run(ops: &mut impl BootOps) -> TradeboxResult<BootStage> {
    tracing::info!(stage = ?BootStage::Start, "boot sequence starting");

    ops.mount_proc()?;
    tracing::info!(stage = ?BootStage::ProcMounted, "procfs mounted");

    ops.mount_sys()?;
    tracing::info!(stage = ?BootStage::SysMounted, "sysfs mounted");

    ops.exec_payload()?;
    Ok(BootStage::PayloadRunning)
}

/// The real transitions, executed against the kernel.
#[cfg(target_os = "linux")]
pub struct SystemOps;

#[cfg(target_os = "linux")]
impl SystemOps {
    fn mount_pseudo(kind: &'static str, fstype: &str, target: &str) -> TradeboxResult<()> {
        use nix::mount::{mount, MsFlags};

        mount(
            Some(fstype),
            target,
            Some(fstype),
            MsFlags::empty(),
            None::<&str>,
        )
        .map_err(|e| TradeboxError::Mount {
            kind,
            detail: format!("{} at {}: {}", fstype, target, e),
        })
    }

    fn cstr(s: &str) -> TradeboxResult<std::ffi::CString> {
        std::ffi::CString::new(s)
            .map_err(|e| TradeboxError::Exec(format!("invalid exec string: {}", e)))
    }
}

#[cfg(target_os = "linux")]
impl BootOps for SystemOps {
    fn mount_proc(&mut self) -> TradeboxResult<()> {
        Self::mount_pseudo("proc", "proc", tradebox_shared::layout::PROC_MOUNT)
    }

    fn mount_sys(&mut self) -> TradeboxResult<()> {
        Self::mount_pseudo("sys", "sysfs", tradebox_shared::layout::SYS_MOUNT)
    }

    fn exec_payload(&mut self) -> TradeboxResult<()> {
        use tradebox_shared::constants::env;
        use tradebox_shared::layout;

        let program = Self::cstr(layout::PYTHON_BIN)?;
        let argv = [
            Self::cstr("python3")?,
            Self::cstr(layout::PAYLOAD_ENTRY)?,
        ];
        let envp = [
            Self::cstr(&format!("PATH={}", env::PATH_VALUE))?,
            Self::cstr(&format!("{}={}", env::DATA_PATH, layout::DATA_DIR))?,
            Self::cstr(&format!("{}={}", env::PYTHONPATH, layout::VENDOR_DIR))?,
        ];

        tracing::info!(
            "Handing over to payload: {} {}",
            layout::PYTHON_BIN,
            layout::PAYLOAD_ENTRY
        );

        // One-way door: on success the payload is PID 1 and this code is gone.
        let errno = match nix::unistd::execve(&program, &argv, &envp) {
            Ok(infallible) => match infallible {},
            Err(e) => e,
        };

        Err(TradeboxError::Exec(format!(
            "execve {} failed: {}",
            layout::PYTHON_BIN,
            errno
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records transition order and fails at a chosen transition.
    struct Recording {
        calls: Vec<&'static str>,
        fail_at: Option<&'static str>,
    }

    impl Recording {
        fn new(fail_at: Option<&'static str>) -> Self {
            Self {
                calls: Vec::new(),
                fail_at,
            }
        }

        fn step(&mut self, name: &'static str, err: TradeboxError) -> TradeboxResult<()> {
            self.calls.push(name);
            if self.fail_at == Some(name) {
                return Err(err);
            }
            Ok(())
        }
    }

    impl BootOps for Recording {
        fn mount_proc(&mut self) -> TradeboxResult<()> {
            self.step(
                "proc",
                TradeboxError::Mount {
                    kind: "proc",
                    detail: "mount point missing".into(),
                },
            )
        }

        fn mount_sys(&mut self) -> TradeboxResult<()> {
            self.step(
                "sys",
                TradeboxError::Mount {
                    kind: "sys",
                    detail: "rejected by kernel".into(),
                },
            )
        }

        fn exec_payload(&mut self) -> TradeboxResult<()> {
            self.step("exec", TradeboxError::Exec("payload missing".into()))
        }
    }

    #[test]
    fn sequence_runs_in_exact_order_with_no_repeats() {
        let mut ops = Recording::new(None);
        let stage = run(&mut ops).unwrap();

        assert_eq!(stage, BootStage::PayloadRunning);
        assert_eq!(ops.calls, vec!["proc", "sys", "exec"]);
    }

    #[test]
    fn proc_mount_failure_terminates_before_sys() {
        let mut ops = Recording::new(Some("proc"));
        let err = run(&mut ops).unwrap_err();

        assert!(matches!(err, TradeboxError::Mount { kind: "proc", .. }));
        assert_eq!(ops.calls, vec!["proc"]);
    }

    #[test]
    fn sys_mount_failure_terminates_before_exec() {
        let mut ops = Recording::new(Some("sys"));
        let err = run(&mut ops).unwrap_err();

        assert!(matches!(err, TradeboxError::Mount { kind: "sys", .. }));
        assert_eq!(ops.calls, vec!["proc", "sys"]);
    }

    #[test]
    fn exec_failure_is_an_exec_error() {
        let mut ops = Recording::new(Some("exec"));
        let err = run(&mut ops).unwrap_err();

        assert!(matches!(err, TradeboxError::Exec(_)));
        assert_eq!(ops.calls, vec!["proc", "sys", "exec"]);
    }
}
