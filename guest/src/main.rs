//! Entry point for the tradebox guest init.
//!
//! Runs as PID 1 inside the booted guest. Brings the environment from
//! "kernel has started" to "payload is running as the foreground process"
//! and nothing more: mount procfs, mount sysfs, exec the payload.

#[cfg(not(target_os = "linux"))]
compile_error!("tradebox guest init is Linux-only; build with a Linux target");

mod boot;

use tracing::{error, info};

fn main() {
    // A panic in PID 1 must still exit non-zero so the kernel (booted with
    // panic=1) halts the guest instead of wedging it.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("[PANIC] guest init panicked: {}", panic_info);
        std::process::exit(1);
    }));

    // The guest console is stderr; respect RUST_LOG if the image carries one.
    if let Err(e) = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
    {
        eprintln!("[ERROR] failed to initialize tracing: {}", e);
    }

    info!("tradebox init starting (PID {})", std::process::id());

    #[cfg(target_os = "linux")]
    {
        let mut ops = boot::SystemOps;
        if let Err(e) = boot::run(&mut ops) {
            // Fatal by design: no supervisor exists above PID 1. Exiting
            // panics the kernel (panic=1), which the host monitor observes.
            error!("boot sequence failed: {}", e);
            std::process::exit(1);
        }

        // exec_payload either replaced this process or returned an error.
        unreachable!("boot sequence returned without exec");
    }
}
