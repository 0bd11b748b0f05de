//! Tradebox CLI - build and patch guest images.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "tradebox",
    version,
    about = "Build bootable guest images for the sandboxed trading agent"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a disk image from a build manifest
    Build(commands::build::BuildArgs),

    /// Overwrite the payload of an existing image in place
    Patch(commands::patch::PatchArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build(args) => commands::build::run(args),
        Commands::Patch(args) => commands::patch::run(args),
    }
}
