//! `tradebox patch` - offline payload update for a built image.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

#[derive(Args, Debug)]
pub struct PatchArgs {
    /// Image to patch
    #[arg(short, long)]
    pub image: PathBuf,

    /// Payload artifact to write over the image's payload entry
    #[arg(short, long)]
    pub artifact: PathBuf,
}

pub fn run(args: PatchArgs) -> anyhow::Result<()> {
    tradebox::update::patch_payload(&args.image, &args.artifact)
        .context("payload patch failed")?;

    tracing::info!("Patched {}", args.image.display());
    Ok(())
}
