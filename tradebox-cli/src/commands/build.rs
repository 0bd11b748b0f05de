//! `tradebox build` - run the full image pipeline from a manifest.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tradebox::{ImageBuilder, ImagePlan};

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Build manifest (YAML form of the image plan)
    #[arg(short, long, env = "TRADEBOX_MANIFEST")]
    pub manifest: PathBuf,

    /// Where to write the image
    #[arg(short, long, default_value = "rootfs.ext4")]
    pub output: PathBuf,

    /// Override the manifest's image capacity (MiB)
    #[arg(long)]
    pub capacity_mib: Option<u64>,
}

pub fn run(args: BuildArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.manifest)
        .with_context(|| format!("failed to read manifest {}", args.manifest.display()))?;

    let mut plan: ImagePlan = serde_yaml::from_str(&text)
        .with_context(|| format!("failed to parse manifest {}", args.manifest.display()))?;

    // Manifest paths are relative to the manifest itself, not the cwd.
    if let Some(base) = args.manifest.parent() {
        plan.resolve_relative(base);
    }

    if let Some(capacity) = args.capacity_mib {
        plan.capacity_mib = capacity;
    }

    let image = ImageBuilder::new(plan)
        .build(&args.output)
        .context("image build failed")?;

    tracing::info!("Wrote {}", image.display());
    Ok(())
}
