use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use ray_tracing_lib::config::TracerConfig;
use tracing_subscriber::EnvFilter;

/// Real-time progressive ray tracer.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML file with tracer settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Equirectangular skybox image
    #[arg(long)]
    skybox: Option<PathBuf>,

    /// Seed for scene generation and jitter
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum ray bounces per sample
    #[arg(long)]
    bounces: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => TracerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TracerConfig::default(),
    };
    if let Some(skybox) = args.skybox {
        config.skybox = Some(skybox);
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(bounces) = args.bounces {
        config.ray_bounces = bounces;
    }
    config.validate()?;

    pollster::block_on(ray_tracing_lib::run(config))?;
    Ok(())
}
