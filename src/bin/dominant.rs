use clap::Parser;
use std::fs;
use std::path::PathBuf;
use dominant_color::{ExtractConfig, UploadPolicy, dominant_color_bytes};
use anyhow::{Context, Result, bail};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Report the dominant color of one or more photos.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// One or more input image paths
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// JSON file with extraction settings; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of clusters
    #[arg(short, long)]
    k: Option<usize>,

    /// Pixels with any channel at or below this are ignored as shadow
    #[arg(long)]
    low: Option<u8>,

    /// Pixels with any channel at or above this are ignored as glare
    #[arg(long)]
    high: Option<u8>,

    /// Maximum number of pixels fed to clustering
    #[arg(short = 'n', long)]
    max_samples: Option<usize>,

    /// Number of k-means initializations
    #[arg(short, long)]
    attempts: Option<usize>,

    /// Random seed for sampling and initialization
    #[arg(short, long, conflicts_with = "unseeded")]
    seed: Option<u64>,

    /// Use a fresh random source instead of a fixed seed
    #[arg(long)]
    unseeded: bool,

    /// Reject files larger than this many bytes
    #[arg(long, default_value_t = dominant_color::intake::DEFAULT_MAX_UPLOAD_BYTES)]
    max_bytes: usize,
}

fn load_config(args: &Args) -> Result<ExtractConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => ExtractConfig::default(),
    };

    if let Some(k) = args.k {
        config.k = k;
    }
    if let Some(low) = args.low {
        config.low_threshold = low;
    }
    if let Some(high) = args.high {
        config.high_threshold = high;
    }
    if let Some(n) = args.max_samples {
        config.max_samples = n;
    }
    if let Some(a) = args.attempts {
        config.cluster_init_attempts = a;
    }
    if let Some(seed) = args.seed {
        config.random_seed = Some(seed);
    }
    if args.unseeded {
        config.random_seed = None;
    }

    config.validate().context("invalid settings")?;
    Ok(config)
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let policy = UploadPolicy {
        max_bytes: args.max_bytes,
        ..UploadPolicy::default()
    };

    let mut failures = 0usize;
    for input in &args.inputs {
        let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        let name = input.file_name().unwrap_or_default().to_string_lossy();

        let line = match dominant_color_bytes(&bytes, &name, &policy, &config) {
            Ok(color) => json!({
                "file": input.display().to_string(),
                "hex": color.hex,
                "rgb": color.rgb,
            }),
            Err(e) => {
                failures += 1;
                tracing::warn!(file = %input.display(), "{e}");
                json!({
                    "file": input.display().to_string(),
                    "error": e.public_message(),
                    "status": e.status_code(),
                })
            }
        };
        println!("{line}");
    }

    if failures > 0 {
        bail!("{failures} of {} inputs failed", args.inputs.len());
    }
    Ok(())
}
