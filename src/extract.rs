use palette::Srgb;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cluster::{ClusterSet, Clusterer, KmeansColors};
use crate::config::ExtractConfig;
use crate::error::ExtractError;

/// Row-major RGB pixels of a decoded image.
pub type PixelBuffer = Vec<Srgb<u8>>;

/// The color of the most populous cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DominantColor {
    /// Lowercase `#rrggbb`.
    pub hex: String,
    pub rgb: [u8; 3],
}

impl DominantColor {
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            hex: format!("#{r:02x}{g:02x}{b:02x}"),
            rgb: [r, g, b],
        }
    }

    /// Round a unit-range cluster center to the nearest 8-bit color.
    pub fn from_center(center: Srgb<f32>) -> Self {
        let to_u8 = |c: f32| (c * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::from_rgb(to_u8(center.red), to_u8(center.green), to_u8(center.blue))
    }
}

// ------------------------------------------------------------
// Entry points
// ------------------------------------------------------------

/// Extract the dominant color of `pixels`.
///
/// Randomness comes from `config.random_seed` when set, otherwise from the
/// thread-local RNG. Clustering uses [`KmeansColors`].
pub fn extract(pixels: PixelBuffer, config: &ExtractConfig) -> Result<DominantColor, ExtractError> {
    let clusterer = KmeansColors::default();
    match config.random_seed {
        Some(seed) => extract_with(pixels, config, &clusterer, &mut StdRng::seed_from_u64(seed)),
        None => extract_with(pixels, config, &clusterer, &mut rand::rng()),
    }
}

/// Extract the dominant color with an explicit clustering backend and random
/// source.
///
/// Steps performed:
/// 1. Drop glare and shadow pixels, falling back to the full buffer when
///    nothing survives.
/// 2. Draw at most `max_samples` pixels without replacement.
/// 3. Cluster the sample into `k` groups (`cluster_init_attempts` runs).
/// 4. Report the rounded center of the largest cluster.
pub fn extract_with<C, R>(
    pixels: PixelBuffer,
    config: &ExtractConfig,
    clusterer: &C,
    rng: &mut R,
) -> Result<DominantColor, ExtractError>
where
    C: Clusterer + ?Sized,
    R: Rng + ?Sized,
{
    config.validate()?;
    if pixels.is_empty() {
        return Err(ExtractError::EmptyImage);
    }
    let total = pixels.len();

    let filtered = filter_glare(pixels, config.low_threshold, config.high_threshold);
    let sample = sample_pixels(filtered, config.max_samples, rng);
    debug!(total, sampled = sample.len(), "prepared clustering input");

    if sample.len() < config.k {
        return Err(ExtractError::InsufficientPixels {
            k: config.k,
            found: sample.len(),
        });
    }

    let seed: u64 = rng.random();
    let clusters = clusterer.cluster(&sample, config.k, config.cluster_init_attempts, seed)?;
    clusters.verify(config.k, sample.len())?;

    let idx = dominant_cluster(&clusters).ok_or_else(|| {
        ExtractError::ComputationError("clustering returned no clusters".into())
    })?;
    let color = DominantColor::from_center(clusters.centers[idx]);
    debug!(
        cluster = idx,
        members = clusters.counts[idx],
        hex = %color.hex,
        "selected dominant cluster"
    );
    Ok(color)
}

// ------------------------------------------------------------
// Pipeline stages
// ------------------------------------------------------------

/// Keep pixels whose channels all lie strictly between `low` and `high`.
/// Returns the input untouched if that would leave nothing.
pub fn filter_glare(pixels: PixelBuffer, low: u8, high: u8) -> PixelBuffer {
    let kept: PixelBuffer = pixels
        .iter()
        .copied()
        .filter(|p| {
            let max = p.red.max(p.green).max(p.blue);
            let min = p.red.min(p.green).min(p.blue);
            max < high && min > low
        })
        .collect();

    if kept.is_empty() {
        warn!(
            pixels = pixels.len(),
            "every pixel is glare or shadow; clustering the unfiltered image"
        );
        pixels
    } else {
        debug!(kept = kept.len(), dropped = pixels.len() - kept.len(), "filtered glare and shadow");
        kept
    }
}

/// Uniformly draw `max` pixels without replacement when there are more than
/// `max`. Selected pixels keep their original order.
pub fn sample_pixels<R>(pixels: PixelBuffer, max: usize, rng: &mut R) -> PixelBuffer
where
    R: Rng + ?Sized,
{
    if pixels.len() <= max {
        return pixels;
    }

    let mut picked = rand::seq::index::sample(rng, pixels.len(), max).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| pixels[i]).collect()
}

/// Index of the cluster with the most members, lowest index on ties.
pub fn dominant_cluster(clusters: &ClusterSet) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, &count) in clusters.counts.iter().enumerate() {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((idx, count)),
        }
    }
    best.map(|(idx, _)| idx)
}
