use serde::Deserialize;

use crate::error::ExtractError;

/// Tunables for a single extraction call.
///
/// Every field has a default, so a partial JSON object (or `{}`) is a valid
/// configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Pixels with any channel at or below this value count as shadow.
    pub low_threshold: u8,
    /// Pixels with any channel at or above this value count as glare.
    pub high_threshold: u8,
    /// Upper bound on the number of pixels handed to clustering.
    pub max_samples: usize,
    /// Number of clusters.
    pub k: usize,
    /// Independent k-means initializations; the tightest one wins.
    pub cluster_init_attempts: usize,
    /// `None` draws sampling and initialization from a true random source.
    pub random_seed: Option<u64>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            low_threshold: 20,
            high_threshold: 240,
            max_samples: 100_000,
            k: 3,
            cluster_init_attempts: 5,
            random_seed: Some(42),
        }
    }
}

impl ExtractConfig {
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.low_threshold >= self.high_threshold {
            return Err(ExtractError::InvalidConfig(format!(
                "low_threshold ({}) must be below high_threshold ({})",
                self.low_threshold, self.high_threshold
            )));
        }
        // kmeans_colors labels clusters with a u8
        if self.k == 0 || self.k > 255 {
            return Err(ExtractError::InvalidConfig(format!(
                "k must be in 1..=255, got {}",
                self.k
            )));
        }
        if self.max_samples == 0 {
            return Err(ExtractError::InvalidConfig("max_samples must be positive".into()));
        }
        if self.cluster_init_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "cluster_init_attempts must be positive".into(),
            ));
        }
        Ok(())
    }
}
