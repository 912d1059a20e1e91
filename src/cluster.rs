use std::collections::HashMap;

use kmeans_colors::get_kmeans;
use palette::Srgb;
use tracing::debug;

use crate::error::ExtractError;

const MAX_ITERATIONS: usize = 300;
const CONVERGENCE: f32 = 1e-4;

/// Result of partitioning a sample into `k` groups.
///
/// `centers[i]` is the mean color of cluster `i` in unit-range sRGB and
/// `counts[i]` the number of sample pixels assigned to it.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterSet {
    pub centers: Vec<Srgb<f32>>,
    pub counts: Vec<usize>,
}

impl ClusterSet {
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// Total number of assigned pixels.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Reject outputs a clustering backend should never produce.
    pub fn verify(&self, k: usize, sample_len: usize) -> Result<(), ExtractError> {
        if self.centers.len() != k || self.counts.len() != k {
            return Err(ExtractError::ComputationError(format!(
                "expected {k} clusters, got {} centers and {} counts",
                self.centers.len(),
                self.counts.len()
            )));
        }
        if let Some(i) = self
            .centers
            .iter()
            .position(|c| !(c.red.is_finite() && c.green.is_finite() && c.blue.is_finite()))
        {
            return Err(ExtractError::ComputationError(format!(
                "cluster {i} has a non-finite center"
            )));
        }
        if self.total() != sample_len {
            return Err(ExtractError::ComputationError(format!(
                "cluster counts sum to {} but the sample holds {sample_len} pixels",
                self.total()
            )));
        }
        Ok(())
    }
}

/// A clustering backend. `seed` pins every random choice the backend makes,
/// so identical inputs and seed give identical output.
pub trait Clusterer {
    fn cluster(
        &self,
        samples: &[Srgb<u8>],
        k: usize,
        attempts: usize,
        seed: u64,
    ) -> Result<ClusterSet, ExtractError>;
}

/// k-means from the `kmeans_colors` crate, run in sRGB space.
#[derive(Clone, Copy, Debug)]
pub struct KmeansColors {
    pub max_iterations: usize,
    pub convergence: f32,
}

impl Default for KmeansColors {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            convergence: CONVERGENCE,
        }
    }
}

impl Clusterer for KmeansColors {
    fn cluster(
        &self,
        samples: &[Srgb<u8>],
        k: usize,
        attempts: usize,
        seed: u64,
    ) -> Result<ClusterSet, ExtractError> {
        if samples.len() < k {
            return Err(ExtractError::InsufficientPixels { k, found: samples.len() });
        }

        // k-means++ seeding needs more distinct colors than clusters
        if let Some(exact) = exact_clusters(samples, k) {
            debug!(k, "sample has at most k distinct colors; skipping k-means");
            return Ok(exact);
        }

        let points: Vec<Srgb<f32>> = samples.iter().map(|c| c.into_format::<f32>()).collect();

        let mut best: Option<(f64, ClusterSet)> = None;
        for attempt in 0..attempts {
            let run_seed = seed.wrapping_add(attempt as u64);
            let Some((inertia, set)) = self.run_once(&points, k, run_seed) else {
                debug!(attempt, "k-means run produced non-finite centers");
                continue;
            };
            debug!(attempt, inertia, "k-means run finished");

            if best.as_ref().is_none_or(|(b, _)| inertia < *b) {
                best = Some((inertia, set));
            }
        }

        let (inertia, set) = best.ok_or_else(|| {
            ExtractError::ComputationError("no k-means run produced finite centers".into())
        })?;
        set.verify(k, samples.len())?;
        debug!(inertia, "kept tightest k-means run");
        Ok(set)
    }
}

impl KmeansColors {
    /// One seeded k-means run. Returns `None` when the run produced
    /// non-finite centers.
    fn run_once(&self, points: &[Srgb<f32>], k: usize, seed: u64) -> Option<(f64, ClusterSet)> {
        let run = get_kmeans(k, self.max_iterations, self.convergence, false, points, seed);
        settle(points, &run.centroids)
    }
}

/// Assign every point to its nearest centroid, then move each centroid to the
/// mean of its members. Reported centers are the means of the reported
/// members even for runs that stopped before converging. Also returns the
/// inertia.
fn settle(points: &[Srgb<f32>], centroids: &[Srgb<f32>]) -> Option<(f64, ClusterSet)> {
    let labels = assign(points, centroids)?;
    let centers = recenter(points, &labels, centroids);
    if centers.iter().any(|c| !(c.red.is_finite() && c.green.is_finite() && c.blue.is_finite())) {
        return None;
    }

    let mut counts = vec![0usize; centers.len()];
    let mut inertia = 0f64;
    for (p, &label) in points.iter().zip(&labels) {
        counts[label] += 1;
        inertia += squared_distance(p, &centers[label]) as f64;
    }

    Some((inertia, ClusterSet { centers, counts }))
}

fn squared_distance(a: &Srgb<f32>, b: &Srgb<f32>) -> f32 {
    let dr = a.red - b.red;
    let dg = a.green - b.green;
    let db = a.blue - b.blue;
    dr * dr + dg * dg + db * db
}

/// Label every point with its nearest center (lowest index on ties).
/// `None` if any distance is non-finite.
fn assign(points: &[Srgb<f32>], centers: &[Srgb<f32>]) -> Option<Vec<usize>> {
    let mut labels = Vec::with_capacity(points.len());

    for p in points {
        let mut best_idx = 0;
        let mut best_dist = f32::INFINITY;
        for (idx, c) in centers.iter().enumerate() {
            let dist = squared_distance(p, c);
            if dist < best_dist {
                best_dist = dist;
                best_idx = idx;
            }
        }
        if !best_dist.is_finite() {
            return None;
        }
        labels.push(best_idx);
    }

    Some(labels)
}

/// Mean of each labelled group. Empty groups keep their previous center.
fn recenter(points: &[Srgb<f32>], labels: &[usize], previous: &[Srgb<f32>]) -> Vec<Srgb<f32>> {
    let mut sums = vec![[0f64; 3]; previous.len()];
    let mut counts = vec![0usize; previous.len()];
    for (p, &label) in points.iter().zip(labels) {
        sums[label][0] += p.red as f64;
        sums[label][1] += p.green as f64;
        sums[label][2] += p.blue as f64;
        counts[label] += 1;
    }

    previous
        .iter()
        .zip(sums.iter().zip(&counts))
        .map(|(prev, (sum, &n))| {
            if n == 0 {
                *prev
            } else {
                let n = n as f64;
                Srgb::new((sum[0] / n) as f32, (sum[1] / n) as f32, (sum[2] / n) as f32)
            }
        })
        .collect()
}

/// Exact partition when the sample holds no more than `k` distinct colors:
/// one cluster per color in first-seen order, padded with empty clusters.
fn exact_clusters(samples: &[Srgb<u8>], k: usize) -> Option<ClusterSet> {
    let mut slot: HashMap<(u8, u8, u8), usize> = HashMap::new();
    let mut colors: Vec<Srgb<u8>> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();

    for c in samples {
        let key = (c.red, c.green, c.blue);
        match slot.get(&key) {
            Some(&i) => counts[i] += 1,
            None => {
                if colors.len() == k {
                    return None;
                }
                slot.insert(key, colors.len());
                colors.push(*c);
                counts.push(1);
            }
        }
    }

    let mut centers: Vec<Srgb<f32>> = colors.iter().map(|c| c.into_format::<f32>()).collect();
    let filler = *centers.first()?;
    centers.resize(k, filler);
    counts.resize(k, 0);

    Some(ClusterSet { centers, counts })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jittered(base: (u8, u8, u8), n: usize) -> Vec<Srgb<u8>> {
        (0..n)
            .map(|i| {
                let d = (i % 7) as u8;
                Srgb::new(base.0 + d, base.1 + d / 2, base.2 + (6 - d))
            })
            .collect()
    }

    #[test]
    fn counts_cover_every_sample() {
        let mut samples = jittered((180, 40, 40), 300);
        samples.extend(jittered((40, 180, 40), 150));
        samples.extend(jittered((40, 40, 180), 50));

        let set = KmeansColors::default().cluster(&samples, 3, 5, 42).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.total(), samples.len());

        let mut counts = set.counts.clone();
        counts.sort_unstable();
        assert_eq!(counts, vec![50, 150, 300]);
    }

    #[test]
    fn same_seed_same_clusters() {
        let mut samples = jittered((200, 60, 30), 120);
        samples.extend(jittered((30, 60, 200), 80));

        let a = KmeansColors::default().cluster(&samples, 2, 3, 7).unwrap();
        let b = KmeansColors::default().cluster(&samples, 2, 3, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn uniform_sample_pads_empty_clusters() {
        let samples = vec![Srgb::new(255u8, 255, 255); 40];
        let set = KmeansColors::default().cluster(&samples, 3, 5, 42).unwrap();
        assert_eq!(set.counts, vec![40, 0, 0]);
        assert_eq!(set.centers[0], Srgb::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn fewer_samples_than_clusters() {
        let samples = vec![Srgb::new(10u8, 20, 30), Srgb::new(40, 50, 60)];
        let err = KmeansColors::default().cluster(&samples, 5, 5, 42).unwrap_err();
        assert_eq!(err, ExtractError::InsufficientPixels { k: 5, found: 2 });
    }

    #[test]
    fn verify_flags_nan_centers() {
        let set = ClusterSet {
            centers: vec![Srgb::new(0.5, 0.5, 0.5), Srgb::new(f32::NAN, 0.0, 0.0)],
            counts: vec![3, 1],
        };
        assert!(matches!(set.verify(2, 4), Err(ExtractError::ComputationError(_))));
    }

    #[test]
    fn nearest_center_ties_go_to_lower_index() {
        let centers = vec![Srgb::new(0.0, 0.0, 0.0), Srgb::new(1.0, 0.0, 0.0)];
        let points = vec![Srgb::new(0.5, 0.0, 0.0)];
        assert_eq!(assign(&points, &centers), Some(vec![0]));
    }

    #[test]
    fn tightest_attempt_is_kept() {
        let mut samples = jittered((180, 40, 40), 200);
        samples.extend(jittered((40, 180, 40), 120));
        samples.extend(jittered((40, 40, 180), 90));
        samples.extend(jittered((150, 150, 40), 60));
        let points: Vec<Srgb<f32>> = samples.iter().map(|c| c.into_format::<f32>()).collect();

        let kmeans = KmeansColors::default();
        let seed = 11u64;
        let attempts = 6;

        let mut expected: Option<(f64, ClusterSet)> = None;
        for i in 0..attempts {
            let single = kmeans.cluster(&samples, 3, 1, seed + i as u64).unwrap();
            let (inertia, set) = kmeans.run_once(&points, 3, seed + i as u64).unwrap();
            assert_eq!(single, set);
            if expected.as_ref().is_none_or(|(b, _)| inertia < *b) {
                expected = Some((inertia, set));
            }
        }

        let best = kmeans.cluster(&samples, 3, attempts, seed).unwrap();
        assert_eq!(best, expected.unwrap().1);
    }

    #[test]
    fn recenter_averages_members_and_keeps_empty_centers() {
        let points = vec![
            Srgb::new(0.0, 0.2, 0.4),
            Srgb::new(0.2, 0.4, 0.6),
            Srgb::new(1.0, 1.0, 1.0),
        ];
        let previous = vec![
            Srgb::new(0.5, 0.5, 0.5),
            Srgb::new(0.9, 0.9, 0.9),
            Srgb::new(0.3, 0.3, 0.3),
        ];
        let centers = recenter(&points, &[0, 0, 1], &previous);

        assert!((centers[0].red - 0.1).abs() < 1e-6);
        assert!((centers[0].green - 0.3).abs() < 1e-6);
        assert!((centers[0].blue - 0.5).abs() < 1e-6);
        assert_eq!(centers[1], Srgb::new(1.0, 1.0, 1.0));
        assert_eq!(centers[2], previous[2]);
    }

    #[test]
    fn stale_centroids_are_moved_to_member_means() {
        let points = vec![
            Srgb::new(0.1, 0.1, 0.1),
            Srgb::new(0.3, 0.1, 0.1),
            Srgb::new(0.8, 0.8, 0.8),
            Srgb::new(0.9, 0.7, 0.8),
        ];
        // Off-center, as left by a run cut short
        let centroids = vec![
            Srgb::new(0.0, 0.0, 0.0),
            Srgb::new(1.0, 1.0, 1.0),
            Srgb::new(5.0, 5.0, 5.0),
        ];

        let (inertia, set) = settle(&points, &centroids).unwrap();
        assert_eq!(set.counts, vec![2, 2, 0]);
        assert!((set.centers[0].red - 0.2).abs() < 1e-6);
        assert!((set.centers[0].green - 0.1).abs() < 1e-6);
        assert!((set.centers[1].red - 0.85).abs() < 1e-6);
        assert!((set.centers[1].green - 0.75).abs() < 1e-6);
        assert_eq!(set.centers[2], centroids[2]);
        // 0.01 * 2 + 0.005 * 2
        assert!((inertia - 0.03).abs() < 1e-5);
    }
}
