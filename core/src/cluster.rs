//! AnomalyClusterer: unsupervised grouping of signal vectors with a
//! distance-based outlier label.
//!
//! ALGORITHM:
//!   1. z-score every feature over the population (zero-variance features
//!      contribute nothing).
//!   2. Seeded k-means++ with `restarts` independent runs; Lloyd
//!      iterations until assignments settle or `max_iterations`.
//!      The lowest-inertia run wins; ties keep the earliest run.
//!   3. Cluster ids are renumbered by first appearance in account-id order.
//!   4. Accounts whose nearest-centroid distance is strictly above the
//!      `outlier_percentile` (nearest-rank) of all distances are labelled
//!      Outlier.
//!
//! Same population + same seed ⇒ same assignments. The seed is logged.

use crate::{
    config::{ClusteringConfig, EngineConfig},
    error::{RiskError, RiskResult},
    rng::{RngBank, StageRng, StageSlot},
    signal::{AccountSignalVector, FEATURE_COUNT},
    types::AccountId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

type Point = [f64; FEATURE_COUNT];

const MIN_STD: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterLabel {
    Cluster(usize),
    Outlier,
}

impl ClusterLabel {
    pub fn is_outlier(&self) -> bool {
        matches!(self, Self::Outlier)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub account_id: AccountId,
    pub label: ClusterLabel,
    /// Nearest cluster, kept for outliers too.
    pub nearest_cluster: usize,
    /// Euclidean distance to the nearest centroid in z-score space.
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub members: usize,
    pub outliers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringOutcome {
    pub seed: u64,
    pub k: usize,
    pub inertia: f64,
    pub distance_threshold: f64,
    pub outlier_count: usize,
    pub centroids: Vec<Point>,
    pub summary: Vec<ClusterSummary>,
    pub assignments: BTreeMap<AccountId, ClusterAssignment>,
}

impl ClusteringOutcome {
    fn empty(seed: u64) -> Self {
        Self {
            seed,
            k: 0,
            inertia: 0.0,
            distance_threshold: 0.0,
            outlier_count: 0,
            centroids: Vec::new(),
            summary: Vec::new(),
            assignments: BTreeMap::new(),
        }
    }

    pub fn outliers(&self) -> impl Iterator<Item = &AccountId> {
        self.assignments
            .values()
            .filter(|a| a.label.is_outlier())
            .map(|a| &a.account_id)
    }
}

pub struct AnomalyClusterer {
    config: ClusteringConfig,
    outlier_percentile: f64,
}

struct KMeansRun {
    centroids: Vec<Point>,
    labels: Vec<usize>,
    inertia: f64,
}

impl AnomalyClusterer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.clustering.clone(),
            outlier_percentile: config.outlier_percentile,
        }
    }

    pub fn cluster(
        &self,
        vectors: &BTreeMap<AccountId, AccountSignalVector>,
    ) -> RiskResult<ClusteringOutcome> {
        let seed = self.config.seed;
        log::debug!(
            "clustering {} accounts: k<={} seed={} restarts={}",
            vectors.len(),
            self.config.cluster_count,
            seed,
            self.config.restarts
        );
        if vectors.is_empty() {
            return Ok(ClusteringOutcome::empty(seed));
        }

        let ids: Vec<&AccountId> = vectors.keys().collect();
        let raw: Vec<Point> = vectors.values().map(|v| v.feature_vector()).collect();
        if let Some(i) = raw.iter().position(|p| p.iter().any(|x| !x.is_finite())) {
            return Err(RiskError::Clustering(format!(
                "non-finite signal value for account {}",
                ids[i]
            )));
        }

        let points = normalize(&raw);
        let k = self.config.cluster_count.min(distinct_count(&points));

        let mut rng = RngBank::new(seed).for_stage(StageSlot::Clustering);
        let mut best: Option<KMeansRun> = None;
        for _ in 0..self.config.restarts {
            let run = self.kmeans(&points, k, &mut rng);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        let best = best.ok_or_else(|| RiskError::Clustering("no k-means run".into()))?;
        let (centroids, labels) = canonical_order(best.centroids, &best.labels);

        let distances: Vec<f64> = points
            .iter()
            .zip(&labels)
            .map(|(p, &c)| sq_dist(p, &centroids[c]).sqrt())
            .collect();
        let threshold = percentile_nearest_rank(&distances, self.outlier_percentile);

        let mut summary: Vec<ClusterSummary> = (0..centroids.len())
            .map(|cluster_id| ClusterSummary {
                cluster_id,
                members: 0,
                outliers: 0,
            })
            .collect();
        let mut assignments = BTreeMap::new();
        for ((id, &cluster), &distance) in ids.iter().zip(&labels).zip(&distances) {
            let label = if distance > threshold {
                summary[cluster].outliers += 1;
                ClusterLabel::Outlier
            } else {
                ClusterLabel::Cluster(cluster)
            };
            summary[cluster].members += 1;
            assignments.insert(
                (*id).clone(),
                ClusterAssignment {
                    account_id: (*id).clone(),
                    label,
                    nearest_cluster: cluster,
                    distance,
                },
            );
        }
        let outlier_count = summary.iter().map(|s| s.outliers).sum();
        let k = centroids.len();

        log::info!(
            "clustering: k={} inertia={:.4} threshold={:.4} outliers={}",
            k,
            best.inertia,
            threshold,
            outlier_count
        );

        Ok(ClusteringOutcome {
            seed,
            k,
            inertia: best.inertia,
            distance_threshold: threshold,
            outlier_count,
            centroids,
            summary,
            assignments,
        })
    }

    fn kmeans(&self, points: &[Point], k: usize, rng: &mut StageRng) -> KMeansRun {
        let mut centroids = kmeans_plus_plus(points, k, rng);
        let mut labels = vec![usize::MAX; points.len()];

        for _ in 0..self.config.max_iterations {
            if !assign(points, &centroids, &mut labels) {
                break;
            }

            let mut sums = vec![[0.0; FEATURE_COUNT]; k];
            let mut counts = vec![0usize; k];
            for (p, &c) in points.iter().zip(&labels) {
                counts[c] += 1;
                for (s, x) in sums[c].iter_mut().zip(p) {
                    *s += x;
                }
            }
            for ((centroid, sum), &n) in centroids.iter_mut().zip(&sums).zip(&counts) {
                // Empty cluster keeps its previous centroid.
                if n > 0 {
                    for (c, s) in centroid.iter_mut().zip(sum) {
                        *c = s / n as f64;
                    }
                }
            }
        }

        // The last update may have moved centroids; labels follow them.
        assign(points, &centroids, &mut labels);

        let inertia = points
            .iter()
            .zip(&labels)
            .map(|(p, &c)| sq_dist(p, &centroids[c]))
            .sum();
        KMeansRun {
            centroids,
            labels,
            inertia,
        }
    }
}

/// z-score each dimension over the population.
fn normalize(raw: &[Point]) -> Vec<Point> {
    let n = raw.len() as f64;
    let mut mean = [0.0; FEATURE_COUNT];
    for p in raw {
        for (m, x) in mean.iter_mut().zip(p) {
            *m += x / n;
        }
    }
    let mut std = [0.0; FEATURE_COUNT];
    for p in raw {
        for ((s, x), m) in std.iter_mut().zip(p).zip(&mean) {
            *s += (x - m).powi(2) / n;
        }
    }
    for s in std.iter_mut() {
        *s = s.sqrt();
    }

    raw.iter()
        .map(|p| {
            let mut z = [0.0; FEATURE_COUNT];
            for d in 0..FEATURE_COUNT {
                if std[d] > MIN_STD {
                    z[d] = (p[d] - mean[d]) / std[d];
                }
            }
            z
        })
        .collect()
}

fn distinct_count(points: &[Point]) -> usize {
    points
        .iter()
        .map(|p| p.map(f64::to_bits))
        .collect::<BTreeSet<_>>()
        .len()
}

fn sq_dist(a: &Point, b: &Point) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Ties go to the lowest index.
fn nearest_centroid(p: &Point, centroids: &[Point]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = sq_dist(p, c);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

/// Move every point to its nearest centroid. Returns whether any moved.
fn assign(points: &[Point], centroids: &[Point], labels: &mut [usize]) -> bool {
    let mut changed = false;
    for (label, p) in labels.iter_mut().zip(points) {
        let nearest = nearest_centroid(p, centroids);
        if *label != nearest {
            *label = nearest;
            changed = true;
        }
    }
    changed
}

fn kmeans_plus_plus(points: &[Point], k: usize, rng: &mut StageRng) -> Vec<Point> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(*rng.pick(points));
    while centroids.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| sq_dist(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        centroids.push(points[rng.weighted_index(&weights)]);
    }
    centroids
}

/// Renumber clusters by first appearance so labels do not depend on
/// which restart won.
fn canonical_order(centroids: Vec<Point>, labels: &[usize]) -> (Vec<Point>, Vec<usize>) {
    let mut remap: Vec<Option<usize>> = vec![None; centroids.len()];
    let mut order = Vec::with_capacity(centroids.len());
    for &l in labels {
        if remap[l].is_none() {
            remap[l] = Some(order.len());
            order.push(l);
        }
    }
    // Clusters left empty after the final update are dropped.
    let reordered = order.iter().map(|&old| centroids[old]).collect();
    let relabelled = labels
        .iter()
        .map(|&l| remap[l].unwrap_or_default())
        .collect();
    (reordered, relabelled)
}

/// Nearest-rank percentile of `values` (p in (0, 100)).
pub fn percentile_nearest_rank(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
