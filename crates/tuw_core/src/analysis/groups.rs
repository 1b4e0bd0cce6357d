//! Per-room trajectory grouping
//!
//! Runs sharing a room are reduced to 5-dimensional feature points
//! `(lead, end x, end y, start x, start y)` and handed to a
//! [`PointClusterer`]. The result is kept keyed by run index.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::density::{Clustering, PointClusterer, NOISE};
use crate::error::ClusterError;
use crate::runs::Run;

/// First feature coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureLead {
    #[default]
    PathLength,
    Index,
}

/// How a cluster's representative is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepresentativeMetric {
    /// Squared distance of the feature point to the cluster centroid
    #[default]
    Centroid,
    /// Lowest first-state sequence number
    EarliestSequence,
}

/// Feature point of a run. The end position is the death state's when one
/// was recorded, else the final state's.
pub fn run_features(run: &Run<'_>, index: usize, lead: FeatureLead) -> Vec<f64> {
    let lead = match lead {
        FeatureLead::PathLength => run.path_length(),
        FeatureLead::Index => index as f64,
    };
    let (end_x, end_y) = run.end_state().map(|s| s.position()).unwrap_or_default();
    let (start_x, start_y) = run.spawn().unwrap_or_default();

    vec![lead, end_x as f64, end_y as f64, start_x as f64, start_y as f64]
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[derive(Debug, Clone)]
pub struct RoomClusters {
    pub room: String,
    /// Run indices, parallel to `features`
    runs: Vec<usize>,
    features: Vec<Vec<f64>>,
    sequences: Vec<u32>,
    clustering: Clustering,
    /// (label, member count), largest first
    ranked: Vec<(i32, usize)>,
}

impl RoomClusters {
    /// Cluster `runs` (pairs of run index and run) belonging to `room`.
    pub fn build(
        room: &str,
        runs: &[(usize, &Run<'_>)],
        lead: FeatureLead,
        clusterer: &dyn PointClusterer,
    ) -> Result<Self, ClusterError> {
        let features: Vec<Vec<f64>> =
            runs.iter().map(|&(index, run)| run_features(run, index, lead)).collect();
        let clustering = clusterer.cluster(&features)?;

        if clustering.labels.len() != features.len() {
            return Err(ClusterError::Degenerate(format!(
                "{} labels returned for {} points",
                clustering.labels.len(),
                features.len()
            )));
        }

        let mut ranked: Vec<(i32, usize)> = (0..clustering.cluster_count() as i32)
            .map(|label| (label, clustering.members(label).count()))
            .filter(|&(_, size)| size > 0)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(Self {
            room: room.to_string(),
            runs: runs.iter().map(|&(index, _)| index).collect(),
            features,
            sequences: runs
                .iter()
                .map(|(_, run)| run.first().map_or(u32::MAX, |s| s.sequence))
                .collect(),
            clustering,
            ranked,
        })
    }

    pub fn cluster_count(&self) -> usize {
        self.ranked.len()
    }

    /// (label, member count), largest cluster first
    pub fn ranked_clusters(&self) -> &[(i32, usize)] {
        &self.ranked
    }

    /// Cluster label of a run; `None` for noise or runs outside this room.
    pub fn label_of(&self, run_index: usize) -> Option<i32> {
        let pos = self.runs.iter().position(|&r| r == run_index)?;
        Some(self.clustering.labels[pos]).filter(|&l| l != NOISE)
    }

    pub fn features_of(&self, run_index: usize) -> Option<&[f64]> {
        let pos = self.runs.iter().position(|&r| r == run_index)?;
        Some(&self.features[pos])
    }

    /// One representative run index per cluster, for at most `n` clusters in
    /// descending size order. Noise is never a candidate.
    pub fn best_runs(&self, n: usize, metric: RepresentativeMetric) -> Vec<usize> {
        self.representatives(n, metric).into_iter().map(|(_, run)| run).collect()
    }

    /// Like [`best_runs`](Self::best_runs), paired with the cluster label
    /// each run represents.
    pub fn representatives(&self, n: usize, metric: RepresentativeMetric) -> Vec<(i32, usize)> {
        self.ranked
            .iter()
            .take(n)
            .filter_map(|&(label, _)| self.representative(label, metric).map(|run| (label, run)))
            .collect()
    }

    fn representative(&self, label: i32, metric: RepresentativeMetric) -> Option<usize> {
        let centroid = self.clustering.centroid(label);

        let score = |pos: usize| -> f64 {
            match (metric, centroid) {
                (RepresentativeMetric::Centroid, Some(c)) => squared_distance(&self.features[pos], c),
                _ => self.sequences[pos] as f64,
            }
        };

        self.clustering
            .members(label)
            .min_by(|&a, &b| {
                score(a)
                    .partial_cmp(&score(b))
                    .unwrap_or(Ordering::Equal)
                    .then(self.sequences[a].cmp(&self.sequences[b]))
                    .then(self.runs[a].cmp(&self.runs[b]))
            })
            .map(|pos| self.runs[pos])
    }
}
