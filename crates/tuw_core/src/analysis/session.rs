//! Per-file run analysis
//!
//! Groups a file's runs by room, clusters each room independently and
//! collects the run indices that cluster-based and long-fail conditions
//! consult. A room whose clustering fails is left out of cluster-derived
//! results only.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::density::PointClusterer;
use super::groups::RoomClusters;
use crate::config::{ClusterConfig, ExtractConfig};
use crate::runs::{extract_runs, Run};
use crate::telemetry::StateDump;

/// A cluster within a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterKey {
    pub room: String,
    pub label: i32,
}

/// What one room contributed, computed independently of other rooms
struct RoomOutcome {
    clusters: Option<RoomClusters>,
    representatives: Vec<(usize, ClusterKey)>,
    long_fail: Option<usize>,
}

pub struct SessionAnalysis<'a> {
    runs: Vec<Run<'a>>,
    /// Rooms in order of first appearance
    rooms: Vec<&'a str>,
    room_runs: HashMap<&'a str, Vec<usize>>,
    clusters: Vec<RoomClusters>,
    cluster_keys: HashMap<usize, Vec<ClusterKey>>,
    /// Representative run index → the clusters it was chosen for
    representatives: BTreeMap<usize, Vec<ClusterKey>>,
    long_fails: BTreeSet<usize>,
}

impl<'a> SessionAnalysis<'a> {
    pub fn new(runs: Vec<Run<'a>>, config: &ClusterConfig, clusterer: &dyn PointClusterer) -> Self {
        let mut rooms: Vec<&'a str> = Vec::new();
        let mut room_runs: HashMap<&'a str, Vec<usize>> = HashMap::new();

        for (index, run) in runs.iter().enumerate() {
            for &room in run.room_order() {
                let members = room_runs.entry(room).or_insert_with(|| {
                    rooms.push(room);
                    Vec::new()
                });
                if members.last() != Some(&index) {
                    members.push(index);
                }
            }
        }

        let analyse = |room: &&'a str| analyse_room(room, &room_runs[*room], &runs, config, clusterer);
        let outcomes: Vec<RoomOutcome> = if config.parallel {
            rooms.par_iter().map(analyse).collect()
        } else {
            rooms.iter().map(analyse).collect()
        };

        let mut analysis = SessionAnalysis {
            runs: Vec::new(),
            rooms: Vec::new(),
            room_runs: HashMap::new(),
            clusters: Vec::new(),
            cluster_keys: HashMap::new(),
            representatives: BTreeMap::new(),
            long_fails: BTreeSet::new(),
        };

        for outcome in outcomes {
            for (index, key) in outcome.representatives {
                analysis.representatives.entry(index).or_default().push(key);
            }
            analysis.long_fails.extend(outcome.long_fail);

            if let Some(clusters) = outcome.clusters {
                for &index in &room_runs[clusters.room.as_str()] {
                    if let Some(label) = clusters.label_of(index) {
                        analysis
                            .cluster_keys
                            .entry(index)
                            .or_default()
                            .push(ClusterKey { room: clusters.room.clone(), label });
                    }
                }
                analysis.clusters.push(clusters);
            }
        }

        log::debug!(
            "{} rooms, {} clustered, {} representatives, {} long fails",
            rooms.len(),
            analysis.clusters.len(),
            analysis.representatives.len(),
            analysis.long_fails.len()
        );

        analysis.runs = runs;
        analysis.rooms = rooms;
        analysis.room_runs = room_runs;
        analysis
    }

    /// Segment a loaded dump with the configured policy and analyse it.
    pub fn from_dump(dump: &'a StateDump, config: &ExtractConfig, clusterer: &dyn PointClusterer) -> Self {
        let runs = extract_runs(&dump.states, config.policy);
        log::info!(
            "{} runs from {} states ({})",
            runs.len(),
            dump.len(),
            dump.map.as_deref().unwrap_or("unknown map")
        );
        Self::new(runs, &config.cluster, clusterer)
    }

    pub fn runs(&self) -> &[Run<'a>] {
        &self.runs
    }

    pub fn rooms(&self) -> &[&'a str] {
        &self.rooms
    }

    /// Indices of runs that visit `room`
    pub fn room_runs(&self, room: &str) -> &[usize] {
        self.room_runs.get(room).map_or(&[], Vec::as_slice)
    }

    /// Rooms that clustered successfully, in first-appearance order
    pub fn room_clusters(&self) -> &[RoomClusters] {
        &self.clusters
    }

    /// Clusters a run belongs to, one per clustered room it visits
    pub fn cluster_keys(&self, index: usize) -> &[ClusterKey] {
        self.cluster_keys.get(&index).map_or(&[], Vec::as_slice)
    }

    pub fn is_representative(&self, index: usize) -> bool {
        self.representatives.contains_key(&index)
    }

    /// Clusters a run was chosen to represent; empty unless it is one
    pub fn represented_clusters(&self, index: usize) -> &[ClusterKey] {
        self.representatives.get(&index).map_or(&[], Vec::as_slice)
    }

    pub fn representatives(&self) -> &BTreeMap<usize, Vec<ClusterKey>> {
        &self.representatives
    }

    pub fn is_long_fail(&self, index: usize) -> bool {
        self.long_fails.contains(&index)
    }

    pub fn long_fails(&self) -> &BTreeSet<usize> {
        &self.long_fails
    }
}

fn analyse_room(
    room: &str,
    members: &[usize],
    runs: &[Run<'_>],
    config: &ClusterConfig,
    clusterer: &dyn PointClusterer,
) -> RoomOutcome {
    let indexed: Vec<(usize, &Run)> = members.iter().map(|&i| (i, &runs[i])).collect();

    let (clusters, representatives) =
        match RoomClusters::build(room, &indexed, config.feature_lead, clusterer) {
            Ok(clusters) => {
                let n = config.representatives_for(clusters.cluster_count());
                let best: Vec<(usize, ClusterKey)> = clusters
                    .representatives(n, config.selection)
                    .into_iter()
                    .map(|(label, run)| (run, ClusterKey { room: room.to_string(), label }))
                    .collect();
                log::debug!("Room {}: {} clusters, {} representatives", room, clusters.cluster_count(), best.len());
                (Some(clusters), best)
            }
            Err(err) => {
                log::warn!("Skipping clusters for room {}: {}", room, err);
                (None, Vec::new())
            }
        };

    // Longest attempt among runs that never left the room
    let single_room: Vec<(usize, &Run)> =
        indexed.into_iter().filter(|(_, run)| run.rooms().len() == 1).collect();
    let long_fail = if single_room.len() >= config.long_fail_min_runs {
        single_room
            .iter()
            .fold(None::<(usize, f64)>, |best, &(index, run)| {
                let length = run.path_length();
                match best {
                    Some((_, best_length)) if best_length >= length => best,
                    _ => Some((index, length)),
                }
            })
            .map(|(index, _)| index)
    } else {
        None
    };

    RoomOutcome { clusters, representatives, long_fail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::density::DensityClusterer;
    use crate::telemetry::GameState;

    fn make_state(seq: u32, room: &str, x: f32, y: f32) -> GameState {
        GameState {
            sequence: seq,
            timestamp: seq as f64,
            room: room.to_string(),
            xpos: x,
            ypos: y,
            ..Default::default()
        }
    }

    /// Two-state run in `room` moving from `(x, 0)` to `(x, len)`
    fn run_states(seq: u32, room: &str, x: f32, len: f32) -> Vec<GameState> {
        vec![make_state(seq, room, x, 0.0), make_state(seq + 1, room, x, len)]
    }

    #[test]
    fn test_room_map_first_appearance_order() {
        let states: Vec<Vec<GameState>> = vec![
            run_states(0, "b", 0.0, 1.0),
            vec![make_state(2, "a", 0.0, 0.0), make_state(3, "b", 0.0, 1.0), make_state(4, "c", 0.0, 2.0)],
            run_states(5, "c", 0.0, 1.0),
        ];
        let runs: Vec<Run> = states.iter().map(Run::from_states).collect();

        let analysis = SessionAnalysis::new(runs, &ClusterConfig::default(), &DensityClusterer::default());
        assert_eq!(analysis.rooms(), &["b", "a", "c"]);
        assert_eq!(analysis.room_runs("b"), &[0, 1]);
        assert_eq!(analysis.room_runs("c"), &[1, 2]);
        assert!(analysis.room_runs("z").is_empty());
    }

    #[test]
    fn test_failed_room_is_skipped() {
        // Room "a" has one run, too few to cluster; "b" clusters
        let mut states = vec![run_states(0, "a", 0.0, 1.0)];
        for i in 0..3 {
            states.push(run_states(10 + i * 2, "b", i as f32 * 0.1, 1.0));
        }
        for i in 0..3 {
            states.push(run_states(30 + i * 2, "b", 500.0 + i as f32 * 0.1, 1.0));
        }
        let runs: Vec<Run> = states.iter().map(Run::from_states).collect();

        let analysis = SessionAnalysis::new(runs, &ClusterConfig::default(), &DensityClusterer::default());
        assert_eq!(analysis.room_clusters().len(), 1);
        assert_eq!(analysis.room_clusters()[0].room, "b");
        assert!(analysis.cluster_keys(0).is_empty());
        assert_eq!(analysis.cluster_keys(1).len(), 1);
        assert_ne!(analysis.cluster_keys(1)[0], analysis.cluster_keys(4)[0]);
        assert_eq!(analysis.cluster_keys(1)[0], analysis.cluster_keys(2)[0]);
    }

    #[test]
    fn test_representatives_follow_divisor() {
        let mut states = Vec::new();
        for i in 0..3 {
            states.push(run_states(i * 2, "a", i as f32 * 0.1, 1.0));
        }
        for i in 0..3 {
            states.push(run_states(100 + i * 2, "a", 900.0 + i as f32 * 0.1, 1.0));
        }
        let runs: Vec<Run> = states.iter().map(Run::from_states).collect();

        let config = ClusterConfig { representative_divisor: 1, ..Default::default() };
        let analysis = SessionAnalysis::new(runs, &config, &DensityClusterer::default());
        assert_eq!(analysis.representatives().len(), 2);

        // Two clusters with the default divisor give no representatives
        let runs: Vec<Run> = states.iter().map(Run::from_states).collect();
        let analysis = SessionAnalysis::new(runs, &ClusterConfig::default(), &DensityClusterer::default());
        assert!(analysis.representatives().is_empty());
    }

    #[test]
    fn test_long_fail_needs_enough_single_room_runs() {
        let states: Vec<Vec<GameState>> =
            (0..10).map(|i| run_states(i * 2, "a", 0.0, if i == 6 { 9.0 } else { 1.0 })).collect();

        let runs: Vec<Run> = states.iter().map(Run::from_states).collect();
        let analysis = SessionAnalysis::new(runs, &ClusterConfig::default(), &DensityClusterer::default());
        assert_eq!(analysis.long_fails().iter().copied().collect::<Vec<_>>(), vec![6]);
        assert!(analysis.is_long_fail(6));

        let runs: Vec<Run> = states[..9].iter().map(Run::from_states).collect();
        let analysis = SessionAnalysis::new(runs, &ClusterConfig::default(), &DensityClusterer::default());
        assert!(analysis.long_fails().is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut states = Vec::new();
        for (r, room) in ["a", "b", "c"].iter().enumerate() {
            for i in 0..4u32 {
                let x = (if i < 2 { 0.0 } else { 300.0 }) + r as f32;
                states.push(run_states(r as u32 * 100 + i * 2, room, x, 1.0));
            }
        }

        let sequential = {
            let runs: Vec<Run> = states.iter().map(Run::from_states).collect();
            let config = ClusterConfig { representative_divisor: 1, ..Default::default() };
            let analysis = SessionAnalysis::new(runs, &config, &DensityClusterer::default());
            (analysis.representatives().clone(), (0..12).map(|i| analysis.cluster_keys(i).to_vec()).collect::<Vec<_>>())
        };
        let parallel = {
            let runs: Vec<Run> = states.iter().map(Run::from_states).collect();
            let config = ClusterConfig { representative_divisor: 1, parallel: true, ..Default::default() };
            let analysis = SessionAnalysis::new(runs, &config, &DensityClusterer::default());
            (analysis.representatives().clone(), (0..12).map(|i| analysis.cluster_keys(i).to_vec()).collect::<Vec<_>>())
        };

        assert_eq!(sequential, parallel);
    }
}
