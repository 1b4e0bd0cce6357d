//! Run classification
//!
//! Decides, per run of one file, which conditions make it worth exporting.
//! Conditions are independent; every matching one is recorded.
//!
//! Cluster coverage works in two passes: the first pass evaluates all other
//! conditions and marks the clusters its selections belong to; the second
//! pass adds cluster representatives whose cluster nothing selected yet.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::session::{ClusterKey, SessionAnalysis};
use crate::config::ExtractConfig;
use crate::runs::Run;
use crate::telemetry::StateChangeFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    RoomChange,
    StateChange,
    Collection,
    SpawnChangeNext,
    SpawnChangePrev,
    LongFail,
    Numbers,
    Cluster,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 8] = [
        ConditionKind::RoomChange,
        ConditionKind::StateChange,
        ConditionKind::Collection,
        ConditionKind::SpawnChangeNext,
        ConditionKind::SpawnChangePrev,
        ConditionKind::LongFail,
        ConditionKind::Numbers,
        ConditionKind::Cluster,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ConditionKind::RoomChange => "room change",
            ConditionKind::StateChange => "state change",
            ConditionKind::Collection => "collection",
            ConditionKind::SpawnChangeNext => "spawn change next",
            ConditionKind::SpawnChangePrev => "spawn change prev",
            ConditionKind::LongFail => "long fail",
            ConditionKind::Numbers => "numbers",
            ConditionKind::Cluster => "cluster",
        }
    }
}

/// A selected run and the reasons it was selected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInclusion {
    pub index: usize,
    pub conditions: BTreeSet<ConditionKind>,
}

/// One line of the summary table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub name: String,
    pub count: usize,
    pub unique: usize,
}

/// Condition tallies, mergeable across files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    /// Runs matching each condition
    pub counts: BTreeMap<ConditionKind, usize>,
    /// Runs matching that condition and nothing else
    pub unique_counts: BTreeMap<ConditionKind, usize>,
    pub total_runs: usize,
    pub exported_runs: usize,
}

impl ExtractionSummary {
    fn record(&mut self, conditions: &BTreeSet<ConditionKind>) {
        for &kind in conditions {
            *self.counts.entry(kind).or_insert(0) += 1;
        }
        if conditions.len() == 1 {
            if let Some(&only) = conditions.first() {
                *self.unique_counts.entry(only).or_insert(0) += 1;
            }
        }
        self.exported_runs += 1;
    }

    pub fn merge(&mut self, other: &ExtractionSummary) {
        for (&kind, &count) in &other.counts {
            *self.counts.entry(kind).or_insert(0) += count;
        }
        for (&kind, &count) in &other.unique_counts {
            *self.unique_counts.entry(kind).or_insert(0) += count;
        }
        self.total_runs += other.total_runs;
        self.exported_runs += other.exported_runs;
    }

    pub fn count(&self, kind: ConditionKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn unique_count(&self, kind: ConditionKind) -> usize {
        self.unique_counts.get(&kind).copied().unwrap_or(0)
    }

    /// "Total Runs" (exported, total) first, then every condition that
    /// matched at least once.
    pub fn rows(&self) -> Vec<SummaryRow> {
        let mut rows = vec![SummaryRow {
            name: "Total Runs".to_string(),
            count: self.exported_runs,
            unique: self.total_runs,
        }];

        rows.extend(ConditionKind::ALL.iter().filter(|k| self.count(**k) > 0).map(|&kind| SummaryRow {
            name: kind.label().to_string(),
            count: self.count(kind),
            unique: self.unique_count(kind),
        }));

        rows
    }
}

/// Selected runs of one file, in run order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub inclusions: Vec<RunInclusion>,
    pub summary: ExtractionSummary,
}

impl Extraction {
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.inclusions.iter().map(|inc| inc.index)
    }

    pub fn is_empty(&self) -> bool {
        self.inclusions.is_empty()
    }
}

/// Whether the run's state-change union matches the configured mask.
///
/// With a non-empty whitelist and the `session_flag` bit in the mask, the
/// run matches only when one of its changed session flags is whitelisted,
/// whatever other masked bits it carries.
fn state_change_matches(run: &Run<'_>, config: &ExtractConfig) -> bool {
    let mask = config.state_change_flags();
    let hits = run.state_change_flags() & mask;

    if hits.is_empty() {
        return false;
    }
    if config.flag_whitelist.is_empty() || !mask.contains(StateChangeFlags::SESSION_FLAG) {
        return true;
    }

    run.session_changes().changed().any(|name| config.flag_whitelist.iter().any(|w| w == name))
}

fn first_pass_conditions(
    analysis: &SessionAnalysis<'_>,
    index: usize,
    config: &ExtractConfig,
) -> BTreeSet<ConditionKind> {
    let runs = analysis.runs();
    let run = &runs[index];
    let enabled = &config.conditions;
    let mut conditions = BTreeSet::new();

    if enabled.room_change && (run.rooms().len() > 1 || index == 0 || index + 1 == runs.len()) {
        conditions.insert(ConditionKind::RoomChange);
    }

    if enabled.state_change && state_change_matches(run, config) {
        conditions.insert(ConditionKind::StateChange);
    }

    if enabled.collection && run.collection_flags().intersects(config.collection_flags()) {
        conditions.insert(ConditionKind::Collection);
    }

    if enabled.spawn_change {
        if runs.get(index + 1).is_some_and(|next| !run.match_spawn(next)) {
            conditions.insert(ConditionKind::SpawnChangeNext);
        }

        // Looking back only counts when the run carries the respawn bit
        let previous = index.checked_sub(1).map(|i| &runs[i]);
        if previous.is_some_and(|prev| !run.match_spawn(prev))
            && run.state_change_flags().contains(StateChangeFlags::RESPAWN)
        {
            conditions.insert(ConditionKind::SpawnChangePrev);
        }
    }

    if enabled.long_fail && analysis.is_long_fail(index) {
        conditions.insert(ConditionKind::LongFail);
    }

    if enabled.numbers && run.death_count().is_some_and(|d| config.numbers.contains(&d)) {
        conditions.insert(ConditionKind::Numbers);
    }

    conditions
}

/// Classify every run of one analysed file.
pub fn classify(analysis: &SessionAnalysis<'_>, config: &ExtractConfig) -> Extraction {
    let mut summary = ExtractionSummary {
        total_runs: analysis.runs().len(),
        ..Default::default()
    };
    let mut inclusions = Vec::new();
    let mut extant: HashSet<&ClusterKey> = HashSet::new();

    for index in 0..analysis.runs().len() {
        let conditions = first_pass_conditions(analysis, index, config);
        if conditions.is_empty() {
            continue;
        }

        extant.extend(analysis.cluster_keys(index));
        summary.record(&conditions);

        // Representatives already covered by other conditions still count
        if config.conditions.clusters && analysis.is_representative(index) {
            *summary.counts.entry(ConditionKind::Cluster).or_insert(0) += 1;
        }

        inclusions.push(RunInclusion { index, conditions });
    }

    if config.conditions.clusters {
        for (&index, represented) in analysis.representatives() {
            if represented.iter().all(|key| extant.contains(key)) {
                continue;
            }

            extant.extend(analysis.cluster_keys(index));
            let conditions = BTreeSet::from([ConditionKind::Cluster]);
            summary.record(&conditions);
            inclusions.push(RunInclusion { index, conditions });
        }
    }

    inclusions.sort_by_key(|inc| inc.index);

    if inclusions.is_empty() {
        log::info!("No runs selected out of {}", summary.total_runs);
    } else {
        log::info!("{} of {} runs selected", inclusions.len(), summary.total_runs);
    }

    Extraction { inclusions, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::density::{Clustering, PointClusterer};
    use crate::config::{ClusterConfig, EnabledConditions};
    use crate::error::ClusterError;
    use crate::telemetry::{CollectionFlags, GameState, Trailer};

    /// Puts every point of a room into one cluster
    struct SingleCluster;

    impl PointClusterer for SingleCluster {
        fn cluster(&self, points: &[Vec<f64>]) -> Result<Clustering, ClusterError> {
            if points.len() < 2 {
                return Err(ClusterError::InsufficientData { points: points.len(), required: 2 });
            }
            let centroid: Vec<f64> = (0..points[0].len())
                .map(|d| points.iter().map(|p| p[d]).sum::<f64>() / points.len() as f64)
                .collect();
            Ok(Clustering { labels: vec![0; points.len()], centroids: vec![centroid] })
        }
    }

    fn make_state(seq: u32, room: &str, x: f32, deaths: i32) -> GameState {
        GameState {
            sequence: seq,
            timestamp: seq as f64,
            room: room.to_string(),
            xpos: x,
            deaths,
            ..Default::default()
        }
    }

    /// One two-state run per (room, x), all at distinct spawns
    fn fixture(rooms: &[(&str, f32)]) -> Vec<Vec<GameState>> {
        rooms
            .iter()
            .enumerate()
            .map(|(i, &(room, x))| {
                let seq = i as u32 * 2;
                vec![make_state(seq, room, x, i as i32), make_state(seq + 1, room, x, i as i32)]
            })
            .collect()
    }

    fn analyse(states: &[Vec<GameState>]) -> SessionAnalysis<'_> {
        let runs = states.iter().map(Run::from_states).collect();
        let config = ClusterConfig { representative_divisor: 1, ..Default::default() };
        SessionAnalysis::new(runs, &config, &SingleCluster)
    }

    fn only(enable: impl Fn(&mut EnabledConditions)) -> ExtractConfig {
        let mut conditions = EnabledConditions {
            room_change: false,
            state_change: false,
            collection: false,
            spawn_change: false,
            long_fail: false,
            numbers: false,
            clusters: false,
        };
        enable(&mut conditions);
        ExtractConfig { conditions, numbers: Vec::new(), ..Default::default() }
    }

    fn with_trailer(state: &mut GameState, collection: CollectionFlags, state_change: StateChangeFlags) {
        state.trailer = Some(Trailer { len: 2, collection, state_change });
    }

    #[test]
    fn test_room_change_includes_boundaries() {
        let mut states = fixture(&[("a", 0.0), ("a", 0.0), ("b", 0.0)]);
        states[1][1].room = "b".to_string();

        let analysis = analyse(&states);
        let extraction = classify(&analysis, &only(|c| c.room_change = true));

        assert_eq!(extraction.indices().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(extraction.summary.count(ConditionKind::RoomChange), 3);

        // Interior single-room runs are not room changes
        let states = fixture(&[("a", 0.0), ("a", 0.0), ("a", 0.0)]);
        let analysis = analyse(&states);
        let extraction = classify(&analysis, &only(|c| c.room_change = true));
        assert_eq!(extraction.indices().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_state_change_and_collection_masks() {
        let mut states = fixture(&[("a", 0.0), ("a", 0.0), ("a", 0.0)]);
        with_trailer(&mut states[0][1], CollectionFlags::empty(), StateChangeFlags::MUSIC);
        with_trailer(&mut states[1][1], CollectionFlags::empty(), StateChangeFlags::CHECKPOINT);
        with_trailer(&mut states[2][0], CollectionFlags::STRAWBERRY, StateChangeFlags::empty());

        let analysis = analyse(&states);
        let config = only(|c| {
            c.state_change = true;
            c.collection = true;
        });
        let extraction = classify(&analysis, &config);

        // MUSIC is outside the default 0xcf mask
        assert_eq!(extraction.inclusions.len(), 2);
        assert_eq!(extraction.inclusions[0].index, 1);
        assert!(extraction.inclusions[0].conditions.contains(&ConditionKind::StateChange));
        assert_eq!(extraction.inclusions[1].conditions, BTreeSet::from([ConditionKind::Collection]));
    }

    #[test]
    fn test_flag_whitelist_refines_session_bit() {
        let mut states = fixture(&[("a", 0.0), ("a", 0.0), ("a", 0.0)]);
        for run in states.iter_mut() {
            with_trailer(&mut run[1], CollectionFlags::empty(), StateChangeFlags::SESSION_FLAG);
        }
        states[0][1].strings = vec!["1".into(), "map".into(), "cassette_block".into()];
        states[1][1].strings = vec!["1".into(), "map".into(), "lamp".into()];
        // Run 2 also hits a checkpoint but changed no whitelisted flag
        with_trailer(
            &mut states[2][1],
            CollectionFlags::empty(),
            StateChangeFlags::SESSION_FLAG | StateChangeFlags::CHECKPOINT,
        );

        let analysis = analyse(&states);
        let mut config = only(|c| c.state_change = true);
        assert_eq!(classify(&analysis, &config).inclusions.len(), 3);

        config.flag_whitelist = vec!["cassette_block".to_string()];
        let extraction = classify(&analysis, &config);
        assert_eq!(extraction.indices().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_whitelist_gates_other_masked_bits() {
        let mut states = fixture(&[("a", 0.0)]);
        with_trailer(
            &mut states[0][1],
            CollectionFlags::empty(),
            StateChangeFlags::SESSION_FLAG | StateChangeFlags::CHECKPOINT,
        );
        states[0][1].strings = vec!["1".into(), "map".into(), "lamp".into()];

        let analysis = analyse(&states);
        let mut config = only(|c| c.state_change = true);
        config.flag_whitelist = vec!["cassette_block".to_string()];
        assert!(classify(&analysis, &config).is_empty());

        // Without the session bit in the mask the whitelist does not apply
        config.state_change_mask = StateChangeFlags::CHECKPOINT.bits();
        assert_eq!(classify(&analysis, &config).indices().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_spawn_change_directions() {
        let mut states = fixture(&[("a", 0.0), ("a", 0.0), ("a", 100.0), ("a", 100.0)]);
        with_trailer(&mut states[2][0], CollectionFlags::empty(), StateChangeFlags::RESPAWN);

        let analysis = analyse(&states);
        let extraction = classify(&analysis, &only(|c| c.spawn_change = true));

        assert_eq!(extraction.indices().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(extraction.inclusions[0].conditions, BTreeSet::from([ConditionKind::SpawnChangeNext]));
        assert_eq!(extraction.inclusions[1].conditions, BTreeSet::from([ConditionKind::SpawnChangePrev]));

        // Without the respawn bit the backward check never fires
        states[2][0].trailer = None;
        let analysis = analyse(&states);
        let extraction = classify(&analysis, &only(|c| c.spawn_change = true));
        assert_eq!(extraction.indices().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_numbers_allow_list() {
        let states = fixture(&[("a", 0.0), ("a", 0.0), ("a", 0.0)]);
        let analysis = analyse(&states);

        let mut config = only(|c| c.numbers = true);
        config.numbers = vec![1, 42];
        let extraction = classify(&analysis, &config);

        assert_eq!(extraction.indices().collect::<Vec<_>>(), vec![1]);
        assert_eq!(extraction.summary.unique_count(ConditionKind::Numbers), 1);
    }

    #[test]
    fn test_cluster_second_pass() {
        // Centroid x = 1.5; runs 1 and 2 tie, the earlier one represents
        let states = fixture(&[("a", 0.0), ("a", 1.0), ("a", 2.0), ("a", 3.0)]);
        let analysis = analyse(&states);
        assert!(analysis.is_representative(1));

        let extraction = classify(&analysis, &only(|c| c.clusters = true));
        assert_eq!(extraction.indices().collect::<Vec<_>>(), vec![1]);
        assert_eq!(extraction.summary.unique_count(ConditionKind::Cluster), 1);

        // Boundary runs already cover the cluster
        let extraction = classify(&analysis, &only(|c| {
            c.clusters = true;
            c.room_change = true;
        }));
        assert_eq!(extraction.indices().collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(extraction.summary.count(ConditionKind::Cluster), 0);

        // A representative picked by another condition is still counted
        let mut config = only(|c| {
            c.clusters = true;
            c.numbers = true;
        });
        config.numbers = vec![1];
        let extraction = classify(&analysis, &config);
        assert_eq!(extraction.indices().collect::<Vec<_>>(), vec![1]);
        assert_eq!(extraction.summary.count(ConditionKind::Cluster), 1);
        assert_eq!(extraction.summary.count(ConditionKind::Numbers), 1);
        assert_eq!(extraction.inclusions[0].conditions, BTreeSet::from([ConditionKind::Numbers]));
    }

    #[test]
    fn test_long_fail_condition() {
        let rooms: Vec<(&str, f32)> = (0..10).map(|_| ("a", 0.0)).collect();
        let mut states = fixture(&rooms);
        states[4][1].ypos = 50.0;

        let analysis = analyse(&states);
        let extraction = classify(&analysis, &only(|c| c.long_fail = true));
        assert_eq!(extraction.indices().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_empty_file_is_noop() {
        let analysis = analyse(&[]);
        let extraction = classify(&analysis, &ExtractConfig::default());
        assert!(extraction.is_empty());
        assert_eq!(extraction.summary.total_runs, 0);
        assert_eq!(extraction.summary.rows().len(), 1);
    }

    #[test]
    fn test_summary_merge_and_rows() {
        let mut a = ExtractionSummary::default();
        a.record(&BTreeSet::from([ConditionKind::RoomChange]));
        a.total_runs = 4;

        let mut b = ExtractionSummary::default();
        b.record(&BTreeSet::from([ConditionKind::RoomChange, ConditionKind::Numbers]));
        b.total_runs = 6;

        a.merge(&b);
        assert_eq!(a.total_runs, 10);
        assert_eq!(a.exported_runs, 2);
        assert_eq!(a.count(ConditionKind::RoomChange), 2);
        assert_eq!(a.unique_count(ConditionKind::RoomChange), 1);

        let rows = a.rows();
        assert_eq!(rows[0], SummaryRow { name: "Total Runs".to_string(), count: 2, unique: 10 });
        assert_eq!(rows[1].name, "room change");
        assert_eq!(rows[2], SummaryRow { name: "numbers".to_string(), count: 1, unique: 0 });
    }
}
