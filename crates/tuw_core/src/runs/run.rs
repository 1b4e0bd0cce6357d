//! Run aggregate
//!
//! A run borrows a contiguous slice of states from its [`StateDump`] and
//! accumulates rooms, flag unions and session-flag changes as states are
//! appended. Once closed it accepts no further states.
//!
//! [`StateDump`]: crate::telemetry::StateDump

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::telemetry::{CollectionFlags, ControlFlags, FlagChanges, GameState, StateChangeFlags};

/// Two spawns closer than this (squared units) count as the same spawn point
pub const SPAWN_MATCH_DIST_SQ: f64 = 8.0 * 8.0;

#[derive(Debug, Default)]
pub struct Run<'a> {
    states: Vec<&'a GameState>,
    rooms: BTreeSet<&'a str>,
    room_order: Vec<&'a str>,
    control_flags: ControlFlags,
    collection_flags: CollectionFlags,
    state_change_flags: StateChangeFlags,
    session_changes: FlagChanges,
    death_index: Option<usize>,
    closed: bool,
    path_length: OnceCell<f64>,
}

impl<'a> Run<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a closed run from states already known to belong together.
    pub fn from_states(states: impl IntoIterator<Item = &'a GameState>) -> Self {
        let mut run = Self::new();
        for state in states {
            run.push(state);
        }
        run.close();
        run
    }

    /// Append a state. Returns `false` (and ignores the state) once closed.
    pub fn push(&mut self, state: &'a GameState) -> bool {
        if self.closed {
            return false;
        }

        let room = state.room.as_str();
        self.rooms.insert(room);
        if self.room_order.last() != Some(&room) {
            self.room_order.push(room);
        }

        self.control_flags |= state.control;
        self.collection_flags |= state.collection();
        self.state_change_flags |= state.state_change();
        self.session_changes.observe(state.session_flags());

        if self.death_index.is_none() && state.is_dead() {
            self.death_index = Some(self.states.len());
        }

        self.states.push(state);
        true
    }

    /// Mark segmentation complete. Only the first call has any effect.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn states(&self) -> &[&'a GameState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn first(&self) -> Option<&'a GameState> {
        self.states.first().copied()
    }

    pub fn last(&self) -> Option<&'a GameState> {
        self.states.last().copied()
    }

    /// First state carrying the dead flag, if any
    pub fn death_state(&self) -> Option<&'a GameState> {
        self.death_index.map(|i| self.states[i])
    }

    /// Where the run ended for trajectory purposes: the death state when one
    /// was recorded, else the final state.
    pub fn end_state(&self) -> Option<&'a GameState> {
        self.death_state().or_else(|| self.last())
    }

    pub fn rooms(&self) -> &BTreeSet<&'a str> {
        &self.rooms
    }

    /// Distinct rooms in visiting order, consecutive repeats collapsed
    pub fn room_order(&self) -> &[&'a str] {
        &self.room_order
    }

    pub fn first_room(&self) -> Option<&'a str> {
        self.room_order.first().copied()
    }

    pub fn control_flags(&self) -> ControlFlags {
        self.control_flags
    }

    pub fn collection_flags(&self) -> CollectionFlags {
        self.collection_flags
    }

    pub fn state_change_flags(&self) -> StateChangeFlags {
        self.state_change_flags
    }

    /// Session flags that toggled inside this run
    pub fn session_changes(&self) -> &FlagChanges {
        &self.session_changes
    }

    /// Death counter at the start of the run
    pub fn death_count(&self) -> Option<i32> {
        self.first().map(|s| s.deaths)
    }

    pub fn spawn(&self) -> Option<(f32, f32)> {
        self.first().map(GameState::position)
    }

    /// Last timestamp minus first timestamp
    pub fn duration(&self) -> f64 {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    /// Sum of squared position deltas between consecutive states.
    ///
    /// Not a Euclidean length: it is a monotonic proxy used to make cluster
    /// features comparable. Computed once on first access.
    ///
    /// Precondition: the run is closed.
    pub fn path_length(&self) -> f64 {
        debug_assert!(self.closed, "path_length queried on an open run");
        *self.path_length.get_or_init(|| {
            self.states.windows(2).map(|pair| pair[0].distance_sq(pair[1])).sum()
        })
    }

    /// True when both runs start within [`SPAWN_MATCH_DIST_SQ`] of each other.
    pub fn match_spawn(&self, other: &Run<'_>) -> bool {
        match (self.first(), other.first()) {
            (Some(a), Some(b)) => a.distance_sq(b) < SPAWN_MATCH_DIST_SQ,
            _ => false,
        }
    }

    /// Active-play time ranges, with interior pauses cut out.
    ///
    /// A transition into pause opens a gap; leaving pause resumes from the
    /// un-pause state. Without any pause the whole run is one segment.
    pub fn segments(&self) -> Vec<(f64, f64)> {
        let (first, last) = match (self.first(), self.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Vec::new(),
        };

        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut paused = first.is_paused();
        let mut left = 0usize;

        for (i, state) in self.states.iter().enumerate().skip(1) {
            let now = state.is_paused();
            if now && !paused {
                spans.push((left, i));
            }
            if !now && paused {
                left = i;
            }
            paused = now;
        }

        if spans.is_empty() {
            return vec![(first.timestamp, last.timestamp)];
        }

        let last_idx = self.states.len() - 1;
        match spans.last_mut() {
            // Paused through the end: extend instead of emitting an empty tail
            Some(span) if span.0 == left => span.1 = last_idx,
            _ => spans.push((left, last_idx)),
        }

        spans
            .into_iter()
            .map(|(a, b)| (self.states[a].timestamp, self.states[b].timestamp))
            .collect()
    }

    pub fn summary(&self, index: usize) -> RunSummary {
        RunSummary {
            index,
            rooms: self.room_order.iter().map(|r| r.to_string()).collect(),
            deaths: self.death_count().unwrap_or(0),
            states: self.len(),
            start: self.first().map(|s| s.timestamp).unwrap_or(0.0),
            duration: self.duration(),
            path_length: self.path_length(),
            died: self.control_flags.contains(ControlFlags::DEAD),
            segments: self.segments(),
        }
    }
}

/// Owned, serialisable view of a run for reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub index: usize,
    pub rooms: Vec<String>,
    pub deaths: i32,
    pub states: usize,
    pub start: f64,
    pub duration: f64,
    pub path_length: f64,
    pub died: bool,
    pub segments: Vec<(f64, f64)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Trailer;

    fn make_state(t: f64, room: &str, x: f32, y: f32) -> GameState {
        GameState {
            timestamp: t,
            room: room.to_string(),
            xpos: x,
            ypos: y,
            ..Default::default()
        }
    }

    fn paused(mut state: GameState) -> GameState {
        state.control |= ControlFlags::PAUSED;
        state
    }

    #[test]
    fn test_room_order_collapses_repeats() {
        let states = vec![
            make_state(0.0, "a", 0.0, 0.0),
            make_state(1.0, "a", 0.0, 0.0),
            make_state(2.0, "b", 0.0, 0.0),
            make_state(3.0, "a", 0.0, 0.0),
        ];
        let run = Run::from_states(&states);

        assert_eq!(run.room_order(), &["a", "b", "a"]);
        assert_eq!(run.rooms().len(), 2);
        assert_eq!(run.duration(), 3.0);
    }

    #[test]
    fn test_path_length_is_squared_sum() {
        let states = vec![
            make_state(0.0, "a", 0.0, 0.0),
            make_state(1.0, "a", 3.0, 4.0),
            make_state(2.0, "a", 3.0, 6.0),
        ];
        let run = Run::from_states(&states);
        assert_eq!(run.path_length(), 25.0 + 4.0);
        // Cached value is stable
        assert_eq!(run.path_length(), 29.0);
    }

    #[test]
    fn test_closed_run_rejects_states() {
        let states = vec![make_state(0.0, "a", 0.0, 0.0), make_state(1.0, "a", 0.0, 0.0)];
        let mut run = Run::from_states(&states[..1]);
        assert!(!run.push(&states[1]));
        assert_eq!(run.len(), 1);
    }

    #[test]
    fn test_flag_unions_accumulate() {
        let mut a = make_state(0.0, "a", 0.0, 0.0);
        let mut b = make_state(1.0, "a", 0.0, 0.0);
        a.trailer = Some(Trailer {
            len: 2,
            collection: CollectionFlags::KEY,
            state_change: StateChangeFlags::RESPAWN,
        });
        b.control = ControlFlags::DEAD;
        let run = Run::from_states([&a, &b]);

        assert_eq!(run.collection_flags(), CollectionFlags::KEY);
        assert_eq!(run.state_change_flags(), StateChangeFlags::RESPAWN);
        assert!(run.control_flags().contains(ControlFlags::DEAD));
        assert_eq!(run.death_state().map(|s| s.timestamp), Some(1.0));
    }

    #[test]
    fn test_end_state_prefers_death() {
        let mut dead = make_state(1.0, "a", 5.0, 5.0);
        dead.control = ControlFlags::DEAD;
        let states = vec![make_state(0.0, "a", 0.0, 0.0), dead, make_state(2.0, "a", 9.0, 9.0)];
        let run = Run::from_states(&states);
        assert_eq!(run.end_state().map(|s| s.xpos), Some(5.0));

        let alive = Run::from_states(&states[..1]);
        assert_eq!(alive.end_state().map(|s| s.xpos), Some(0.0));
    }

    #[test]
    fn test_match_spawn_threshold() {
        let a = vec![make_state(0.0, "a", 0.0, 0.0)];
        let b = vec![make_state(0.0, "a", 7.9, 0.0)];
        let c = vec![make_state(0.0, "a", 8.0, 0.0)];
        let (ra, rb, rc) = (Run::from_states(&a), Run::from_states(&b), Run::from_states(&c));

        assert!(ra.match_spawn(&rb));
        assert!(rb.match_spawn(&ra));
        assert!(!ra.match_spawn(&rc));
        assert!(!rc.match_spawn(&ra));
    }

    #[test]
    fn test_segments_without_pause() {
        let states = vec![make_state(10.0, "a", 0.0, 0.0), make_state(12.0, "a", 0.0, 0.0)];
        assert_eq!(Run::from_states(&states).segments(), vec![(10.0, 12.0)]);
    }

    #[test]
    fn test_segments_cut_interior_pause() {
        let states = vec![
            make_state(0.0, "a", 0.0, 0.0),
            make_state(1.0, "a", 0.0, 0.0),
            paused(make_state(2.0, "a", 0.0, 0.0)),
            paused(make_state(5.0, "a", 0.0, 0.0)),
            make_state(6.0, "a", 0.0, 0.0),
            make_state(8.0, "a", 0.0, 0.0),
        ];
        assert_eq!(Run::from_states(&states).segments(), vec![(0.0, 2.0), (6.0, 8.0)]);
    }

    #[test]
    fn test_segments_pause_through_end_merges() {
        let states = vec![
            make_state(0.0, "a", 0.0, 0.0),
            make_state(1.0, "a", 0.0, 0.0),
            paused(make_state(2.0, "a", 0.0, 0.0)),
            paused(make_state(3.0, "a", 0.0, 0.0)),
        ];
        assert_eq!(Run::from_states(&states).segments(), vec![(0.0, 3.0)]);
    }

    #[test]
    fn test_session_changes_tracked() {
        let mut a = make_state(0.0, "a", 0.0, 0.0);
        let mut b = make_state(1.0, "a", 0.0, 0.0);
        a.strings = vec!["1".into(), "map".into()];
        b.strings = vec!["1".into(), "map".into(), "gate_open".into()];
        let run = Run::from_states([&a, &b]);

        assert_eq!(run.session_changes().changed().collect::<Vec<_>>(), vec!["gate_open"]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Appending a state never clears a union bit
            #[test]
            fn prop_unions_monotonic(bits in proptest::collection::vec((any::<u8>(), any::<u8>(), any::<u8>()), 1..20)) {
                let states: Vec<GameState> = bits
                    .iter()
                    .enumerate()
                    .map(|(i, &(c, col, sc))| GameState {
                        timestamp: i as f64,
                        control: ControlFlags::from_bits_retain(c),
                        trailer: Some(Trailer {
                            len: 2,
                            collection: CollectionFlags::from_bits_retain(col),
                            state_change: StateChangeFlags::from_bits_retain(sc),
                        }),
                        ..Default::default()
                    })
                    .collect();

                let mut run = Run::new();
                for state in &states {
                    let before = (run.control_flags(), run.collection_flags(), run.state_change_flags());
                    run.push(state);
                    prop_assert!(run.control_flags().contains(before.0));
                    prop_assert!(run.collection_flags().contains(before.1));
                    prop_assert!(run.state_change_flags().contains(before.2));
                }
            }

            #[test]
            fn prop_match_spawn_symmetric(ax in -50.0f32..50.0, ay in -50.0f32..50.0, bx in -50.0f32..50.0, by in -50.0f32..50.0) {
                let a = vec![make_state(0.0, "a", ax, ay)];
                let b = vec![make_state(0.0, "a", bx, by)];
                let (ra, rb) = (Run::from_states(&a), Run::from_states(&b));
                prop_assert_eq!(ra.match_spawn(&rb), rb.match_spawn(&ra));
            }
        }
    }
}
