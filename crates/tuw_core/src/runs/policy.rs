//! Segmentation policies
//!
//! A policy looks at each incoming state and decides whether the run under
//! construction closes before the state is added (the state then opens the
//! next run) or right after it. Validity decides which closed runs survive.

use serde::{Deserialize, Serialize};

use super::run::Run;
use crate::telemetry::{ControlFlags, GameState};

/// Strategy deciding where one run ends and the next begins
pub trait SegmentPolicy {
    /// Close `run` before `state` is added; `state` starts the next run.
    /// Never consulted for an empty run.
    fn close_before(&mut self, run: &Run<'_>, state: &GameState) -> bool;

    /// Close `run` now that `state` is its latest state.
    fn close_after(&mut self, run: &Run<'_>, state: &GameState) -> bool;

    /// Whether a closed run is emitted. Invalid runs are dropped silently.
    fn is_valid(&self, run: &Run<'_>) -> bool {
        run.len() > 1
    }

    /// Called whenever a new run is started.
    fn reset(&mut self) {}
}

// ============================================================================
// Death-terminated
// ============================================================================

/// A run ends on the first state carrying the dead flag, which it keeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeathPolicy;

impl SegmentPolicy for DeathPolicy {
    fn close_before(&mut self, _run: &Run<'_>, _state: &GameState) -> bool {
        false
    }

    fn close_after(&mut self, _run: &Run<'_>, state: &GameState) -> bool {
        state.is_dead()
    }
}

// ============================================================================
// Room-scoped
// ============================================================================

/// Death-terminated, and additionally confined to a single room and a
/// single death count. A state in a different room, or carrying a different
/// death count, closes the run and starts the next one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoomPolicy;

impl RoomPolicy {
    /// True when the run was closed by leaving its room rather than dying.
    pub fn completed(run: &Run<'_>) -> bool {
        !run.control_flags().contains(ControlFlags::DEAD)
    }
}

impl SegmentPolicy for RoomPolicy {
    fn close_before(&mut self, run: &Run<'_>, state: &GameState) -> bool {
        let room_changed = run.first_room().is_some_and(|room| room != state.room);
        let deaths_changed = run.last().is_some_and(|last| last.deaths != state.deaths);
        room_changed || deaths_changed
    }

    fn close_after(&mut self, _run: &Run<'_>, state: &GameState) -> bool {
        state.is_dead()
    }
}

// ============================================================================
// Clip (pause/death aware)
// ============================================================================

/// Keeps the whole death animation for timing purposes.
///
/// An ending state is one with the dead flag, or whose death count differs
/// from the previous state. Ending states keep extending the run; the first
/// non-ending state after them is kept as a one-state tail and closes the run.
/// An ending state arriving on an empty run closes it immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipPolicy {
    ending: bool,
}

impl SegmentPolicy for ClipPolicy {
    fn close_before(&mut self, _run: &Run<'_>, _state: &GameState) -> bool {
        false
    }

    fn close_after(&mut self, run: &Run<'_>, state: &GameState) -> bool {
        // `run` already holds `state`; judge it against its predecessor
        let previous = &run.states()[..run.len().saturating_sub(1)];
        let ending = state.is_dead()
            || previous.last().is_some_and(|last| last.deaths != state.deaths);

        if ending {
            self.ending = true;
            previous.is_empty()
        } else {
            self.ending
        }
    }

    fn reset(&mut self) {
        self.ending = false;
    }
}

// ============================================================================
// Selection by name
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Death,
    Room,
    #[default]
    Clip,
}

impl PolicyKind {
    pub fn build(&self) -> Box<dyn SegmentPolicy> {
        match self {
            PolicyKind::Death => Box::new(DeathPolicy),
            PolicyKind::Room => Box::new(RoomPolicy),
            PolicyKind::Clip => Box::new(ClipPolicy::default()),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "death" => Some(PolicyKind::Death),
            "room" => Some(PolicyKind::Room),
            "clip" => Some(PolicyKind::Clip),
            _ => None,
        }
    }
}
