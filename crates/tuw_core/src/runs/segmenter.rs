//! Incremental run segmentation
//!
//! Feeds states one at a time through a [`SegmentPolicy`] and collects the
//! closed runs that pass the policy's validity check.

use super::policy::{PolicyKind, SegmentPolicy};
use super::run::Run;
use crate::telemetry::GameState;

pub struct Segmenter<'a, P: SegmentPolicy + ?Sized> {
    policy: Box<P>,
    current: Run<'a>,
    runs: Vec<Run<'a>>,
    dropped: usize,
}

impl<'a, P: SegmentPolicy + ?Sized> Segmenter<'a, P> {
    pub fn new(policy: Box<P>) -> Self {
        Self {
            policy,
            current: Run::new(),
            runs: Vec::new(),
            dropped: 0,
        }
    }

    pub fn feed(&mut self, state: &'a GameState) {
        if !self.current.is_empty() && self.policy.close_before(&self.current, state) {
            self.finish_current();
        }

        self.current.push(state);

        if self.policy.close_after(&self.current, state) {
            self.finish_current();
        }
    }

    fn finish_current(&mut self) {
        let mut run = std::mem::take(&mut self.current);
        run.close();
        self.policy.reset();

        if self.policy.is_valid(&run) {
            self.runs.push(run);
        } else if !run.is_empty() {
            self.dropped += 1;
        }
    }

    /// Close the trailing run and return everything emitted.
    pub fn finish(mut self) -> Vec<Run<'a>> {
        if !self.current.is_empty() {
            self.finish_current();
        }

        if self.dropped > 0 {
            log::debug!("Dropped {} incomplete runs", self.dropped);
        }

        self.runs
    }
}

/// Segment a whole state list with the given policy.
pub fn extract_runs<'a>(states: &'a [GameState], kind: PolicyKind) -> Vec<Run<'a>> {
    let mut segmenter = Segmenter::new(kind.build());
    for state in states {
        segmenter.feed(state);
    }
    let runs = segmenter.finish();

    log::debug!("{} runs extracted from {} states ({:?} policy)", runs.len(), states.len(), kind);
    runs
}
