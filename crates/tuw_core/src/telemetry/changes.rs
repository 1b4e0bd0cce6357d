//! Named flag-change accumulator
//!
//! Counts, per flag name, how many times the flag toggled between two
//! consecutive observations. The first observation only sets the baseline.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagChanges {
    counts: BTreeMap<String, u32>,
    #[serde(skip)]
    previous: Option<BTreeSet<String>>,
}

impl FlagChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an accumulator from precomputed counts (no baseline).
    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            counts: counts.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            previous: None,
        }
    }

    /// Feed the set of flag names active in the next observation.
    pub fn observe<I, S>(&mut self, active: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let current: BTreeSet<String> = active.into_iter().map(Into::into).collect();

        if let Some(previous) = &self.previous {
            for name in previous.symmetric_difference(&current) {
                *self.counts.entry(name.clone()).or_insert(0) += 1;
            }
        }

        self.previous = Some(current);
    }

    /// Sum another accumulator's counts into this one.
    ///
    /// The observation baseline of `self` is left untouched.
    pub fn merge(&mut self, other: &FlagChanges) {
        for (name, count) in &other.counts {
            *self.counts.entry(name.clone()).or_insert(0) += count;
        }
    }

    pub fn count(&self, name: &str) -> u32 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<String, u32> {
        &self.counts
    }

    /// Names that changed at least once
    pub fn changed(&self) -> impl Iterator<Item = &str> {
        self.counts.iter().filter(|(_, &c)| c > 0).map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.counts.values().all(|&c| c == 0)
    }
}
