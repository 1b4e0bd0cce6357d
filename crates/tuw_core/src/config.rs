//! Extraction settings
//!
//! Everything the classifier and clusterer can be tuned with, persisted as
//! pretty JSON. Missing fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::{FeatureLead, RepresentativeMetric};
use crate::error::ConfigError;
use crate::runs::PolicyKind;
use crate::telemetry::{CollectionFlags, StateChangeFlags};

/// Death counts worth keeping no matter what else happened in the run
pub const DEFAULT_NUMBERS: [i32; 13] =
    [413, 420, 612, 720, 1025, 1337, 1413, 1612, 1420, 2012, 2020, 2600, 7859];

/// Which classifier categories are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnabledConditions {
    pub room_change: bool,
    pub state_change: bool,
    pub collection: bool,
    pub spawn_change: bool,
    pub long_fail: bool,
    pub numbers: bool,
    pub clusters: bool,
}

impl Default for EnabledConditions {
    fn default() -> Self {
        Self {
            room_change: true,
            state_change: true,
            collection: true,
            spawn_change: true,
            long_fail: true,
            numbers: true,
            clusters: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub min_cluster_size: usize,
    /// A room with C clusters contributes `C / representative_divisor`
    /// representatives
    pub representative_divisor: usize,
    pub selection: RepresentativeMetric,
    pub feature_lead: FeatureLead,
    /// Single-room runs a room needs before its longest one is kept
    pub long_fail_min_runs: usize,
    /// Cluster rooms on the rayon pool
    pub parallel: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 2,
            representative_divisor: 6,
            selection: RepresentativeMetric::Centroid,
            feature_lead: FeatureLead::PathLength,
            long_fail_min_runs: 10,
            parallel: false,
        }
    }
}

impl ClusterConfig {
    /// Representatives to take from a room with `clusters` clusters
    pub fn representatives_for(&self, clusters: usize) -> usize {
        clusters / self.representative_divisor.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub conditions: EnabledConditions,
    pub state_change_mask: u8,
    pub collection_mask: u8,
    pub numbers: Vec<i32>,
    /// Session flag names that make the `session_flag` bit count. Empty
    /// means any change of that bit counts.
    pub flag_whitelist: Vec<String>,
    pub cluster: ClusterConfig,
    pub policy: PolicyKind,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            conditions: EnabledConditions::default(),
            state_change_mask: 0xcf,
            collection_mask: 0x7f,
            numbers: DEFAULT_NUMBERS.to_vec(),
            flag_whitelist: Vec::new(),
            cluster: ClusterConfig::default(),
            policy: PolicyKind::default(),
        }
    }
}

impl ExtractConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn state_change_flags(&self) -> StateChangeFlags {
        StateChangeFlags::from_bits_retain(self.state_change_mask)
    }

    pub fn collection_flags(&self) -> CollectionFlags {
        CollectionFlags::from_bits_retain(self.collection_mask)
    }

    /// Replace the allow-list from comma-separated text.
    ///
    /// Returns `false` and keeps the current list if any entry fails to
    /// parse.
    pub fn apply_numbers(&mut self, text: &str) -> bool {
        let parsed: Result<Vec<i32>, _> = text.split(',').map(|s| s.trim().parse::<i32>()).collect();

        match parsed {
            Ok(numbers) => {
                self.numbers = numbers;
                true
            }
            Err(err) => {
                log::debug!("Ignoring allow-list '{}': {}", text, err);
                false
            }
        }
    }

    pub fn numbers_text(&self) -> String {
        self.numbers.iter().map(i32::to_string).collect::<Vec<_>>().join(", ")
    }
}
