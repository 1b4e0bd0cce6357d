//! Clip/segment mapping
//!
//! Translates run time segments (session timestamps) into offsets within
//! the recordings listed in a [`RecordingCatalog`].

use serde::{Deserialize, Serialize};

use super::catalog::{Recording, RecordingCatalog};
use crate::error::ClipError;
use crate::runs::Run;

/// Reports the real length of a recording, e.g. by probing the video file.
pub trait DurationSource {
    fn duration(&self, recording: &str) -> Option<f64>;
}

impl<F> DurationSource for F
where
    F: Fn(&str) -> Option<f64>,
{
    fn duration(&self, recording: &str) -> Option<f64> {
        self(recording)
    }
}

/// A recording-relative cut
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSegment {
    pub start: f64,
    pub end: f64,
    pub recording: String,
}

impl ClipSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClipPlan {
    pub segments: Vec<ClipSegment>,
    /// Truncations applied while mapping
    pub warnings: Vec<String>,
}

impl ClipPlan {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(ClipSegment::duration).sum()
    }

    fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.warnings.push(message);
    }
}

pub struct ClipMapper<'c> {
    catalog: &'c RecordingCatalog,
    durations: Option<&'c dyn DurationSource>,
}

impl<'c> ClipMapper<'c> {
    pub fn new(catalog: &'c RecordingCatalog) -> Self {
        Self { catalog, durations: None }
    }

    pub fn with_durations(mut self, durations: &'c dyn DurationSource) -> Self {
        self.durations = Some(durations);
        self
    }

    /// Recording length used for clipping: the duration source's answer if
    /// it has one, else `stop - start` from the catalog.
    fn duration_of(&self, recording: &Recording) -> f64 {
        self.durations
            .and_then(|source| source.duration(&recording.name))
            .unwrap_or_else(|| recording.length())
    }

    /// Recording for a segment: one containing it entirely, else one that
    /// was running at either end so the segment can be truncated.
    fn locate(&self, start: f64, end: f64) -> Result<&'c Recording, ClipError> {
        self.catalog
            .containing(start, end)
            .or_else(|| self.catalog.covering(start))
            .or_else(|| self.catalog.covering(end))
            .ok_or(ClipError::NoRecording { start, end })
    }

    /// Map one `(start, end)` session segment into `plan`.
    ///
    /// Segments lying entirely outside the recording are dropped; partially
    /// outside ones are truncated with a warning.
    pub fn map_segment(&self, start: f64, end: f64, plan: &mut ClipPlan) -> Result<(), ClipError> {
        let recording = self.locate(start, end)?;
        let duration = self.duration_of(recording);

        let mut rel_start = start - recording.start;
        let mut rel_end = end - recording.start;

        if rel_end < 0.0 || rel_start > duration {
            return Ok(());
        }

        if rel_start < 0.0 {
            plan.warn(format!("{}: start clipped from {:.3} to 0", recording.name, rel_start));
            rel_start = 0.0;
        }
        if rel_end > duration {
            plan.warn(format!("{}: end clipped from {:.3} to {:.3}", recording.name, rel_end, duration));
            rel_end = duration;
        }

        plan.segments.push(ClipSegment {
            start: rel_start,
            end: rel_end,
            recording: recording.name.clone(),
        });
        Ok(())
    }

    pub fn map_segments<I>(&self, segments: I) -> Result<ClipPlan, ClipError>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut plan = ClipPlan::default();
        for (start, end) in segments {
            self.map_segment(start, end, &mut plan)?;
        }
        Ok(plan)
    }

    /// Map every pause-free segment of every run, in order.
    pub fn map_runs<'r, 's: 'r, I>(&self, runs: I) -> Result<ClipPlan, ClipError>
    where
        I: IntoIterator<Item = &'r Run<'s>>,
    {
        let plan = self.map_segments(runs.into_iter().flat_map(|run| run.segments()))?;
        log::info!(
            "{} clips mapped ({:.1}s, {} truncated)",
            plan.segments.len(),
            plan.total_duration(),
            plan.warnings.len()
        );
        Ok(plan)
    }
}
