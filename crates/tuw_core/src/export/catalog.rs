//! Recording catalog
//!
//! Maps recording names to the session timestamps at which recording
//! started and stopped. The catalog text is a whitespace-separated list of
//! `name,event,timestamp` entries; any field may be double-quoted:
//!
//! ```text
//! "2024-05-01_20-11-09.mkv","start",1714594269.52
//! "2024-05-01_20-11-09.mkv","stop",1714597001.10
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::CatalogError;

#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub name: String,
    pub start: f64,
    pub stop: f64,
}

impl Recording {
    /// Whether `[start, end]` lies entirely inside this recording
    pub fn contains(&self, start: f64, end: f64) -> bool {
        self.start <= start && self.stop >= end
    }

    pub fn covers(&self, stamp: f64) -> bool {
        self.start <= stamp && stamp <= self.stop
    }

    pub fn length(&self) -> f64 {
        self.stop - self.start
    }
}

#[derive(Debug, Default)]
struct PendingRecording {
    start: Option<f64>,
    stop: Option<f64>,
}

/// Recordings in catalog order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingCatalog {
    recordings: Vec<Recording>,
}

impl RecordingCatalog {
    pub fn new(recordings: Vec<Recording>) -> Self {
        Self { recordings }
    }

    /// Parse catalog text.
    ///
    /// Later entries for the same recording and event override earlier ones.
    /// Events other than `start`/`stop` are ignored.
    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        // One entry per line so the csv reader sees one record each
        let entries: Vec<&str> = text.split_whitespace().collect();
        let joined = entries.join("\n");

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(joined.as_bytes());

        let mut order: Vec<String> = Vec::new();
        let mut pending: HashMap<String, PendingRecording> = HashMap::new();

        for (i, result) in reader.records().enumerate() {
            let entry = i + 1;
            let record = result?;

            let (name, event, stamp) = match (record.get(0), record.get(1), record.get(2), record.len()) {
                (Some(name), Some(event), Some(stamp), 3) => (name, event, stamp),
                _ => {
                    return Err(CatalogError::MalformedEntry {
                        entry,
                        reason: format!("expected 3 fields, found {}", record.len()),
                    })
                }
            };

            let stamp: f64 = stamp
                .parse()
                .map_err(|_| CatalogError::InvalidTimestamp { entry, value: stamp.to_string() })?;

            let entry = pending.entry(name.to_string()).or_insert_with(|| {
                order.push(name.to_string());
                PendingRecording::default()
            });

            match event {
                "start" => entry.start = Some(stamp),
                "stop" => entry.stop = Some(stamp),
                other => log::debug!("Ignoring catalog event '{}' for {}", other, name),
            }
        }

        let mut recordings = Vec::with_capacity(order.len());
        for name in order {
            let times = pending.remove(&name).unwrap_or_default();
            let start = times
                .start
                .ok_or_else(|| CatalogError::MissingEvent { recording: name.clone(), event: "start" })?;
            let stop = times
                .stop
                .ok_or_else(|| CatalogError::MissingEvent { recording: name.clone(), event: "stop" })?;
            recordings.push(Recording { name, start, stop });
        }

        Ok(Self { recordings })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let catalog = Self::parse(&fs::read_to_string(path)?)?;
        log::info!("{} recordings in catalog {:?}", catalog.len(), path);
        Ok(catalog)
    }

    pub fn recordings(&self) -> &[Recording] {
        &self.recordings
    }

    pub fn get(&self, name: &str) -> Option<&Recording> {
        self.recordings.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    /// First recording fully containing `[start, end]`
    pub fn containing(&self, start: f64, end: f64) -> Option<&Recording> {
        self.recordings.iter().find(|r| r.contains(start, end))
    }

    /// First recording that was running at `stamp`
    pub fn covering(&self, stamp: f64) -> Option<&Recording> {
        self.recordings.iter().find(|r| r.covers(stamp))
    }
}
