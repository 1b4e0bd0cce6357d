//! Session dump reader
//!
//! Reads length-prefixed records until a zero-length prefix or end of input.
//! Malformed records are logged and skipped; the rest of the file is kept.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::DecodeError;

use super::changes::FlagChanges;
use super::decoder::decode_record;
use super::state::GameState;

/// All states decoded from one session file
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateDump {
    pub states: Vec<GameState>,
    pub rooms: BTreeSet<String>,
    /// From the first valid record's trailing strings
    pub chapter: Option<String>,
    pub map: Option<String>,
    /// Records that failed to decode and were skipped
    pub skipped: usize,
    /// Per-name toggle counts across the whole file
    pub flag_changes: FlagChanges,
}

impl StateDump {
    /// Decode a complete in-memory stream.
    ///
    /// A record whose declared length runs past the end of the buffer ends
    /// the read; everything decoded before it is kept.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut dump = StateDump::default();
        let mut pos = 0usize;

        while data.len() - pos >= 2 {
            let size = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
            pos += 2;

            if size == 0 {
                break;
            }

            if data.len() - pos < size {
                let err = DecodeError::UnexpectedEof { declared: size, available: data.len() - pos };
                log::warn!("Stopping read at offset {}: {}", pos - 2, err);
                dump.skipped += 1;
                break;
            }

            let raw = &data[pos..pos + size];
            pos += size;

            match decode_record(raw) {
                Ok(state) => dump.push(state),
                Err(err) => {
                    log::warn!("Skipping malformed record at offset {}: {}", pos - size - 2, err);
                    dump.skipped += 1;
                }
            }
        }

        if data.len() - pos == 1 {
            log::warn!("Ignoring dangling byte at end of stream");
        }

        dump
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).context("Failed to read state stream")?;
        Ok(Self::from_bytes(&data))
    }

    /// Load a dump file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).with_context(|| format!("Failed to read dump file: {:?}", path))?;
        let dump = Self::from_bytes(&data);

        log::info!(
            "{} states loaded from {:?} ({} skipped, {} rooms, map {:?}, chapter {:?})",
            dump.states.len(),
            path,
            dump.skipped,
            dump.rooms.len(),
            dump.map,
            dump.chapter
        );

        Ok(dump)
    }

    fn push(&mut self, state: GameState) {
        if self.states.is_empty() {
            self.chapter = state.chapter().map(str::to_string);
            self.map = state.map().map(str::to_string);
        }

        self.flag_changes.observe(state.active_flag_names());
        self.rooms.insert(state.room.clone());
        self.states.push(state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
