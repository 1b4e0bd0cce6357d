//! Record codec
//!
//! ## Record layout (little-endian)
//! ```text
//! u32 sequence, f64 timestamp, f64 game_time, i32 deaths      (24 bytes)
//! room name, null-terminated ASCII
//! f32 xpos, ypos, xvel, yvel, stamina, xlift, ylift
//! i32 state, i32 dashes, u8 control, u8 status                (38 bytes)
//! u8 buttons, u8 directions, f32 xaim, f32 yaim               (10 bytes)
//! [u8 marker == 1, u8 len, u8 collection, u8 state_change, padding to len]
//! null-terminated ASCII strings until the end of the body
//! ```
//! On the wire each body is preceded by a `u16` length; a zero length ends
//! the stream.

use crate::error::DecodeError;

use super::flags::{
    ButtonFlags, CollectionFlags, ControlFlags, DirectionFlags, StateChangeFlags, StatusFlags,
};
use super::state::{GameState, MovementState, Trailer};

/// Fixed header size (sequence, timestamp, game time, deaths)
pub const HEADER_SIZE: usize = 24;

/// Movement block size
pub const PLAYER_BLOCK_SIZE: usize = 38;

/// Input block size
pub const INPUT_BLOCK_SIZE: usize = 10;

/// Marker byte announcing the optional trailer
pub const TRAILER_MARKER: u8 = 1;

/// Payload bytes carried by every trailer (collection, state change)
pub const TRAILER_PAYLOAD: u8 = 2;

// ============================================================================
// Cursor
// ============================================================================

struct RecordCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.buf.len() - self.pos < n {
            return Err(DecodeError::Truncated { field, offset: self.pos });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, field)?[0])
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array(field)?))
    }

    fn i32(&mut self, field: &'static str) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.array(field)?))
    }

    fn f32(&mut self, field: &'static str) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.array(field)?))
    }

    fn f64(&mut self, field: &'static str) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.array(field)?))
    }

    fn cstring(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let rest = self.remaining();
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::MissingTerminator { field })?;
        let text = ascii_string(&rest[..end], field)?;
        self.pos += end + 1;
        Ok(text)
    }
}

fn ascii_string(bytes: &[u8], field: &'static str) -> Result<String, DecodeError> {
    if !bytes.is_ascii() {
        return Err(DecodeError::NonAscii { field });
    }
    // ASCII is valid UTF-8
    Ok(bytes.iter().map(|&b| b as char).collect())
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode one record body (without its length prefix).
pub fn decode_record(raw: &[u8]) -> Result<GameState, DecodeError> {
    if raw.len() < HEADER_SIZE {
        return Err(DecodeError::TooShort { needed: HEADER_SIZE, found: raw.len() });
    }

    let mut cur = RecordCursor::new(raw);

    let sequence = cur.u32("sequence")?;
    let timestamp = cur.f64("timestamp")?;
    let game_time = cur.f64("game_time")?;
    let deaths = cur.i32("deaths")?;
    let room = cur.cstring("room")?;

    let xpos = cur.f32("xpos")?;
    let ypos = cur.f32("ypos")?;
    let xvel = cur.f32("xvel")?;
    let yvel = cur.f32("yvel")?;
    let stamina = cur.f32("stamina")?;
    let xlift = cur.f32("xlift")?;
    let ylift = cur.f32("ylift")?;
    let state = MovementState::from_code(cur.i32("state")?);
    let dashes = cur.i32("dashes")?;
    let control = ControlFlags::from_bits_retain(cur.u8("control_flags")?);
    let status = StatusFlags::from_bits_retain(cur.u8("status_flags")?);

    let buttons = ButtonFlags::from_bits_retain(cur.u8("button_flags")?);
    let directions = DirectionFlags::from_bits_retain(cur.u8("direction_flags")?);
    let xaim = cur.f32("xaim")?;
    let yaim = cur.f32("yaim")?;

    let trailer = decode_trailer(&mut cur)?;
    let strings = decode_strings(cur.remaining())?;

    Ok(GameState {
        sequence,
        timestamp,
        game_time,
        deaths,
        room,
        xpos,
        ypos,
        xvel,
        yvel,
        stamina,
        xlift,
        ylift,
        state,
        dashes,
        control,
        status,
        buttons,
        directions,
        xaim,
        yaim,
        trailer,
        strings,
    })
}

fn decode_trailer(cur: &mut RecordCursor<'_>) -> Result<Option<Trailer>, DecodeError> {
    if cur.remaining().first() != Some(&TRAILER_MARKER) {
        return Ok(None);
    }
    cur.u8("trailer_marker")?;

    let len = cur.u8("trailer_len")?;
    if len < TRAILER_PAYLOAD {
        return Err(DecodeError::Truncated { field: "trailer", offset: cur.pos });
    }

    let body = cur.take(len as usize, "trailer")?;
    Ok(Some(Trailer {
        len,
        collection: CollectionFlags::from_bits_retain(body[0]),
        state_change: StateChangeFlags::from_bits_retain(body[1]),
    }))
}

fn decode_strings(rest: &[u8]) -> Result<Vec<String>, DecodeError> {
    let mut parts: Vec<&[u8]> = rest.split(|&b| b == 0).collect();
    // The terminating null leaves one trailing element behind
    parts.pop();
    parts.into_iter().map(|p| ascii_string(p, "strings")).collect()
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode one record body (without its length prefix).
///
/// Trailer padding is written as zeros.
pub fn encode_record(state: &GameState) -> Vec<u8> {
    let mut buf = Vec::with_capacity(
        HEADER_SIZE + state.room.len() + 1 + PLAYER_BLOCK_SIZE + INPUT_BLOCK_SIZE + 16,
    );

    buf.extend_from_slice(&state.sequence.to_le_bytes());
    buf.extend_from_slice(&state.timestamp.to_le_bytes());
    buf.extend_from_slice(&state.game_time.to_le_bytes());
    buf.extend_from_slice(&state.deaths.to_le_bytes());
    buf.extend_from_slice(state.room.as_bytes());
    buf.push(0);

    for v in [state.xpos, state.ypos, state.xvel, state.yvel, state.stamina, state.xlift, state.ylift]
    {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf.extend_from_slice(&state.state.code().to_le_bytes());
    buf.extend_from_slice(&state.dashes.to_le_bytes());
    buf.push(state.control.bits());
    buf.push(state.status.bits());

    buf.push(state.buttons.bits());
    buf.push(state.directions.bits());
    buf.extend_from_slice(&state.xaim.to_le_bytes());
    buf.extend_from_slice(&state.yaim.to_le_bytes());

    if let Some(trailer) = state.trailer {
        let len = trailer.len.max(TRAILER_PAYLOAD);
        buf.push(TRAILER_MARKER);
        buf.push(len);
        buf.push(trailer.collection.bits());
        buf.push(trailer.state_change.bits());
        buf.resize(buf.len() + (len - TRAILER_PAYLOAD) as usize, 0);
    }

    for s in &state.strings {
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
    }

    buf
}

/// Encode a full stream: length-prefixed records followed by the zero-length
/// end marker.
pub fn encode_stream<'a>(states: impl IntoIterator<Item = &'a GameState>) -> Vec<u8> {
    let mut out = Vec::new();
    for state in states {
        let body = encode_record(state);
        out.extend_from_slice(&(body.len() as u16).to_le_bytes());
        out.extend_from_slice(&body);
    }
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

// ============================================================================
// Tests
// ============================================================================
