//! Byte-wide flag sets carried by every telemetry record
//!
//! Bits that have no name are retained (`from_bits_retain`) so that a record
//! re-encodes to the same byte it was decoded from.

use bitflags::{bitflags, Flags};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Player control state
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ControlFlags: u8 {
        const DEAD = 0x80;
        const CONTROL = 0x40;
        const CUTSCENE = 0x20;
        const TRANSITION = 0x10;
        const PAUSED = 0x08;
    }
}

bitflags! {
    /// Player physical status
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct StatusFlags: u8 {
        const HOLDING = 0x80;
        const CROUCHED = 0x40;
        const FACING_LEFT = 0x20;
        const WALL_LEFT = 0x10;
        const WALL_RIGHT = 0x08;
        const COYOTE = 0x04;
        const SAFE_GROUND = 0x02;
        const GROUND = 0x01;
    }
}

bitflags! {
    /// Buttons held during the frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ButtonFlags: u8 {
        const QUICK_RESTART = 0x80;
        const PAUSE = 0x40;
        const ESCAPE = 0x20;
        const CROUCH_DASH = 0x10;
        const TALK = 0x08;
        const GRAB = 0x04;
        const DASH = 0x02;
        const JUMP = 0x01;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DirectionFlags: u8 {
        const UP = 0x08;
        const DOWN = 0x04;
        const LEFT = 0x02;
        const RIGHT = 0x01;
    }
}

bitflags! {
    /// Collectible pickups reported by the optional record trailer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CollectionFlags: u8 {
        const STRAWBERRY = 0x01;
        const KEY = 0x02;
        const CASSETTE = 0x04;
        const HEART = 0x08;
        const SUMMIT_GEM = 0x10;
        const GOLDEN = 0x20;
        const MOON_BERRY = 0x40;
        const REFILL = 0x80;
    }
}

bitflags! {
    /// Session state changes reported by the optional record trailer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct StateChangeFlags: u8 {
        /// Respawn point moved; a changed spawn position is expected
        const RESPAWN = 0x01;
        /// A named session flag toggled (names travel in the trailing strings)
        const SESSION_FLAG = 0x02;
        const CORE_MODE = 0x04;
        const INVENTORY = 0x08;
        const MUSIC = 0x10;
        const LIGHTING = 0x20;
        const DASHES = 0x40;
        const CHECKPOINT = 0x80;
    }
}

/// Lowercase names of the named bits set in `flags`, in declaration order.
pub fn flag_names<F: Flags>(flags: &F) -> impl Iterator<Item = String> + '_ {
    flags.iter_names().map(|(name, _)| name.to_ascii_lowercase())
}

/// True when `flags` has any bit in common with the raw `mask`.
pub fn intersects_mask<F: Flags<Bits = u8>>(flags: &F, mask: u8) -> bool {
    flags.bits() & mask != 0
}
