//! Telemetry stream decoding
//!
//! Raw session bytes → ordered [`GameState`] list.

pub mod changes;
pub mod decoder;
pub mod dump;
pub mod flags;
pub mod state;

pub use changes::*;
pub use decoder::*;
pub use dump::*;
pub use flags::*;
pub use state::*;
