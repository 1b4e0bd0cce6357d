//! Run analysis
//!
//! Per-room trajectory clustering and per-run classification.

pub mod classify;
pub mod density;
pub mod groups;
pub mod session;

pub use classify::*;
pub use density::*;
pub use groups::*;
pub use session::*;
