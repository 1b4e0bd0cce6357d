//! Export to recordings
//!
//! Selected runs → recording-relative clips → concat list.

pub mod catalog;
pub mod clips;
pub mod concat;

pub use catalog::*;
pub use clips::*;
pub use concat::*;
