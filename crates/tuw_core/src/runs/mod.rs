//! Run segmentation
//!
//! Turns a flat state list into closed [`Run`]s under a chosen policy.

pub mod policy;
pub mod run;
pub mod segmenter;

pub use policy::*;
pub use run::*;
pub use segmenter::*;
