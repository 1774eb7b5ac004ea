//! Keepsake Slide Model
//!
//! Defines the data contracts shared by the compositor and the slide store:
//! - **Slide:** one photo with an author name and message
//! - **Timing:** fixed phase durations and the per-export phase schedule
//! - **Format:** output container/codec profiles and the output geometry

pub mod format;
pub mod slide;
pub mod timing;

pub use format::*;
pub use slide::*;
pub use timing::*;
