//! Keepsake Common Utilities
//!
//! Shared infrastructure for all Keepsake crates:
//! - Error types and result aliases
//! - Frame clock and pacing for the render loop
//! - Cancellation tokens threaded through suspension points
//! - Tracing/logging initialization
//! - Configuration loading

pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use cancel::*;
pub use clock::*;
pub use config::*;
pub use error::*;
