//! # PairChat Diagnostics
//!
//! Debugging and diagnostic tools for PairChat.
//! Provides structured logging setup and per-attempt connection timelines.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod connection_analyzer;
pub mod debug_logger;

// Re-export main types
pub use connection_analyzer::{AttemptSummary, AttemptTimeline, ConnectionPhase, ConnectionStats};
pub use debug_logger::init_logging;
