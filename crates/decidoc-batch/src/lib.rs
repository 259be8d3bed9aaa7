//! Decidoc Batch — the per-channel message coalescer.
//!
//! Bursts of chat messages on one channel are accumulated into a single
//! batch that flushes to the tool orchestrator after an inactivity window
//! (default 30 s) with no new appends.

pub mod coalescer;

pub use coalescer::{compose_input, BatchStatus, Coalescer, ForceFlushResult};
