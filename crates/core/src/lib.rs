//! Shared domain types and pure logic for the enhancement client.
//!
//! Nothing in this crate performs network I/O: it holds the progress
//! state machine, the size-based duration estimate for the simulated
//! phase, completion payload decoding, and the wire constants shared by
//! the relay and engine crates.

pub mod artifact;
pub mod error;
pub mod estimator;
pub mod job;
pub mod progress;
pub mod session;
pub mod types;
pub mod wire;
