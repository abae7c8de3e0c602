//! Headless driver for the enhancement client.
//!
//! Wires a [`ChannelSession`](enhance_relay::session::ChannelSession) and a
//! [`SubmissionCoordinator`](enhance_engine::coordinator::SubmissionCoordinator)
//! together for a single file and reports progress through `tracing`.

pub mod config;
pub mod runner;
