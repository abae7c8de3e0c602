//! Job orchestration for the enhancement client.
//!
//! [`coordinator::SubmissionCoordinator`] drives one job at a time: it
//! uploads the file to the provider with real byte-level progress, then
//! advances a simulated percentage while waiting for the relay to
//! deliver the completion event, and publishes every state change.

pub mod coordinator;
pub mod provider;
pub mod ticker;
pub mod upload;
