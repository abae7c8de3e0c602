//! Push-relay client library.
//!
//! Speaks Engine.IO v4 / Socket.IO v5 over a WebSocket to the hosted
//! relay, keeps the connection alive with bounded fixed-delay
//! reconnection, and exposes the relay-assigned session id together with
//! typed subscriptions for the completion event and connection lifecycle
//! signals.

pub mod client;
pub mod events;
pub mod packet;
pub mod processor;
pub mod reconnect;
pub mod session;
