//! The telephony↔model media bridge.
//!
//! `core` holds the protocol logic (forwarding, transcript mutations,
//! barge-in, recoverable-error classification) against plain channels so it
//! is testable without sockets. `handler` owns the carrier websocket
//! endpoint, the model socket, and the pump tasks around the core.

pub mod core;
pub mod handler;

pub use core::{BridgeCore, BridgeState, CarrierSend, ModelSend};
pub use handler::carrier_media_handler;
