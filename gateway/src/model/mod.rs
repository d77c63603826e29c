//! Realtime model endpoint: websocket handshake, session configuration, and
//! the client/server event protocol the bridge speaks with the model.

pub mod client;
pub mod config;
pub mod messages;

pub use client::{connect, ModelSocket};
pub use config::{MODEL_REALTIME_URL, PCMU_FORMAT};
pub use messages::{ClientEvent, ModelApiError, ServerEvent, SessionConfig, TurnDetection};
