//! Call sessions: the per-call event log, transcript index, viewer fan-out,
//! and the signed tokens that bind viewers to a session.

pub mod events;
pub mod store;
pub mod token;
pub mod viewer;

pub use events::{
    now_ms, CallBrief, CallStatus, EventKind, SessionEvent, SessionSnapshot, Speaker,
    TranscriptItem,
};
pub use store::SessionStore;
pub use token::ViewerTokenService;
pub use viewer::{ViewerMessage, ViewerSubscription, VIEWER_BUFFER};
