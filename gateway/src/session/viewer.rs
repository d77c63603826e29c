//! Viewer subscription plumbing.
//!
//! A viewer handle owns its websocket; the session only holds the sending
//! half of a bounded channel. Broadcasts are non-blocking: a subscriber
//! whose buffer is full is terminated and removed rather than allowed to
//! stall the session lock.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::events::SessionEvent;

/// Per-subscriber buffer. Overflow terminates the subscriber.
pub const VIEWER_BUFFER: usize = 256;

/// Messages delivered to a viewer task.
#[derive(Debug, Clone)]
pub enum ViewerMessage {
    /// A live session event to forward to the socket.
    Event(Arc<SessionEvent>),
    /// The session is draining; flush and close the socket normally.
    Close,
}

/// Result of a successful subscribe: the catch-up window snapshotted under
/// the session lock, plus the live receiver registered in the same critical
/// section, so no event is missed or duplicated between the two.
pub struct ViewerSubscription {
    pub viewer_id: u64,
    pub catchup: Vec<Arc<SessionEvent>>,
    pub rx: mpsc::Receiver<ViewerMessage>,
}

/// Sending side kept in the session's viewer set.
#[derive(Debug)]
pub(crate) struct ViewerHandle {
    pub tx: mpsc::Sender<ViewerMessage>,
}
