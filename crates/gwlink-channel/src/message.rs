//! Outbound send requests and their terminal dispositions.

use std::fmt;

use bytes::Bytes;

/// Terminal or interim outcome of a send request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Accepted into the send queue; a further disposition follows.
    Queued,
    /// The queue stayed full past the enqueue timeout.
    Busy,
    /// The channel is shut down and no longer accepts traffic.
    Rejected,
    /// Drained unsent when the connection cycle was torn down.
    Pending,
    /// A transport write error mid-send; delivery is unknown and the
    /// cycle is being torn down.
    Failed,
    /// Written to the transport in full.
    Sent,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Disposition::Queued => "queued",
            Disposition::Busy => "busy",
            Disposition::Rejected => "rejected",
            Disposition::Pending => "pending",
            Disposition::Failed => "failed",
            Disposition::Sent => "sent",
        };
        f.write_str(label)
    }
}

/// Completion callback attached to a send request.
pub type SendHandler = Box<dyn FnOnce(Disposition) + Send + 'static>;

/// A payload waiting in the send queue.
///
/// Consuming [`complete`](OutboundMessage::complete) is the only way
/// to fire the handler, so each message reports exactly one final
/// disposition.
pub struct OutboundMessage {
    pub payload: Bytes,
    pub priority: u8,
    handler: Option<SendHandler>,
    /// Enqueue order tiebreak within a priority band, assigned by the queue.
    pub(crate) seq: u64,
}

impl OutboundMessage {
    pub fn new(payload: impl Into<Bytes>, priority: u8) -> Self {
        Self {
            payload: payload.into(),
            priority,
            handler: None,
            seq: 0,
        }
    }

    pub fn with_handler(payload: impl Into<Bytes>, priority: u8, handler: SendHandler) -> Self {
        Self {
            payload: payload.into(),
            priority,
            handler: Some(handler),
            seq: 0,
        }
    }

    /// Fire the completion handler, if any, with the final disposition.
    pub fn complete(mut self, disposition: Disposition) {
        if let Some(handler) = self.handler.take() {
            handler(disposition);
        }
    }
}

impl fmt::Debug for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundMessage")
            .field("priority", &self.priority)
            .field("payload_len", &self.payload.len())
            .field("has_handler", &self.handler.is_some())
            .field("seq", &self.seq)
            .finish()
    }
}
