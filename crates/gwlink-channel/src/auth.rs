//! Pluggable authorization policies.
//!
//! A policy decides what handshake traffic (if any) to send when a
//! connection comes up, and classifies frames received before the
//! channel is authorized. Post-auth frames never reach the policy.

use bytes::Bytes;
use gwlink_frame::{priority, Frame};
use tracing::{debug, warn};

use crate::control::ControlMessage;
use crate::message::OutboundMessage;
use crate::queue::SendQueue;

/// Verdict on a frame received before authorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    /// Handshake complete; open the gate.
    Authorized,
    /// Handshake rejected; the connection is torn down.
    Failed,
    /// Not conclusive yet; keep waiting.
    Pending,
}

/// Handle for queueing handshake frames ahead of application traffic.
pub struct PreAuthSender<'a> {
    queue: &'a SendQueue,
}

impl<'a> PreAuthSender<'a> {
    pub(crate) fn new(queue: &'a SendQueue) -> Self {
        Self { queue }
    }

    /// Queue a handshake payload at auth priority, bypassing the gate.
    pub fn send(&self, payload: impl Into<Bytes>) {
        self.queue
            .enqueue_auth(OutboundMessage::new(payload, priority::AUTH));
    }
}

/// Authorization strategy for one channel.
pub trait AuthPolicy: Send + Sync {
    /// Whether a handshake must complete before application traffic
    /// flows. When false, the channel authorizes itself on connect.
    fn requires_handshake(&self) -> bool {
        true
    }

    /// Called once per connection cycle, right after connect.
    fn on_connect(&self, sender: &PreAuthSender<'_>);

    /// Classify a frame that arrived before authorization.
    fn on_frame(&self, frame: &Frame) -> AuthEvent;
}

/// Trusting policy for closed networks: no handshake, immediately
/// authorized.
#[derive(Debug, Default)]
pub struct NoAuth;

impl AuthPolicy for NoAuth {
    fn requires_handshake(&self) -> bool {
        false
    }

    fn on_connect(&self, _sender: &PreAuthSender<'_>) {}

    fn on_frame(&self, _frame: &Frame) -> AuthEvent {
        AuthEvent::Authorized
    }
}

/// Gateway handshake: send an auth request on connect, wait for an
/// auth response with active status.
#[derive(Debug)]
pub struct GatewayAuth {
    device_id: String,
    operator_id: String,
}

impl GatewayAuth {
    pub fn new(device_id: impl Into<String>, operator_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            operator_id: operator_id.into(),
        }
    }
}

impl AuthPolicy for GatewayAuth {
    fn on_connect(&self, sender: &PreAuthSender<'_>) {
        let request = ControlMessage::auth_request(&self.device_id, &self.operator_id);
        match request.to_bytes() {
            Ok(bytes) => {
                debug!(device_id = %self.device_id, "queueing auth request");
                sender.send(bytes);
            }
            Err(err) => {
                // json! over strings cannot fail to serialize; log and
                // let the handshake time out via the watchdog.
                warn!(error = %err, "failed to serialize auth request");
            }
        }
    }

    fn on_frame(&self, frame: &Frame) -> AuthEvent {
        match ControlMessage::parse(&frame.payload) {
            Ok(msg) if msg.grants_authorization() => AuthEvent::Authorized,
            Ok(msg) => {
                warn!(msg_type = %msg.msg_type, "authorization denied");
                AuthEvent::Failed
            }
            Err(err) => {
                warn!(error = %err, "unparseable frame before authorization");
                AuthEvent::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::control::ControlMessage;
    use std::time::Duration;

    fn frame_with(payload: Vec<u8>) -> Frame {
        Frame {
            priority: priority::AUTH,
            payload: Bytes::from(payload),
        }
    }

    #[test]
    fn gateway_auth_queues_request_on_connect() {
        let queue = SendQueue::new(4, Duration::from_millis(50));
        let policy = GatewayAuth::new("device-7", "op-3");
        policy.on_connect(&PreAuthSender::new(&queue));

        let cancel = CancelToken::new();
        let msg = queue.take(&cancel).expect("queued request");
        assert_eq!(msg.priority, priority::AUTH);
        let parsed = ControlMessage::parse(&msg.payload).expect("json");
        assert_eq!(parsed.msg_type, "auth_request");
    }

    #[test]
    fn gateway_auth_accepts_active_response() {
        let policy = GatewayAuth::new("d", "o");
        let response = ControlMessage::auth_response_active(None)
            .to_bytes()
            .expect("serialize");
        assert_eq!(policy.on_frame(&frame_with(response)), AuthEvent::Authorized);
    }

    #[test]
    fn gateway_auth_rejects_denied_and_garbage() {
        let policy = GatewayAuth::new("d", "o");
        let denied = ControlMessage::auth_response_denied(Some("no"))
            .to_bytes()
            .expect("serialize");
        assert_eq!(policy.on_frame(&frame_with(denied)), AuthEvent::Failed);
        assert_eq!(
            policy.on_frame(&frame_with(b"not json".to_vec())),
            AuthEvent::Failed
        );
    }

    #[test]
    fn no_auth_needs_no_handshake() {
        assert!(!NoAuth.requires_handshake());
    }
}
