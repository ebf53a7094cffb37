//! Boundary between channels and the embedding application.

use gwlink_frame::Frame;

use crate::state::{ChannelState, LoopState};

/// Callbacks a channel makes into its owner.
///
/// Implementations must be thread-safe: calls arrive from the
/// connector, sender and receiver threads.
pub trait ChannelManager: Send + Sync {
    /// Hand an inbound post-auth frame up for distribution. Returning
    /// false means the frame was not consumed; the channel logs and
    /// drops it.
    fn deliver(&self, channel: &str, frame: Frame) -> bool;

    /// Observe a connection or worker-loop state transition.
    fn status_change(
        &self,
        channel: &str,
        connection: ChannelState,
        sender: LoopState,
        receiver: LoopState,
    );

    /// Whether any usable underlying link is up. Channels hold in
    /// `LinkWait` while this is false.
    fn is_any_link_up(&self) -> bool;

    /// The channel finished its authorization handshake. `frame`
    /// carries the granting response when the policy has one.
    fn authorization_succeeded(&self, channel: &str, frame: Option<&Frame>);
}
