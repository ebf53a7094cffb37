//! Receiver loop: decodes frames off the wire and hands them up.

use std::io::ErrorKind;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use gwlink_frame::{FrameError, FrameReader};
use gwlink_transport::Link;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::channel::Shared;
use crate::state::LoopState;

pub(crate) fn run(
    shared: Arc<Shared>,
    link: Link,
    cancel: CancelToken,
    failed: Arc<AtomicBool>,
    attempt: u64,
) {
    let mut reader = FrameReader::with_config(link, shared.frame_config());
    loop {
        if cancel.is_cancelled() {
            break;
        }
        shared.set_receiver_state(LoopState::Receiving);
        match reader.read_frame() {
            Ok(frame) => {
                shared.touch_watchdog();
                debug!(
                    channel = %shared.name(),
                    priority = frame.priority,
                    len = frame.payload.len(),
                    "frame received"
                );
                shared.set_receiver_state(LoopState::Delivering);
                shared.handle_inbound(frame, &failed, attempt);
            }
            // The socket read timeout bounds how long we go without a
            // cancellation check; partial frames stay buffered.
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) => {
                if !cancel.is_cancelled() {
                    warn!(channel = %shared.name(), error = %err, "receive failed");
                    shared.fail_cycle(&failed, attempt);
                }
                break;
            }
        }
    }
    shared.set_receiver_state(LoopState::Interrupted);
}
