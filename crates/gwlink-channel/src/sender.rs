//! Sender loop: drains the send queue onto the wire.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use gwlink_frame::FrameWriter;
use gwlink_transport::Link;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::channel::Shared;
use crate::message::Disposition;
use crate::state::LoopState;

pub(crate) fn run(
    shared: Arc<Shared>,
    link: Link,
    cancel: CancelToken,
    failed: Arc<AtomicBool>,
    attempt: u64,
) {
    let mut writer = FrameWriter::with_config(link, shared.frame_config());
    loop {
        shared.set_sender_state(LoopState::Taking);
        let Some(msg) = shared.queue.take(&cancel) else {
            break;
        };

        shared.set_sender_state(LoopState::Sending);
        let priority = msg.priority;
        let len = msg.payload.len();
        match writer.send(priority, &msg.payload) {
            Ok(()) => {
                debug!(channel = %shared.name(), priority, len, "frame sent");
                msg.complete(Disposition::Sent);
            }
            Err(err) => {
                warn!(channel = %shared.name(), priority, len, error = %err, "send failed");
                msg.complete(Disposition::Failed);
                shared.fail_cycle(&failed, attempt);
                break;
            }
        }
    }
    shared.set_sender_state(LoopState::Interrupted);
}
