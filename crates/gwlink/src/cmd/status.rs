use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gwlink_channel::{
    AuthPolicy, Channel, ChannelConfig, ChannelManager, ChannelState, GatewayAuth, LoopState,
    NoAuth,
};
use gwlink_frame::Frame;
use gwlink_transport::TcpTransport;
use tracing::debug;

use crate::cmd::{parse_duration, StatusArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_status, OutputFormat};

struct StatusProbe {
    updates: mpsc::Sender<(ChannelState, LoopState, LoopState)>,
}

impl ChannelManager for StatusProbe {
    fn deliver(&self, channel: &str, frame: Frame) -> bool {
        debug!(channel, len = frame.payload.len(), "downlink frame");
        true
    }

    fn status_change(
        &self,
        _channel: &str,
        connection: ChannelState,
        sender: LoopState,
        receiver: LoopState,
    ) {
        let _ = self.updates.send((connection, sender, receiver));
    }

    fn is_any_link_up(&self) -> bool {
        true
    }

    fn authorization_succeeded(&self, channel: &str, _frame: Option<&Frame>) {
        debug!(channel, "authorized");
    }
}

pub fn run(args: StatusArgs, format: OutputFormat) -> CliResult<i32> {
    let duration = parse_duration(&args.duration)?;

    let auth: Arc<dyn AuthPolicy> = if args.no_auth {
        Arc::new(NoAuth)
    } else {
        Arc::new(GatewayAuth::new(&args.device_id, &args.operator_id))
    };
    let config = ChannelConfig {
        retry_interval: Duration::from_secs(2),
        burp_interval: Duration::from_millis(500),
        ..ChannelConfig::default()
    };

    let (tx, rx) = mpsc::channel();
    let channel = Channel::spawn(
        "gateway",
        Arc::new(TcpTransport::new(&args.host, args.port)),
        Arc::new(StatusProbe { updates: tx }),
        auth,
        config,
    );

    let deadline = Instant::now() + duration;
    let mut last = None;
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match rx.recv_timeout(deadline - now) {
            Ok(update) => {
                // Report transitions, not every burp re-check.
                if last.as_ref() != Some(&update) {
                    print_status(channel.name(), update.0, update.1, update.2, format);
                    last = Some(update);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => break,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    channel.shutdown();
    Ok(SUCCESS)
}
