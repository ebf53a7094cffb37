use std::fs;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use gwlink_channel::{
    AuthPolicy, Channel, ChannelConfig, ChannelManager, ChannelState, Disposition, GatewayAuth,
    LoopState, NoAuth,
};
use gwlink_frame::Frame;
use gwlink_transport::TcpTransport;
use tracing::debug;

use crate::cmd::{parse_duration, parse_priority, SendArgs};
use crate::exit::{CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::OutputFormat;

/// Manager for one-shot sends: the link is always considered up and
/// downlink frames are only logged.
struct SendManager;

impl ChannelManager for SendManager {
    fn deliver(&self, channel: &str, frame: Frame) -> bool {
        debug!(channel, len = frame.payload.len(), "downlink frame ignored");
        true
    }

    fn status_change(
        &self,
        channel: &str,
        connection: ChannelState,
        _sender: LoopState,
        _receiver: LoopState,
    ) {
        debug!(channel, %connection, "status change");
    }

    fn is_any_link_up(&self) -> bool {
        true
    }

    fn authorization_succeeded(&self, channel: &str, _frame: Option<&Frame>) {
        debug!(channel, "authorized");
    }
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let priority = parse_priority(&args.priority)?;
    let payload = resolve_payload(&args)?;

    let auth: Arc<dyn AuthPolicy> = if args.no_auth {
        Arc::new(NoAuth)
    } else {
        Arc::new(GatewayAuth::new(&args.device_id, &args.operator_id))
    };
    let config = ChannelConfig {
        retry_interval: Duration::from_secs(2),
        heartbeat_interval: None,
        ..ChannelConfig::default()
    };
    let channel = Channel::spawn(
        "gateway",
        Arc::new(TcpTransport::new(&args.host, args.port)),
        Arc::new(SendManager),
        auth,
        config,
    );

    let (done_tx, done_rx) = mpsc::channel();
    let size = payload.len();
    channel.send_request(
        Bytes::from(payload),
        priority,
        Some(Box::new(move |disposition| {
            let _ = done_tx.send(disposition);
        })),
    );

    let disposition = done_rx.recv_timeout(timeout).map_err(|_| {
        CliError::new(
            TIMEOUT,
            format!("no send completion within {}", args.timeout),
        )
    });
    channel.shutdown();

    match disposition? {
        Disposition::Sent => {
            if matches!(format, OutputFormat::Pretty | OutputFormat::Table) {
                println!("sent {size} bytes at priority {priority}");
            } else if matches!(format, OutputFormat::Json) {
                println!(
                    "{}",
                    serde_json::json!({ "sent": true, "bytes": size, "priority": priority })
                );
            }
            Ok(SUCCESS)
        }
        other => Err(CliError::new(FAILURE, format!("send ended {other}"))),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}
