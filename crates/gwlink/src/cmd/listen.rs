use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gwlink_channel::ControlMessage;
use gwlink_frame::{priority, FrameError, FrameReader, FrameWriter};
use tracing::{info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_frame, OutputFormat};

/// Accept loop read timeout so Ctrl-C is honored promptly.
const ACCEPT_POLL: Duration = Duration::from_millis(250);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = TcpListener::bind((args.bind.as_str(), args.port))
        .map_err(|err| io_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| io_error("bind failed", err))?;
    info!(bind = %args.bind, port = args.port, "mock gateway listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) => return Err(io_error("accept failed", err)),
        };
        info!(%peer, "client connected");

        match serve_client(stream, &args, format, &running, &mut printed) {
            Ok(true) => return Ok(SUCCESS),
            Ok(false) => {}
            Err(err) => warn!(%peer, error = %err, "client session ended"),
        }
    }

    Ok(SUCCESS)
}

/// Serve one client connection. Returns true when the frame count
/// budget is exhausted.
fn serve_client(
    stream: TcpStream,
    args: &ListenArgs,
    format: OutputFormat,
    running: &AtomicBool,
    printed: &mut usize,
) -> CliResult<bool> {
    stream
        .set_nonblocking(false)
        .map_err(|err| io_error("accept failed", err))?;
    stream
        .set_read_timeout(Some(ACCEPT_POLL))
        .map_err(|err| io_error("accept failed", err))?;
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut reader = FrameReader::new(stream.try_clone().map_err(|err| io_error("accept failed", err))?);
    let mut writer = FrameWriter::new(stream);
    let mut authorized = args.no_auth;

    while running.load(Ordering::SeqCst) {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::Io(err))
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(FrameError::ConnectionClosed) => return Ok(false),
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        if !authorized {
            let request = ControlMessage::parse(&frame.payload).map_err(|err| {
                CliError::new(DATA_INVALID, format!("bad handshake frame: {err}"))
            })?;
            info!(%peer, msg_type = %request.msg_type, "handshake received");
            let response = ControlMessage::auth_response_active(Some(&peer))
                .to_bytes()
                .map_err(|err| CliError::new(DATA_INVALID, format!("serialize failed: {err}")))?;
            writer
                .send(priority::AUTH, &response)
                .map_err(|err| frame_error("handshake reply failed", err))?;
            authorized = true;
            continue;
        }

        // Heartbeats keep the client's watchdog fed but are not data.
        if let Ok(msg) = ControlMessage::parse(&frame.payload) {
            if msg.msg_type == "heartbeat" {
                continue;
            }
        }

        print_frame(&frame, &peer, format);
        *printed = printed.saturating_add(1);

        if args.echo {
            writer
                .send(frame.priority, &frame.payload)
                .map_err(|err| frame_error("echo failed", err))?;
        }

        if let Some(count) = args.count {
            if *printed >= count {
                return Ok(true);
            }
        }
    }

    Ok(false)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
