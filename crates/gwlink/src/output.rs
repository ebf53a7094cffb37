use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use gwlink_channel::{ChannelState, LoopState};
use gwlink_frame::{priority, Frame};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    priority: u8,
    band: &'a str,
    payload_size: usize,
    payload: String,
    peer: &'a str,
    timestamp: String,
}

pub fn print_frame(frame: &Frame, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                priority: frame.priority,
                band: priority::band_name(frame.priority),
                payload_size: frame.payload.len(),
                payload: payload_preview(frame.payload.as_ref()),
                peer,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["BAND", "PRIORITY", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    priority::band_name(frame.priority).to_string(),
                    frame.priority.to_string(),
                    frame.payload.len().to_string(),
                    peer.to_string(),
                    payload_preview(frame.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "priority={} ({}) size={} peer={} payload={}",
                frame.priority,
                priority::band_name(frame.priority),
                frame.payload.len(),
                peer,
                payload_preview(frame.payload.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(frame.payload.as_ref());
        }
    }
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    channel: &'a str,
    connection: String,
    sender: String,
    receiver: String,
    timestamp: String,
}

pub fn print_status(
    channel: &str,
    connection: ChannelState,
    sender: LoopState,
    receiver: LoopState,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = StatusOutput {
                channel,
                connection: connection.to_string(),
                sender: sender.to_string(),
                receiver: receiver.to_string(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "CONNECTION", "SENDER", "RECEIVER"])
                .add_row(vec![
                    channel.to_string(),
                    connection.to_string(),
                    sender.to_string(),
                    receiver.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("{channel}: connection={connection} sender={sender} receiver={receiver}");
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
