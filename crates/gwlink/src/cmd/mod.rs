use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use gwlink_frame::priority;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod status;
pub mod version;

/// Gateway port the original middleware listens on.
pub const DEFAULT_GATEWAY_PORT: u16 = 32869;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a single payload through a gateway channel.
    Send(SendArgs),
    /// Run a mock gateway: accept clients, answer the handshake, print frames.
    Listen(ListenArgs),
    /// Watch a channel's connection state transitions for a while.
    Status(StatusArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Status(args) => status::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Gateway host to connect to.
    pub host: String,
    /// Gateway port.
    #[arg(long, short = 'p', default_value_t = DEFAULT_GATEWAY_PORT)]
    pub port: u16,
    /// Priority band name (auth..background) or numeric value 0-127.
    #[arg(long, default_value = "normal")]
    pub priority: String,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Device identifier for the authorization handshake.
    #[arg(long, default_value = "gwlink-cli")]
    pub device_id: String,
    /// Operator identifier for the authorization handshake.
    #[arg(long, default_value = "anonymous")]
    pub operator_id: String,
    /// Skip the authorization handshake.
    #[arg(long)]
    pub no_auth: bool,
    /// Maximum time to wait for the send to complete (e.g. 5s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,
    /// Port to listen on.
    #[arg(long, short = 'p', default_value_t = DEFAULT_GATEWAY_PORT)]
    pub port: u16,
    /// Do not expect an authorization handshake from clients.
    #[arg(long)]
    pub no_auth: bool,
    /// Echo received frames back to the sender.
    #[arg(long)]
    pub echo: bool,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Gateway host to connect to.
    pub host: String,
    /// Gateway port.
    #[arg(long, short = 'p', default_value_t = DEFAULT_GATEWAY_PORT)]
    pub port: u16,
    /// Device identifier for the authorization handshake.
    #[arg(long, default_value = "gwlink-cli")]
    pub device_id: String,
    /// Operator identifier for the authorization handshake.
    #[arg(long, default_value = "anonymous")]
    pub operator_id: String,
    /// Skip the authorization handshake.
    #[arg(long)]
    pub no_auth: bool,
    /// How long to watch (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub duration: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

pub(crate) fn parse_priority(input: &str) -> CliResult<u8> {
    match input.trim().to_ascii_lowercase().as_str() {
        "auth" => Ok(priority::AUTH),
        "ctrl" => Ok(priority::CTRL),
        "flash" => Ok(priority::FLASH),
        "urgent" => Ok(priority::URGENT),
        "important" => Ok(priority::IMPORTANT),
        "normal" => Ok(priority::NORMAL),
        "background" => Ok(priority::BACKGROUND),
        numeric => numeric
            .parse::<u8>()
            .map_err(|_| CliError::new(USAGE, format!("invalid priority: {input}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
    }

    #[test]
    fn parse_priority_band_names_and_numbers() {
        assert_eq!(parse_priority("urgent").unwrap(), priority::URGENT);
        assert_eq!(parse_priority("NORMAL").unwrap(), priority::NORMAL);
        assert_eq!(parse_priority("42").unwrap(), 42);
        assert!(parse_priority("critical").is_err());
    }
}
