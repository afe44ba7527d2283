use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use rpclink_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};

use crate::exit::{CliError, CliResult, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod interrupt;
pub mod listen;
pub mod send;
pub mod session;
pub mod version;

use session::Incoming;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an echo server.
    Echo(EchoArgs),
    /// Send a single message.
    Send(SendArgs),
    /// Listen and print received messages.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Wire format options shared by every subcommand that opens a link.
#[derive(Args, Debug, Clone)]
pub struct WireArgs {
    /// Use newline-delimited messages instead of length-prefixed frames.
    #[arg(long)]
    pub line: bool,
    /// Maximum accepted payload size in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

impl WireArgs {
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload,
            ..FrameConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to bind (e.g. 127.0.0.1:7070).
    pub addr: String,
    #[command(flatten)]
    pub wire: WireArgs,
    /// Exit after serving N connections.
    #[arg(long)]
    pub max_connections: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to.
    pub addr: String,
    #[command(flatten)]
    pub wire: WireArgs,
    /// Message id (ignored with --line).
    #[arg(long, short = 'i', default_value = "1")]
    pub id: u32,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one response message and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the write ack and, with --wait, the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind.
    pub addr: String,
    #[command(flatten)]
    pub wire: WireArgs,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Source of reply messages, abstracted so reply matching can be tested
/// without a live link.
pub trait ReplySource {
    /// `Ok(None)` when the peer has gone away; a timeout is an error.
    fn recv_timeout(&self, timeout: Duration) -> CliResult<Option<Incoming>>;
}

/// Wait for the first reply carrying `id`. Messages without an id (line
/// mode) always match.
pub fn wait_for_reply<R: ReplySource>(
    source: &R,
    id: u32,
    timeout: Duration,
) -> CliResult<Option<Incoming>> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CliError::new(
                TIMEOUT,
                format!("no response for id {id} within {timeout:?}"),
            ));
        }
        match source.recv_timeout(remaining)? {
            Some(message) if message.id.is_none_or(|got| got == id) => return Ok(Some(message)),
            Some(other) => {
                tracing::debug!(expected = id, got = ?other.id, "skipping unrelated reply");
            }
            None => return Ok(None),
        }
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
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
