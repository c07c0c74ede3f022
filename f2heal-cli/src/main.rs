use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use f2heal_lib::checksum::{checksum, verify};
use f2heal_lib::message::ValueType;
use f2heal_lib::sim::{SimTransport, SimulatedDevice};
use f2heal_lib::{
    ChecksumPolicy, DeviceSession, Frame, Message, MessageKind, ProtocolRevision, SessionConfig, SessionObserver,
    SettingsBatch, StatusBatch,
};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Message codec and session tool for the F2Heal VHP glove BLE protocol.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Message type numbering shared with the device (legacy or current).
    #[arg(short, long, default_value = "current", global = true)]
    revision: ProtocolRevision,
    /// Decode frames whose checksum does not verify instead of rejecting them.
    #[arg(long, global = true)]
    lenient: bool,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the Fletcher-16 checksum of the given bytes, or verify a full frame.
    Checksum {
        /// Hex bytes
        hex: String,
        /// Treat the input as a complete frame and verify its checksum.
        #[arg(long)]
        frame: bool,
    },
    /// Encode a message into a frame.
    Encode {
        /// Message kind, e.g. volume, stim_frequency, get_settings_batch
        kind: String,
        /// Value for setters (0-255 for volume, true/false for flags, integer otherwise)
        value: Option<String>,
    },
    /// Decode a frame and print it as JSON.
    Decode {
        /// Hex bytes of one frame
        hex: String,
    },
    /// Run the connect bootstrap against a simulated device.
    Simulate {
        /// Settings to apply after the bootstrap, as KIND=VALUE
        #[arg(short, long = "set")]
        set: Vec<String>,
        /// How long to wait for the device to go quiet, in milliseconds.
        #[arg(long, default_value_t = 100)]
        idle_ms: u64,
    },
}

fn setup_logging(verbosity: &Verbosity<InfoLevel>) {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry().with(filter).with(console_layer).init();
}

/// Accepts `0e1c0d00`, `0e 1c 0d 00` and `0e:1c:0d:00`.
fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    hex::decode(&cleaned).with_context(|| format!("Invalid hex: {}", input))
}

fn parse_kind(name: &str) -> Result<MessageKind> {
    MessageKind::from_name(name).ok_or_else(|| anyhow!("Unknown message kind '{}'", name))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Expected a boolean, got '{}'", other),
    }
}

/// Builds the message an operator asked for on the command line.
fn build_message(kind: MessageKind, value: Option<&str>) -> Result<Message> {
    let need_value = || value.ok_or_else(|| anyhow!("{} needs a value", kind));
    let message = match kind.value_type() {
        ValueType::Empty => Message::request(kind)?,
        ValueType::U8 => Message::Volume(need_value()?.parse().context("Volume must be 0-255")?),
        ValueType::Bool => Message::bool(kind, parse_bool(need_value()?)?)?,
        ValueType::U32 => Message::u32(kind, need_value()?.parse().context("Expected an unsigned integer")?)?,
        ValueType::SettingsBatch | ValueType::StatusBatch => {
            bail!("{} is only sent by the device", kind)
        }
    };
    Ok(message)
}

fn run_checksum(hex: &str, frame: bool) -> Result<()> {
    let bytes = parse_hex(hex)?;
    if frame {
        if bytes.len() < 2 {
            bail!("A frame needs at least the two checksum bytes");
        }
        let (lo, hi) = checksum(&bytes[2..]);
        let ok = verify(&bytes);
        println!(
            "computed {:02x}{:02x}, frame carries {:02x}{:02x}: {}",
            lo,
            hi,
            bytes[0],
            bytes[1],
            if ok { "OK" } else { "MISMATCH" }
        );
        if !ok {
            bail!("Checksum mismatch");
        }
    } else {
        let (lo, hi) = checksum(&bytes);
        println!("{:02x}{:02x}", lo, hi);
    }
    Ok(())
}

fn run_encode(revision: ProtocolRevision, kind: &str, value: Option<&str>) -> Result<()> {
    let message = build_message(parse_kind(kind)?, value)?;
    let bytes = message.encode(revision)?;
    debug!("Encoded {:?}", message);
    println!("{}", hex::encode(bytes));
    Ok(())
}

fn run_decode(revision: ProtocolRevision, policy: ChecksumPolicy, hex: &str) -> Result<()> {
    let bytes = parse_hex(hex)?;
    let frame = Frame::parse(&bytes, policy)?;
    let kind = revision.kind(frame.type_code());
    let message = match kind {
        Some(_) => Message::from_frame(revision, &frame)?,
        None => None,
    };
    let output = json!({
        "revision": revision,
        "type": frame.type_code(),
        "kind": kind,
        "checksum_ok": verify(&bytes),
        "payload": hex::encode(frame.payload()),
        "message": message,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Prints every hook invocation, the way the control panel would update its widgets.
struct PrintObserver;

impl SessionObserver for PrintObserver {
    fn connection_changed(&mut self, connected: bool) {
        println!("connection: {}", if connected { "connected" } else { "disconnected" });
    }

    fn volume_changed(&mut self, volume: u8) {
        println!("volume:     {}", volume);
    }

    fn settings_changed(&mut self, settings: &SettingsBatch) {
        println!("settings:   {}", settings);
    }

    fn status_changed(&mut self, status: &StatusBatch) {
        println!("status:     {}", status);
    }
}

type SimSession = DeviceSession<SimTransport, PrintObserver>;

/// Feeds notifications to the session until the device stays quiet for `idle`.
async fn pump(session: &mut SimSession, rx: &mut UnboundedReceiver<bytes::Bytes>, idle: Duration) {
    while let Ok(Some(frame)) = tokio::time::timeout(idle, rx.recv()).await {
        session.handle_notification(&frame);
    }
}

async fn run_simulate(config: SessionConfig, set: &[String], idle: Duration) -> Result<()> {
    let (transport, mut rx) = SimTransport::new(SimulatedDevice::new(config.revision));
    let mut session = DeviceSession::new(config, transport, PrintObserver);

    info!("Connecting to simulated device...");
    session.connect().await?;

    pump(&mut session, &mut rx, idle).await;

    if !set.is_empty() {
        for assignment in set {
            let (name, value) = assignment
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected KIND=VALUE, got '{}'", assignment))?;
            match build_message(parse_kind(name)?, Some(value))? {
                Message::Volume(volume) => session.set_volume(volume)?,
                Message::Bool { kind, value } => session.set_bool_field(kind, value)?,
                Message::U32 { kind, value } => session.set_u32_field(kind, value)?,
                other => bail!("{} is not a setting", other.kind()),
            }
        }
        info!("Refreshing device state...");
        match config.revision.bootstrap_request() {
            MessageKind::GetSettingsBatch => session.request_settings_batch()?,
            _ => session.request_volume()?,
        }
        pump(&mut session, &mut rx, idle).await;
    }

    let pending: Vec<MessageKind> = session.pending().collect();
    if !pending.is_empty() {
        info!("Still awaiting: {:?}", pending);
    }
    session.disconnect();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.verbose);

    let policy = if cli.lenient {
        ChecksumPolicy::Lenient
    } else {
        ChecksumPolicy::Strict
    };

    match &cli.command {
        Command::Checksum { hex, frame } => run_checksum(hex, *frame),
        Command::Encode { kind, value } => run_encode(cli.revision, kind, value.as_deref()),
        Command::Decode { hex } => run_decode(cli.revision, policy, hex),
        Command::Simulate { set, idle_ms } => {
            let config = SessionConfig {
                revision: cli.revision,
                ..SessionConfig::default()
            }
            .with_checksum_policy(policy);
            run_simulate(config, set, Duration::from_millis(*idle_ms)).await
        }
    }
}
