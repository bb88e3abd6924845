//! Replay tool for captured band traffic
//!
//! `decode` feeds hex frames, one per line, through a band communicator and
//! prints every completed record as JSON. Lines prefixed with a 16-bit
//! characteristic UUID and `=` (for example `2A37=16 48 00`) are routed to
//! that standard characteristic instead of the vendor one. Blank lines and
//! lines starting with `#` are skipped.
//!
//! `encode` prints the frame for an opcode and its byte arguments.

use chrono::{FixedOffset, Local, TimeZone};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use wristband_protocol::{
    hex_dump, parse_hex_frame, BandCommunicator, BandError, Characteristic, EngineConfig,
    SportFraming, Transport, UtcClock,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "wristband-replay")]
#[command(about = "Decode captured wrist band notifications and build command frames")]
struct Args {
    /// JSON engine configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Band model name as reported by the device, selects sport framing
    #[arg(long)]
    model: Option<String>,

    /// Force compact sport framing regardless of model
    #[arg(long)]
    compact_sport: bool,

    /// Device offset from UTC in seconds (default: host time zone)
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<i32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode hex frames and print records as JSON
    Decode {
        /// File with one hex frame per line (default: stdin)
        input: Option<PathBuf>,

        /// Print dispatch statistics after the last frame
        #[arg(long)]
        stats: bool,
    },
    /// Print a command frame as hex
    Encode {
        /// Opcode, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_opcode)]
        opcode: u8,

        /// Byte arguments, masked to their low 8 bits
        #[arg(allow_hyphen_values = true)]
        args: Vec<i32>,
    },
}

fn parse_opcode(value: &str) -> std::result::Result<u8, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid opcode '{}': {}", value, e))
}

/// Transport that prints outbound frames instead of writing them to a band
struct StdoutTransport;

#[async_trait::async_trait]
impl Transport for StdoutTransport {
    async fn send_frame(&self, frame: &[u8]) -> wristband_protocol::Result<()> {
        info!("TX {}", hex_dump(frame, frame.len()));
        let hex: Vec<String> = frame.iter().map(|b| format!("{:02X}", b)).collect();
        println!("{}", hex.join(" "));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match args.config {
        Some(ref path) => {
            info!("Loading configuration from {}", path.display());
            EngineConfig::from_json_file(path)?
        }
        None => EngineConfig::default(),
    };

    match args.utc_offset {
        Some(seconds) => {
            let zone = FixedOffset::east_opt(seconds)
                .ok_or_else(|| format!("UTC offset out of range: {}", seconds))?;
            run(&args, UtcClock::with_zone(zone), config).await
        }
        None => run(&args, UtcClock::<Local>::local(), config).await,
    }
}

async fn run<Tz: TimeZone>(
    args: &Args,
    clock: UtcClock<Tz>,
    config: EngineConfig,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(StdoutTransport);
    let mut band = BandCommunicator::with_config(transport, clock, config, SportFraming::default());

    if let Some(ref model) = args.model {
        band.set_model_name(model);
    }
    if args.compact_sport {
        band.set_sport_framing(SportFraming::Compact);
    }

    match &args.command {
        Command::Decode { input, stats } => {
            let reader: Box<dyn AsyncRead + Unpin> = match input {
                Some(path) => Box::new(tokio::fs::File::open(path).await?),
                None => Box::new(tokio::io::stdin()),
            };
            decode(&mut band, reader).await?;

            if *stats {
                println!("{}", serde_json::to_string_pretty(&band.stats())?);
            }
        }
        Command::Encode { opcode, args } => {
            band.send_command(*opcode, Some(args.as_slice())).await?;
        }
    }

    Ok(())
}

async fn decode<Tz: TimeZone>(
    band: &mut BandCommunicator<Tz>,
    reader: Box<dyn AsyncRead + Unpin>,
) -> std::result::Result<(), BandError> {
    band.on_connected();

    let mut lines = BufReader::new(reader).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (characteristic, hex) = match line.split_once('=') {
            Some((uuid, hex)) => match u16::from_str_radix(uuid.trim(), 16)
                .ok()
                .and_then(Characteristic::from_uuid16)
            {
                Some(characteristic) => (characteristic, hex),
                None => {
                    warn!("Line {}: unknown characteristic '{}'", line_no, uuid.trim());
                    continue;
                }
            },
            None => (Characteristic::Vendor, line),
        };

        let raw = match parse_hex_frame(hex) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Line {}: {}", line_no, e);
                continue;
            }
        };

        if let Some(record) = band.on_characteristic(characteristic, &raw) {
            println!("{}", serde_json::to_string(&record)?);
        }
    }

    band.on_disconnected();
    Ok(())
}
