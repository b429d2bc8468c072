//! Decode captured speaker traffic to pretty-printed JSON.
//!
//! Reads a legacy pcap capture (file or stdin), extracts every TCP payload,
//! runs it through the protocol decode path, and prints each decoded JSON
//! message. Packets that are not protocol frames are skipped, so mixed
//! captures are fine. Keys are never built in; supply the device's key/IV.

use clap::Parser;
use speaker_protocol::capture::decode_capture;
use speaker_protocol::config::{LoggingConfig, TransportConfig};
use speaker_protocol::utils::logging;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(name = "pcap-decode", version, about = "Decode captured speaker traffic to JSON")]
struct Args {
    /// Read from a pcap file (default: stdin)
    #[arg(short, long)]
    pcap: Option<PathBuf>,

    /// AES key for encrypted frames (16/24/32 raw bytes)
    #[arg(short, long, requires = "iv")]
    key: Option<String>,

    /// AES IV for encrypted frames (16 raw bytes)
    #[arg(long, requires = "key")]
    iv: Option<String>,
}

fn main() {
    let args = Args::parse();

    let _ = logging::init(&LoggingConfig {
        log_level: Level::WARN,
        json_format: false,
    });

    if let Err(e) = run(&args) {
        error!(error = %e, "decode failed");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> speaker_protocol::Result<()> {
    let transport = TransportConfig {
        key: args.key.clone(),
        iv: args.iv.clone(),
    };
    let cipher = transport.cipher()?;

    let input: Box<dyn Read> = match &args.pcap {
        Some(path) => Box::new(File::open(path)?),
        None => Box::new(std::io::stdin().lock()),
    };

    let summary = decode_capture(input, cipher.as_ref(), |value| {
        match serde_json::to_string_pretty(value) {
            Ok(rendered) => println!("{rendered},"),
            Err(e) => error!(error = %e, "failed to render value"),
        }
    })?;

    info!(
        packets = summary.packets,
        decoded = summary.decoded,
        skipped = summary.skipped,
        "done"
    );
    Ok(())
}
