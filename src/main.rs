#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]
#![allow(clippy::unreadable_literal)]

use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use httpsniff_lib::capture::{self, CaptureConfig, CaptureEvent};
use httpsniff_lib::export::CsvExporter;
use httpsniff_lib::http::HttpMessage;
use httpsniff_lib::packet::{self, FlowKey};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Capture network traffic and print the HTTP messages it carries.
#[derive(Parser, Debug)]
#[command(name = "httpsniff")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Network interface to capture on (default device when omitted)
    #[arg(short = 'i', long = "interface", value_name = "DEVICE")]
    interface: Option<String>,

    /// libpcap filter expression
    #[arg(short = 'f', long = "filter", default_value = capture::DEFAULT_FILTER)]
    filter: String,

    /// Read frames from a pcap file instead of a live interface
    #[arg(short = 'r', long = "read", value_name = "FILE")]
    read: Option<PathBuf>,

    /// Evict TCP flows idle for longer than this many seconds
    #[arg(long = "idle-timeout", value_name = "SECS", default_value_t = 300)]
    idle_timeout: u64,

    /// Report statistics every this many frames
    #[arg(long = "stats-every", value_name = "FRAMES", default_value_t = capture::DEFAULT_STATS_EVERY)]
    stats_every: u64,

    /// Stop after this many packets
    #[arg(short = 'c', long = "count", value_name = "PACKETS")]
    count: Option<u64>,

    /// Write one CSV row per packet to this file
    #[arg(long = "csv", value_name = "FILE")]
    csv: Option<PathBuf>,

    /// Print every event as a JSON line on stdout
    #[arg(long = "json")]
    json: bool,

    /// List capture devices and exit
    #[arg(long = "list-devices")]
    list_devices: bool,
}

impl Args {
    fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            device: self.interface.clone(),
            capture_file: self.read.clone(),
            filter: self.filter.clone(),
            idle_timeout: Duration::from_secs(self.idle_timeout),
            stats_every: self.stats_every,
            packet_limit: self.count,
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info"));
    // stdout is reserved for captured output
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}

fn print_message(out: &mut impl Write, flow: &FlowKey, message: &HttpMessage) -> std::io::Result<()> {
    writeln!(out, "{flow}  {message}")?;
    for header in message.headers.iter() {
        writeln!(out, "    {}: {}", header.name, header.value)?;
    }
    if !message.body.is_empty() {
        writeln!(out, "    <{} bytes of body>", message.body.len())?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    // Read before the capture thread exists
    let offset = packet::init_local_offset();
    debug!(%offset, "Local time offset");
    let args = Args::parse();

    if args.list_devices {
        for device in capture::list_devices()? {
            println!(
                "{} ({})",
                device.name,
                device.description.as_deref().unwrap_or("no description")
            );
        }
        return Ok(());
    }

    let mut csv = match &args.csv {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Some(CsvExporter::new(BufWriter::new(file))?)
        }
        None => None,
    };

    let session = capture::start(args.capture_config());
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut failure = None;

    while let Some(event) = session.recv() {
        if args.json {
            serde_json::to_writer(&mut out, &event)?;
            writeln!(out)?;
        }

        match event {
            CaptureEvent::PacketObserved(record) => {
                if let Some(csv) = csv.as_mut() {
                    csv.write_record(&record)?;
                }
            }
            CaptureEvent::HttpMessageObserved { flow, message } => {
                if !args.json {
                    print_message(&mut out, &flow, &message)?;
                }
            }
            CaptureEvent::StatisticsUpdated(stats) => {
                debug!(?stats, "Statistics");
                if let Some(csv) = csv.as_mut() {
                    csv.flush()?;
                }
            }
            CaptureEvent::CaptureFailed { reason } => {
                error!("Capture failed: {reason}");
                failure = Some(reason);
            }
        }
    }
    session.join();

    if let Some(csv) = csv {
        let rows = csv.rows();
        csv.finish()?;
        info!(rows, "CSV export written");
    }
    if let Some(reason) = failure {
        bail!("Capture failed: {reason}");
    }
    Ok(())
}
