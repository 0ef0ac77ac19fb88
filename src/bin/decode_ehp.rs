use anyhow::Context;
use clap::{Parser, Subcommand};
use ehpdecode::capture::{collect_payloads, read_capture_file, CapturedDatagram};
use ehpdecode::dump::{record_summary, write_hex_with_offset};
use ehpdecode::{
    decode_message_with_warnings, BundleReassembler, DecodeWarning, Envelope, LinkMap, MessageRecord, ReplayConfig,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "decode_ehp", about = "Decode EHP datagrams from pcap/pcapng captures", version)]
struct Args {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count datagrams per message kind and reassemble split route lists
    Summary {
        capture: PathBuf,
    },
    /// Write one line per datagram
    Dump {
        capture: PathBuf,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Emit JSON lines instead of text
        #[arg(long)]
        json: bool,
        /// Only this packet index (1-based)
        #[arg(long)]
        packet: Option<u64>,
    },
    /// Build the instance id -> link attribute map from one or more captures
    Linkmap {
        #[arg(required = true)]
        captures: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// Existing map to start from; captures override its entries
        #[arg(long)]
        base: Option<PathBuf>,
        /// Write `{link_id: form_of_way}` only
        #[arg(long)]
        flat: bool,
    },
    /// Resend the UDP payloads of a capture
    Replay {
        capture: PathBuf,
        #[arg(long, default_value = "239.255.43.44:12345")]
        target: SocketAddr,
        #[arg(long, default_value_t = 255)]
        ttl: u32,
        /// Playback rate; 0 sends as fast as possible
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        #[arg(long)]
        no_loopback: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Summary { capture } => run_summary(&capture),
        Command::Dump {
            capture,
            output,
            json,
            packet,
        } => run_dump(&capture, output, json, packet),
        Command::Linkmap {
            captures,
            output,
            base,
            flat,
        } => run_linkmap(&captures, &output, base, flat),
        Command::Replay {
            capture,
            target,
            ttl,
            speed,
            no_loopback,
        } => {
            let config = ReplayConfig {
                target,
                ttl,
                speed,
                loopback: !no_loopback,
            };
            let payloads =
                collect_payloads(&capture).with_context(|| format!("reading {}", capture.display()))?;
            let stats = ehpdecode::replay(&payloads, &config)?;
            eprintln!("sent {} datagrams ({} bytes) to {}", stats.sent, stats.bytes, config.target);
            Ok(())
        }
    }
}

#[derive(Default)]
struct Summary {
    decoded: u64,
    rejected: u64,
    warnings: u64,
    per_kind: BTreeMap<&'static str, u64>,
    unknown_ids: BTreeMap<u32, u64>,
    first_errors: Vec<(u64, String)>,
    routes: BundleReassembler<u32>,
    routes_completed: u64,
}

impl Summary {
    fn observe(&mut self, d: CapturedDatagram<'_>) {
        let decoded = Envelope::parse(d.payload)
            .and_then(|env| decode_message_with_warnings(d.payload).map(|(rec, w)| (env, rec, w)));
        let (envelope, record, warnings) = match decoded {
            Ok(x) => x,
            Err(e) => {
                self.rejected += 1;
                if self.first_errors.len() < 10 {
                    self.first_errors.push((d.packet, e.to_string()));
                }
                return;
            }
        };
        self.decoded += 1;
        self.warnings += warnings.len() as u64;
        if let MessageRecord::Unknown { type_id, .. } = &record {
            *self.unknown_ids.entry(*type_id).or_insert(0) += 1;
        } else {
            *self.per_kind.entry(record.kind_name()).or_insert(0) += 1;
        }
        if let MessageRecord::RouteList(route) = &record {
            let part = envelope.multi_part;
            if part.is_split() {
                let done = self
                    .routes
                    .add_part(part.bundle_id, part.part_index, part.part_count, route.items.clone());
                if let Some(links) = done {
                    self.routes_completed += 1;
                    tracing::info!(bundle = part.bundle_id, links = links.len(), "route list reassembled");
                }
            }
        }
    }
}

fn run_summary(capture: &Path) -> anyhow::Result<()> {
    let mut summary = Summary::default();
    let stats = read_capture_file(capture, |d| summary.observe(d))
        .with_context(|| format!("reading {}", capture.display()))?;

    eprintln!("capture: {}", capture.display());
    eprintln!("packets: {}", stats.packets);
    eprintln!("udp payloads: {}", stats.udp_payloads);
    eprintln!("decoded: {}", summary.decoded);
    eprintln!("rejected: {}", summary.rejected);
    eprintln!("length warnings: {}", summary.warnings);
    if !summary.per_kind.is_empty() {
        eprintln!("message kinds:");
        for (kind, n) in &summary.per_kind {
            eprintln!("  {:<32} {}", kind, n);
        }
    }
    if !summary.unknown_ids.is_empty() {
        eprintln!("unknown type ids:");
        for (id, n) in &summary.unknown_ids {
            eprintln!("  {:#010x} {}", id, n);
        }
    }
    for (packet, err) in &summary.first_errors {
        eprintln!("  packet {}: {}", packet, err);
    }
    eprintln!(
        "route bundles: {} reassembled, {} incomplete",
        summary.routes_completed,
        summary.routes.len()
    );
    Ok(())
}

#[derive(Serialize)]
struct DumpLine<'a> {
    packet: u64,
    timestamp_us: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    envelope: Option<&'a Envelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<&'a MessageRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn run_dump(capture: &Path, output: Option<PathBuf>, json: bool, packet: Option<u64>) -> anyhow::Result<()> {
    let mut w: Box<dyn Write> = match &output {
        Some(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("creating {}", p.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    let mut write_err: Option<std::io::Error> = None;
    read_capture_file(capture, |d| {
        if write_err.is_some() || packet.is_some_and(|p| p != d.packet) {
            return;
        }
        if let Err(e) = dump_one(&mut *w, &d, json) {
            write_err = Some(e);
        }
    })
    .with_context(|| format!("reading {}", capture.display()))?;
    if let Some(e) = write_err {
        return Err(e).context("writing dump");
    }
    w.flush()?;
    Ok(())
}

fn dump_one(w: &mut dyn Write, d: &CapturedDatagram<'_>, json: bool) -> std::io::Result<()> {
    let envelope = Envelope::parse(d.payload);
    let decoded = decode_message_with_warnings(d.payload);
    if json {
        let (record, warnings, error) = match &decoded {
            Ok((record, warnings)) => (Some(record), warnings.iter().map(DecodeWarning::to_string).collect(), None),
            Err(e) => (None, Vec::new(), Some(e.to_string())),
        };
        let line = DumpLine {
            packet: d.packet,
            timestamp_us: d.timestamp.as_micros(),
            envelope: envelope.as_ref().ok(),
            record,
            warnings,
            error,
        };
        serde_json::to_writer(&mut *w, &line)?;
        return writeln!(w);
    }
    match (envelope, decoded) {
        (Ok(env), Ok((record, warnings))) => {
            writeln!(w, "=== packet {}  {}", d.packet, record_summary(&env, &record))?;
            for warning in warnings {
                writeln!(w, "  warning: {}", warning)?;
            }
            if let MessageRecord::Unknown { payload, .. } = &record {
                write_hex_with_offset(w, payload)?;
            }
        }
        (_, Err(e)) | (Err(e), _) => {
            writeln!(w, "=== packet {}  len {}  error: {}", d.packet, d.payload.len(), e)?;
            write_hex_with_offset(w, d.payload)?;
        }
    }
    Ok(())
}

fn run_linkmap(captures: &[PathBuf], output: &Path, base: Option<PathBuf>, flat: bool) -> anyhow::Result<()> {
    let mut map = match &base {
        Some(p) => LinkMap::read_json(File::open(p).with_context(|| format!("opening {}", p.display()))?)
            .with_context(|| format!("parsing {}", p.display()))?,
        None => LinkMap::new(),
    };
    for capture in captures {
        let mut from_capture = LinkMap::new();
        read_capture_file(capture, |d| {
            if let Ok((record, _)) = decode_message_with_warnings(d.payload) {
                from_capture.observe(&record);
            }
        })
        .with_context(|| format!("reading {}", capture.display()))?;
        tracing::info!(capture = %capture.display(), links = from_capture.len(), "link attributes collected");
        map.merge(from_capture);
    }
    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    if flat {
        map.write_flat_json(BufWriter::new(file))?;
    } else {
        map.write_json(BufWriter::new(file))?;
    }
    eprintln!("wrote {} links to {}", map.len(), output.display());
    Ok(())
}
