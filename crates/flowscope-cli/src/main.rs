//! flowscope command-line interface.
//!
//! This binary runs offline diagnosis of packet captures and emits a
//! deterministic JSON report to a file path you provide. It is a thin
//! wrapper over the `flowscope-core` pipeline: parse the capture, rebuild
//! the conversations, attach findings.
//!
//! Typical usage:
//! - `flowscope analyse capture.pcap -o report.json`
//! - `flowscope analyze capture.pcap --stdout --pretty`
//! - `flowscope info capture.pcap`
//!
//! Errors are reported to stderr as `error:` plus an optional `hint:` line;
//! a non-zero exit code indicates failure to read the input capture or to
//! write the report.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use flowscope_core::{FrameSource, PcapFileSource};
use serde::Serialize;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "flowscope")]
#[command(
    version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (commit ",
        env!("FLOWSCOPE_BUILD_COMMIT"),
        ", built ",
        env!("FLOWSCOPE_BUILD_DATE"),
        ")"
    )
)]
#[command(
    about = "Offline diagnostic analyzer for captured network traffic.",
    long_about = None,
    after_help = "Examples:\n  flowscope analyse capture.pcap -o report.json\n  flowscope analyze capture.pcap --stdout --pretty\n  flowscope info capture.pcap"
)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse a capture file and emit a JSON diagnosis report.
    #[command(alias = "analyze")]
    Analyse {
        /// Path to a .pcap or .pcapng file
        input: PathBuf,

        /// Output report path (JSON)
        #[arg(short = 'o', long, required_unless_present = "stdout")]
        report: Option<PathBuf>,

        /// Write the JSON report to stdout
        #[arg(long, conflicts_with = "report")]
        stdout: bool,

        /// Pretty-print JSON output
        #[arg(long, conflicts_with = "compact")]
        pretty: bool,

        /// Compact JSON output (default)
        #[arg(long)]
        compact: bool,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,
    },
    /// Show capture metadata (no stream analysis).
    Info {
        /// Path to a .pcap or .pcapng file
        input: PathBuf,

        /// Output JSON metadata to stdout
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output
        #[arg(long, conflicts_with = "compact")]
        pretty: bool,

        /// Compact JSON output (default)
        #[arg(long)]
        compact: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Analyse {
            input,
            report,
            stdout,
            pretty,
            compact,
            quiet,
        } => cmd_analyse(input, report, stdout, pretty, compact, quiet),
        Commands::Info {
            input,
            json,
            pretty,
            compact,
        } => cmd_info(input, json, pretty, compact),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(err.to_string(), None)
    }
}

fn cmd_analyse(
    input: PathBuf,
    report: Option<PathBuf>,
    stdout: bool,
    pretty: bool,
    compact: bool,
    quiet: bool,
) -> Result<(), CliError> {
    validate_input_file(&input)?;

    let report = if stdout {
        None
    } else {
        Some(report.ok_or_else(|| {
            CliError::new(
                "missing report output",
                Some("pass --report <FILE> or use --stdout".to_string()),
            )
        })?)
    };

    let rep = flowscope_core::analyze_pcap_file(&input).map_err(|err| {
        CliError::new(
            format!("capture analysis failed: {err}"),
            Some("check capture integrity or permissions".to_string()),
        )
    })?;
    let json = serialize_json(&rep, pretty, compact)?;

    match report {
        None => print!("{}", json),
        Some(report) => {
            if let Some(parent) = report.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create output directory: {}", parent.display())
                    })?;
                }
            }
            fs::write(&report, json)
                .with_context(|| format!("Failed to write report: {}", report.display()))?;
            if !quiet {
                eprintln!("OK: report written -> {}", report.display());
            }
        }
    }

    if !quiet {
        eprintln!(
            "streams: {}, issues: {}",
            rep.summary.total_streams, rep.summary.issues_found
        );
    }
    Ok(())
}

fn cmd_info(input: PathBuf, json: bool, pretty: bool, compact: bool) -> Result<(), CliError> {
    validate_input_file(&input)?;
    let meta = fs::metadata(&input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;

    let info = collect_capture_info(&input, meta.len())?;
    let json_output = json || pretty || compact;
    if json_output {
        let json = serialize_json(&info, pretty, compact)?;
        print!("{}", json);
        return Ok(());
    }

    println!("file: {}", info.path);
    println!("format: {}", info.capture_type);
    println!("bytes: {}", info.size_bytes);
    println!("packets: {}", info.packets);
    println!("time_start: {}", format_ts(info.first_ts));
    println!("time_end: {}", format_ts(info.last_ts));
    println!("duration_seconds: {}", info.duration_seconds.unwrap_or(0.0));
    println!("linktype: {}", info.linktype.as_deref().unwrap_or("unknown"));
    Ok(())
}

#[derive(Debug, Serialize)]
struct CaptureInfo {
    path: String,
    size_bytes: u64,
    capture_type: String,
    packets: u64,
    first_ts: Option<f64>,
    last_ts: Option<f64>,
    duration_seconds: Option<f64>,
    linktype: Option<String>,
}

fn collect_capture_info(input: &Path, size_bytes: u64) -> Result<CaptureInfo, CliError> {
    let capture_type = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("unknown")
        .to_ascii_lowercase();
    let mut source = PcapFileSource::open(input)
        .map_err(|err| CliError::new(err.to_string(), None))?;

    let mut packets = 0u64;
    let mut first_ts = None;
    let mut last_ts = None;
    let mut linktype = None;
    while let Some(frame) = source
        .next_frame()
        .map_err(|err| CliError::new(err.to_string(), None))?
    {
        packets += 1;
        if linktype.is_none() {
            linktype = Some(format!("{:?}", frame.linktype));
        }
        update_ts_bounds(&mut first_ts, &mut last_ts, frame.ts);
    }

    let duration_seconds = match (first_ts, last_ts) {
        (Some(start), Some(end)) if end >= start => Some(end - start),
        _ => None,
    };

    Ok(CaptureInfo {
        path: input.display().to_string(),
        size_bytes,
        capture_type,
        packets,
        first_ts,
        last_ts,
        duration_seconds,
        linktype,
    })
}

fn update_ts_bounds(first: &mut Option<f64>, last: &mut Option<f64>, ts: f64) {
    match first {
        None => *first = Some(ts),
        Some(existing) => {
            if ts < *existing {
                *first = Some(ts);
            }
        }
    }
    match last {
        None => *last = Some(ts),
        Some(existing) => {
            if ts > *existing {
                *last = Some(ts);
            }
        }
    }
}

fn format_ts(ts: Option<f64>) -> String {
    match ts {
        Some(ts) => format!("{ts:.6}"),
        None => "unknown".to_string(),
    }
}

fn serialize_json<T: Serialize>(
    value: &T,
    pretty: bool,
    compact: bool,
) -> Result<String, CliError> {
    if pretty && compact {
        return Err(CliError::new(
            "cannot use --pretty and --compact together",
            Some("choose one output format".to_string()),
        ));
    }
    if pretty {
        serde_json::to_string_pretty(value)
            .context("JSON serialization failed")
            .map_err(Into::into)
    } else {
        serde_json::to_string(value)
            .context("JSON serialization failed")
            .map_err(Into::into)
    }
}

fn validate_input_file(input: &Path) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "pcap" && ext != "pcapng" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .pcap or .pcapng file".to_string()),
        ));
    }
    Ok(())
}
