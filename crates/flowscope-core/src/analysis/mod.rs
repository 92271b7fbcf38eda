//! The packet→stream→diagnosis pipeline.
//!
//! [`analyze_pcap_file`] drives the whole core: a decoder worker reads the
//! capture and pushes decoded packet metadata through a bounded queue, the
//! consuming thread folds the queue into per-conversation streams, and once
//! ingestion finishes the rule engine runs over every finalized stream.

use std::path::Path;
use std::sync::mpsc;
use std::thread;

use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, trace, warn};

use crate::source::{FrameSource, PcapFileSource, SourceError};
use crate::{
    DEFAULT_GENERATED_AT, InputInfo, REPORT_VERSION, Report, Severity, Summary, ToolInfo,
};

mod decode;
mod rules;
mod streams;

use decode::{PacketMeta, decode_frame};
use streams::StreamBuilder;

/// Capacity of the decoder→builder queue. The decoder blocks on a full
/// queue, which back-pressures file reading against a slow consumer.
const PACKET_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("could not read capture input: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture source failed: {0}")]
    Source(#[from] SourceError),
}

/// Analyze a capture file end to end.
///
/// Open failures (missing file, unrecognized capture header) surface here,
/// before any packet is decoded. Once decoding has begun the pipeline always
/// produces a report, degrading to whatever streams were built when the
/// capture ends early.
pub fn analyze_pcap_file(path: &Path) -> Result<Report, AnalysisError> {
    let source = PcapFileSource::open(path)?;
    analyze_source(path, source)
}

/// Analyze frames from an already-open source.
///
/// The source moves onto a dedicated decoder thread and is closed on every
/// exit path, including the consumer abandoning the queue. Individual frames
/// that fail to decode are dropped silently; a mid-stream read failure ends
/// the stream without failing the run.
pub fn analyze_source<S>(path: &Path, source: S) -> Result<Report, AnalysisError>
where
    S: FrameSource + Send + 'static,
{
    let input_bytes = path.metadata()?.len();

    let (sender, receiver) = mpsc::sync_channel(PACKET_QUEUE_CAPACITY);
    let worker = thread::spawn(move || pump_source(source, sender));

    let builder = StreamBuilder::new();
    for meta in receiver {
        builder.process_packet(meta);
    }

    match worker.join() {
        Ok(stats) => debug!(
            frames = stats.frames,
            packets = stats.packets,
            bytes = stats.bytes,
            "capture drained"
        ),
        Err(_) => warn!("decoder worker panicked; continuing with built streams"),
    }

    let mut streams = builder.into_streams();
    let mut issues_found = 0usize;
    for stream in &mut streams {
        rules::analyze_stream(stream);
        if stream.severity != Severity::Normal {
            issues_found += 1;
        }
    }

    // Deterministic output order: by first activity, then by id.
    streams.sort_by(|a, b| {
        a.stats
            .start_time
            .total_cmp(&b.stats.start_time)
            .then_with(|| a.id.cmp(&b.id))
    });

    let last_ts = streams
        .iter()
        .map(|stream| stream.stats.end_time)
        .max_by(f64::total_cmp);
    let summary = Summary {
        total_streams: streams.len(),
        issues_found,
    };
    debug!(
        streams = summary.total_streams,
        issues = summary.issues_found,
        "analysis complete"
    );

    Ok(Report {
        report_version: REPORT_VERSION,
        tool: ToolInfo {
            name: "flowscope".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        generated_at: last_ts
            .and_then(ts_to_rfc3339)
            .unwrap_or_else(|| DEFAULT_GENERATED_AT.to_string()),
        input: InputInfo {
            path: path.display().to_string(),
            bytes: input_bytes,
        },
        streams,
        summary,
    })
}

struct PumpStats {
    frames: u64,
    packets: u64,
    bytes: u64,
}

/// Decoder worker loop: read frames, decode, enqueue.
///
/// Exits when the capture is exhausted, when the receiver is dropped, or on
/// a mid-stream read failure. Dropping `source` (and with it the capture
/// handle) and `sender` (closing the queue) happens on all of them.
fn pump_source<S: FrameSource>(mut source: S, sender: mpsc::SyncSender<PacketMeta>) -> PumpStats {
    let mut stats = PumpStats {
        frames: 0,
        packets: 0,
        bytes: 0,
    };

    loop {
        match source.next_frame() {
            Ok(Some(frame)) => {
                stats.frames += 1;
                let Some(meta) = decode_frame(frame.linktype, frame.ts, &frame.data) else {
                    trace!(frame = stats.frames, "undecodable frame dropped");
                    continue;
                };
                stats.bytes += meta.frame_length as u64;
                if sender.send(meta).is_err() {
                    // Consumer abandoned the pipeline; stop promptly.
                    break;
                }
                stats.packets += 1;
            }
            Ok(None) => break,
            Err(err) => {
                warn!("capture read failed mid-stream: {err}");
                break;
            }
        }
    }

    stats
}

/// Render a capture timestamp for the report envelope; `None` when the
/// value falls outside what the RFC 3339 formatter accepts.
fn ts_to_rfc3339(ts: f64) -> Option<String> {
    let nanos = (ts * 1e9) as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}
