//! Diagnostic rules applied to finalized streams.
//!
//! The rules run as a fixed ordered pipeline over each stream. Ordering
//! matters only for severity (an earlier Critical must survive later rules,
//! which [`Severity::promote`] guarantees) and for the one-shot protocol
//! promotion at the end. Every rule is a pure function of the stream's
//! packet list, so identical inputs always yield identical findings.

use std::collections::HashMap;

use crate::protocols;
use crate::{Protocol, Severity, Stream, TcpFlags};

/// Retransmission rate (percent) above which a stream is flagged.
const RETRANS_RATE_WARN_PCT: f64 = 5.0;

/// Idle-gap window (seconds, exclusive bounds) that makes a RST look like an
/// application timeout teardown.
const RST_GAP_MIN_SECS: f64 = 9.0;
const RST_GAP_MAX_SECS: f64 = 11.0;

/// MSS values below this suggest a constrained path (tunnel or PPPoE overhead).
const LOW_MSS_THRESHOLD: u16 = 1260;

/// Retransmissions required (exclusive) before the composite pattern fires.
const COMPOSITE_RETRANS_MIN: usize = 5;

/// DNS runs over this port in either direction.
const DNS_PORT: u16 = 53;

/// Run the full rule pipeline over one finalized stream.
///
/// Called exactly once per stream by the orchestrator. Severity is
/// max-monotone across the rules; findings are append-only.
pub(crate) fn analyze_stream(stream: &mut Stream) {
    if stream.stats.packet_count != stream.packets.len() {
        stream.findings.push("internal: invariant violated".to_string());
        stream.severity.promote(Severity::Critical);
        return;
    }

    detect_retransmissions(stream);
    detect_resets_and_timeouts(stream);
    detect_low_mss(stream);
    detect_composite_pathology(stream);
    fingerprint_protocol(stream);
}

/// Rule 1: duplicate sequence numbers among payload-bearing segments.
///
/// Purely seq-based: a repeated sequence number counts even when the payload
/// differs, which conflates retransmissions with sequence reuse after wrap.
/// Accepted as a diagnostic heuristic.
fn detect_retransmissions(stream: &mut Stream) {
    let mut seen: HashMap<u32, usize> = HashMap::new();
    let mut retransmissions = 0usize;

    for pkt in &mut stream.packets {
        if pkt.payload_len == 0 {
            continue;
        }
        let count = seen.entry(pkt.seq).or_insert(0);
        *count += 1;
        if *count > 1 {
            pkt.is_retransmit = true;
            retransmissions += 1;
        }
    }

    stream.stats.retransmission_count = retransmissions;
    if stream.stats.packet_count == 0 {
        return;
    }
    let rate = retransmissions as f64 * 100.0 / stream.stats.packet_count as f64;
    if rate > RETRANS_RATE_WARN_PCT {
        stream
            .findings
            .push(format!("High Retransmission Rate: {rate:.2}%"));
        stream.severity.promote(Severity::Warning);
    }
}

/// Rule 2: RST segments and the idle-then-teardown timing signature.
///
/// A RST arriving after an idle gap of roughly ten seconds is the signature
/// of a peer giving up on a stalled connection rather than an immediate
/// refusal.
fn detect_resets_and_timeouts(stream: &mut Stream) {
    let mut findings = Vec::new();
    let mut last_ts: Option<f64> = None;
    let mut resets = 0usize;
    let mut has_timeout = false;

    for pkt in &stream.packets {
        if pkt.flags.contains(TcpFlags::RST) {
            resets += 1;
            if let Some(prev) = last_ts {
                let gap = pkt.timestamp - prev;
                if gap > RST_GAP_MIN_SECS && gap < RST_GAP_MAX_SECS {
                    findings.push(format!("Timeout Pattern: RST after {gap:.2}s gap"));
                    has_timeout = true;
                }
            }
        }
        last_ts = Some(pkt.timestamp);
    }

    stream.stats.reset_count = resets;
    stream.stats.has_timeout = has_timeout;
    stream.findings.append(&mut findings);
    if has_timeout {
        stream.severity.promote(Severity::Critical);
    }
}

/// Rule 3: constrained MSS on either side of the handshake.
fn detect_low_mss(stream: &mut Stream) {
    if has_low_mss(stream) {
        stream.findings.push(format!(
            "Low MSS Detected (Client: {}, Server: {})",
            stream.client_mss, stream.server_mss
        ));
        stream.severity.promote(Severity::Warning);
    }
}

fn has_low_mss(stream: &Stream) -> bool {
    let low = |mss: u16| mss > 0 && mss < LOW_MSS_THRESHOLD;
    low(stream.client_mss) || low(stream.server_mss)
}

/// Rule 4: the composite pattern of a constrained path, heavy loss and an
/// idle teardown in the same conversation.
fn detect_composite_pathology(stream: &mut Stream) {
    if has_low_mss(stream)
        && stream.stats.retransmission_count > COMPOSITE_RETRANS_MIN
        && stream.stats.has_timeout
    {
        stream
            .findings
            .push("MATCH: Composite Pathology (Low MSS + Retrans + Timeout)".to_string());
        stream.severity.promote(Severity::Critical);
    }
}

/// Rule 5: application-protocol promotion.
///
/// Walks payload-bearing packets in order and stops at the first signature
/// match. Only ever promotes a bare transport label; severity and findings
/// are untouched.
fn fingerprint_protocol(stream: &mut Stream) {
    if !stream.protocol.is_transport() {
        return;
    }
    for pkt in &stream.packets {
        if pkt.payload.is_empty() {
            continue;
        }
        if protocols::is_tls_client_hello(&pkt.payload) {
            stream.protocol = Protocol::Tls;
            return;
        }
        if protocols::is_http_preamble(&pkt.payload) {
            stream.protocol = Protocol::Http;
            return;
        }
        if protocols::is_ssh_banner(&pkt.payload) {
            stream.protocol = Protocol::Ssh;
            return;
        }
        if stream.client_port == DNS_PORT || stream.server_port == DNS_PORT {
            stream.protocol = Protocol::Dns;
            return;
        }
    }
}
