use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod analysis;
mod protocols;
mod source;

pub use analysis::{AnalysisError, analyze_pcap_file, analyze_source};
pub use source::{CaptureFormat, FrameSource, PcapFileSource, RawFrame, SourceError};

pub const REPORT_VERSION: u32 = 1;

/// Fallback `generated_at` value for captures without a single timestamp.
pub const DEFAULT_GENERATED_AT: &str = "1970-01-01T00:00:00Z";

/// Full diagnosis report for one capture file.
///
/// The envelope (`report_version`, `tool`, `generated_at`, `input`) is stable
/// and versioned; `streams` and `summary` carry the analysis itself.
/// `generated_at` is derived from the last analyzed packet's timestamp so
/// the same input always produces the same report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub report_version: u32,
    pub tool: ToolInfo,
    pub generated_at: String,

    pub input: InputInfo,

    pub streams: Vec<Stream>,
    pub summary: Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    pub path: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub total_streams: usize,
    /// Streams whose severity ended up above `normal`.
    pub issues_found: usize,
}

/// One reconstructed conversation between two endpoints.
///
/// The first observed packet fixes the client/server roles; the canonical
/// `id` collapses both directions into the same stream without rewriting
/// that assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub id: String,
    pub client_ip: Ipv4Addr,
    pub client_port: u16,
    pub server_ip: Ipv4Addr,
    pub server_port: u16,
    pub protocol: Protocol,
    pub severity: Severity,
    /// MSS announced on the client's SYN; 0 when never observed.
    pub client_mss: u16,
    /// MSS announced on the server's SYN; 0 when never observed.
    pub server_mss: u16,
    pub stats: StreamStats,
    pub findings: Vec<String>,
    pub packets: Vec<PacketRecord>,
}

/// Aggregate metrics over a stream's packets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStats {
    pub start_time: f64,
    pub end_time: f64,
    pub duration_seconds: f64,
    pub packet_count: usize,
    pub retransmission_count: usize,
    pub reset_count: usize,
    pub has_timeout: bool,
}

/// Per-packet record kept inside a stream, in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRecord {
    pub timestamp: f64,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub payload_len: usize,
    pub window: u16,
    pub payload: Vec<u8>,
    pub is_retransmit: bool,
}

/// Transport or fingerprinted application protocol of a stream.
///
/// Streams start out labeled with their transport; the analysis engine may
/// promote the label once, based on payload signatures or well-known ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Tls,
    Http,
    Ssh,
    Dns,
}

impl Protocol {
    /// True while the stream still carries its bare transport label, i.e.
    /// application fingerprinting has not promoted it yet.
    pub fn is_transport(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Tls => "TLS",
            Protocol::Http => "HTTP",
            Protocol::Ssh => "SSH",
            Protocol::Dns => "DNS",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic severity attached to a stream.
///
/// Ordered `Normal < Warning < Critical`. Rules only ever raise the level
/// through [`Severity::promote`]; nothing demotes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    /// Raise to `candidate` when it ranks higher; lower candidates are ignored.
    pub fn promote(&mut self, candidate: Severity) {
        if candidate > *self {
            *self = candidate;
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TCP header flags, held as a bitmask.
///
/// Serialization emits the comma-joined canonical list (`"SYN,ACK"`); the
/// canonical order is SYN, ACK, FIN, RST, PSH regardless of how the mask was
/// assembled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const SYN: TcpFlags = TcpFlags(1 << 0);
    pub const ACK: TcpFlags = TcpFlags(1 << 1);
    pub const FIN: TcpFlags = TcpFlags(1 << 2);
    pub const RST: TcpFlags = TcpFlags(1 << 3);
    pub const PSH: TcpFlags = TcpFlags(1 << 4);

    const CANONICAL: [(TcpFlags, &'static str); 5] = [
        (TcpFlags::SYN, "SYN"),
        (TcpFlags::ACK, "ACK"),
        (TcpFlags::FIN, "FIN"),
        (TcpFlags::RST, "RST"),
        (TcpFlags::PSH, "PSH"),
    ];

    pub const fn empty() -> TcpFlags {
        TcpFlags(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: TcpFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TcpFlags) {
        self.0 |= other.0;
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in TcpFlags::CANONICAL {
            if self.contains(flag) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Error returned when a serialized flag list contains an unknown name.
#[derive(Debug, PartialEq, Eq)]
pub struct ParseTcpFlagsError(String);

impl fmt::Display for ParseTcpFlagsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown TCP flag: {}", self.0)
    }
}

impl std::error::Error for ParseTcpFlagsError {}

impl FromStr for TcpFlags {
    type Err = ParseTcpFlagsError;

    fn from_str(s: &str) -> Result<TcpFlags, ParseTcpFlagsError> {
        let mut flags = TcpFlags::empty();
        for token in s.split(',').filter(|token| !token.is_empty()) {
            let flag = TcpFlags::CANONICAL
                .iter()
                .find(|(_, name)| *name == token)
                .map(|(flag, _)| *flag)
                .ok_or_else(|| ParseTcpFlagsError(token.to_string()))?;
            flags.insert(flag);
        }
        Ok(flags)
    }
}

impl Serialize for TcpFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TcpFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<TcpFlags, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
