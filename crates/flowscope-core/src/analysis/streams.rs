//! Stream reconstruction: direction-agnostic grouping of decoded packets.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;

use crate::analysis::decode::PacketMeta;
use crate::{PacketRecord, Severity, Stream, StreamStats, TcpFlags};

/// Canonical identifier for a conversation.
///
/// Orders the endpoints by lexicographic comparison of their textual IPv4
/// forms so both directions of a conversation produce the same key. The
/// client/server role assignment is independent of this ordering and stays
/// with the first-seen direction.
pub(crate) fn stream_id(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
) -> String {
    let (src, dst) = (src_ip.to_string(), dst_ip.to_string());
    if src < dst {
        format!("{src}:{src_port}-{dst}:{dst_port}")
    } else {
        format!("{dst}:{dst_port}-{src}:{src_port}")
    }
}

/// Accumulates decoded packets into per-conversation [`Stream`] state.
///
/// Single-writer: the queue consumer is the only caller of
/// [`StreamBuilder::process_packet`] during ingestion. The map sits behind a
/// reader-writer lock so a concurrent reader always observes a consistent
/// snapshot; [`StreamBuilder::into_streams`] is the terminal snapshot taken
/// once the writer is done.
pub(crate) struct StreamBuilder {
    streams: RwLock<HashMap<String, Stream>>,
}

impl StreamBuilder {
    pub(crate) fn new() -> StreamBuilder {
        StreamBuilder {
            streams: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn process_packet(&self, pkt: PacketMeta) {
        let id = stream_id(pkt.src_ip, pkt.dst_ip, pkt.src_port, pkt.dst_port);
        let mut streams = self.streams.write().unwrap();
        let stream = streams
            .entry(id)
            .or_insert_with_key(|id| new_stream(id, &pkt));

        stream.stats.packet_count += 1;
        stream.stats.end_time = pkt.timestamp;
        stream.stats.duration_seconds = stream.stats.end_time - stream.stats.start_time;

        // MSS is only trusted on the SYN exchange; the first observed value
        // per side wins.
        if pkt.flags.contains(TcpFlags::SYN) {
            if let Some(mss) = pkt.mss {
                if pkt.src_ip == stream.client_ip {
                    if stream.client_mss == 0 {
                        stream.client_mss = mss;
                    }
                } else if stream.server_mss == 0 {
                    stream.server_mss = mss;
                }
            }
        }

        stream.packets.push(PacketRecord {
            timestamp: pkt.timestamp,
            src_ip: pkt.src_ip,
            dst_ip: pkt.dst_ip,
            seq: pkt.seq,
            ack: pkt.ack,
            flags: pkt.flags,
            payload_len: pkt.payload_len,
            window: pkt.window,
            payload: pkt.payload,
            is_retransmit: false,
        });
    }

    /// Terminal snapshot; order is unspecified.
    pub(crate) fn into_streams(self) -> Vec<Stream> {
        self.streams.into_inner().unwrap().into_values().collect()
    }
}

fn new_stream(id: &str, pkt: &PacketMeta) -> Stream {
    Stream {
        id: id.to_string(),
        client_ip: pkt.src_ip,
        client_port: pkt.src_port,
        server_ip: pkt.dst_ip,
        server_port: pkt.dst_port,
        protocol: pkt.transport.into(),
        severity: Severity::Normal,
        client_mss: 0,
        server_mss: 0,
        stats: StreamStats {
            start_time: pkt.timestamp,
            end_time: pkt.timestamp,
            duration_seconds: 0.0,
            packet_count: 0,
            retransmission_count: 0,
            reset_count: 0,
            has_timeout: false,
        },
        findings: Vec::new(),
        packets: Vec::new(),
    }
}
