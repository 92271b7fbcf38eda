//! Frame decoding: raw capture frames into transport-level packet metadata.

use std::net::Ipv4Addr;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap_parser::Linktype;

use crate::{Protocol, TcpFlags};

/// Bytes of transport payload copied out of each frame.
pub(crate) const PAYLOAD_SNAP_LEN: usize = 2048;

/// Transport protocols the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transport {
    Tcp,
    Udp,
}

impl From<Transport> for Protocol {
    fn from(transport: Transport) -> Protocol {
        match transport {
            Transport::Tcp => Protocol::Tcp,
            Transport::Udp => Protocol::Udp,
        }
    }
}

/// Per-packet metadata emitted by the decoder worker.
///
/// Only produced when both an IPv4 header and a supported transport header
/// decode cleanly. `payload` is an owned copy capped at [`PAYLOAD_SNAP_LEN`]
/// bytes; `payload_len` keeps the uncapped transport payload length.
#[derive(Debug, Clone)]
pub(crate) struct PacketMeta {
    pub timestamp: f64,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub transport: Transport,
    pub frame_length: usize,
    pub flags: TcpFlags,
    pub seq: u32,
    pub ack: u32,
    pub window: u16,
    pub payload_len: usize,
    pub payload: Vec<u8>,
    pub mss: Option<u16>,
}

/// Decode one captured frame into [`PacketMeta`].
///
/// Returns `None` for anything that is not IPv4 over a supported link layer
/// carrying TCP or UDP; such frames are dropped silently per the decoder
/// contract.
pub(crate) fn decode_frame(linktype: Linktype, ts: f64, data: &[u8]) -> Option<PacketMeta> {
    let sliced = match linktype {
        Linktype::ETHERNET => SlicedPacket::from_ethernet(data).ok()?,
        Linktype::RAW => SlicedPacket::from_ip(data).ok()?,
        _ => return None,
    };

    let (src_ip, dst_ip) = match sliced.net? {
        NetSlice::Ipv4(ref ipv4) => (
            ipv4.header().source_addr(),
            ipv4.header().destination_addr(),
        ),
        _ => return None,
    };

    match sliced.transport? {
        TransportSlice::Tcp(tcp) => {
            let payload = tcp.payload();
            let mut flags = TcpFlags::empty();
            if tcp.syn() {
                flags.insert(TcpFlags::SYN);
            }
            if tcp.ack() {
                flags.insert(TcpFlags::ACK);
            }
            if tcp.fin() {
                flags.insert(TcpFlags::FIN);
            }
            if tcp.rst() {
                flags.insert(TcpFlags::RST);
            }
            if tcp.psh() {
                flags.insert(TcpFlags::PSH);
            }

            Some(PacketMeta {
                timestamp: ts,
                src_ip,
                dst_ip,
                src_port: tcp.source_port(),
                dst_port: tcp.destination_port(),
                transport: Transport::Tcp,
                frame_length: data.len(),
                flags,
                seq: tcp.sequence_number(),
                ack: tcp.acknowledgment_number(),
                window: tcp.window_size(),
                payload_len: payload.len(),
                payload: snap_payload(payload),
                mss: mss_option(tcp.options()),
            })
        }
        TransportSlice::Udp(udp) => {
            let payload = udp.payload();
            Some(PacketMeta {
                timestamp: ts,
                src_ip,
                dst_ip,
                src_port: udp.source_port(),
                dst_port: udp.destination_port(),
                transport: Transport::Udp,
                frame_length: data.len(),
                flags: TcpFlags::empty(),
                seq: 0,
                ack: 0,
                window: 0,
                payload_len: payload.len(),
                payload: snap_payload(payload),
                mss: None,
            })
        }
        _ => None,
    }
}

fn snap_payload(payload: &[u8]) -> Vec<u8> {
    payload[..payload.len().min(PAYLOAD_SNAP_LEN)].to_vec()
}

/// Scan TCP options for a Maximum Segment Size option (kind 2, length 4).
///
/// Stops at end-of-options and bails on malformed lengths rather than
/// guessing; a frame without a well-formed MSS option simply reports none.
fn mss_option(mut options: &[u8]) -> Option<u16> {
    loop {
        match options {
            [] | [0, ..] => return None,
            [1, rest @ ..] => options = rest,
            [2, 4, hi, lo, ..] => return Some(u16::from_be_bytes([*hi, *lo])),
            [_, len, ..] => {
                let len = *len as usize;
                if len < 2 || len > options.len() {
                    return None;
                }
                options = &options[len..];
            }
            [_] => return None,
        }
    }
}
