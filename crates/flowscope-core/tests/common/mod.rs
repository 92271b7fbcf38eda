//! Synthetic capture builders shared by the integration tests.
//!
//! Everything here writes byte-exact pcap/pcapng containers so the tests
//! never depend on binary fixture files.

#![allow(dead_code)]

pub const FIN: u8 = 0x01;
pub const SYN: u8 = 0x02;
pub const RST: u8 = 0x04;
pub const PSH: u8 = 0x08;
pub const ACK: u8 = 0x10;

const PCAP_MAGIC_USEC: u32 = 0xa1b2_c3d4;
const PCAP_MAGIC_NSEC: u32 = 0xa1b2_3c4d;
const LINKTYPE_ETHERNET: u32 = 1;

/// Legacy pcap container with microsecond record timestamps.
pub fn legacy_pcap(frames: &[(f64, Vec<u8>)]) -> Vec<u8> {
    legacy_pcap_with_magic(PCAP_MAGIC_USEC, 1e6, frames)
}

/// Legacy pcap container with nanosecond record timestamps.
pub fn legacy_pcap_nsec(frames: &[(f64, Vec<u8>)]) -> Vec<u8> {
    legacy_pcap_with_magic(PCAP_MAGIC_NSEC, 1e9, frames)
}

fn legacy_pcap_with_magic(magic: u32, ticks_per_sec: f64, frames: &[(f64, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&magic.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes()); // thiszone
    out.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
    out.extend_from_slice(&65535u32.to_le_bytes()); // snaplen
    out.extend_from_slice(&LINKTYPE_ETHERNET.to_le_bytes());

    for (ts, data) in frames {
        let sec = *ts as u32;
        let frac = ((ts - sec as f64) * ticks_per_sec).round() as u32;
        out.extend_from_slice(&sec.to_le_bytes());
        out.extend_from_slice(&frac.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}

/// pcapng container: one section, one Ethernet interface, one enhanced
/// packet block per frame (microsecond timestamp resolution).
pub fn pcapng(frames: &[(f64, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();

    let shb_len = 28u32;
    out.extend_from_slice(&0x0a0d_0d0au32.to_le_bytes());
    out.extend_from_slice(&shb_len.to_le_bytes());
    out.extend_from_slice(&0x1a2b_3c4du32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&u64::MAX.to_le_bytes()); // section length unknown
    out.extend_from_slice(&shb_len.to_le_bytes());

    let idb_len = 20u32;
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&idb_len.to_le_bytes());
    out.extend_from_slice(&(LINKTYPE_ETHERNET as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // reserved
    out.extend_from_slice(&0u32.to_le_bytes()); // snaplen: unlimited
    out.extend_from_slice(&idb_len.to_le_bytes());

    for (ts, data) in frames {
        let ticks = (*ts * 1e6).round() as u64;
        let pad = (4 - data.len() % 4) % 4;
        let total = (32 + data.len() + pad) as u32;
        out.extend_from_slice(&6u32.to_le_bytes());
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // interface id
        out.extend_from_slice(&((ticks >> 32) as u32).to_le_bytes());
        out.extend_from_slice(&(ticks as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out.extend_from_slice(&vec![0u8; pad]);
        out.extend_from_slice(&total.to_le_bytes());
    }
    out
}

/// One IPv4/TCP segment wrapped in an Ethernet frame.
pub struct TcpFrame {
    pub src: [u8; 4],
    pub src_port: u16,
    pub dst: [u8; 4],
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
    pub window: u16,
    pub mss: Option<u16>,
    pub payload: Vec<u8>,
}

impl Default for TcpFrame {
    fn default() -> Self {
        TcpFrame {
            src: [10, 0, 0, 1],
            src_port: 1234,
            dst: [10, 0, 0, 2],
            dst_port: 80,
            seq: 0,
            ack: 0,
            flags: ACK,
            window: 1024,
            mss: None,
            payload: Vec::new(),
        }
    }
}

impl TcpFrame {
    pub fn build(&self) -> Vec<u8> {
        let mut options = Vec::new();
        if let Some(mss) = self.mss {
            options.push(2);
            options.push(4);
            options.extend_from_slice(&mss.to_be_bytes());
        }

        let mut tcp = Vec::new();
        tcp.extend_from_slice(&self.src_port.to_be_bytes());
        tcp.extend_from_slice(&self.dst_port.to_be_bytes());
        tcp.extend_from_slice(&self.seq.to_be_bytes());
        tcp.extend_from_slice(&self.ack.to_be_bytes());
        let data_offset = 5 + (options.len() / 4) as u8;
        tcp.push(data_offset << 4);
        tcp.push(self.flags);
        tcp.extend_from_slice(&self.window.to_be_bytes());
        tcp.extend_from_slice(&0u16.to_be_bytes()); // checksum, not validated
        tcp.extend_from_slice(&0u16.to_be_bytes()); // urgent pointer
        tcp.extend_from_slice(&options);
        tcp.extend_from_slice(&self.payload);

        ethernet_ipv4(self.src, self.dst, 6, &tcp)
    }
}

/// One IPv4/UDP datagram wrapped in an Ethernet frame.
pub fn udp_frame(
    src: [u8; 4],
    src_port: u16,
    dst: [u8; 4],
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut udp = Vec::new();
    udp.extend_from_slice(&src_port.to_be_bytes());
    udp.extend_from_slice(&dst_port.to_be_bytes());
    udp.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    udp.extend_from_slice(&0u16.to_be_bytes()); // checksum, not validated
    udp.extend_from_slice(payload);

    ethernet_ipv4(src, dst, 17, &udp)
}

/// An ARP frame; the decoder must drop it.
pub fn arp_frame() -> Vec<u8> {
    let mut frame = vec![0u8; 12];
    frame.extend_from_slice(&0x0806u16.to_be_bytes());
    frame.extend_from_slice(&[0u8; 28]);
    frame
}

fn ethernet_ipv4(src: [u8; 4], dst: [u8; 4], protocol: u8, transport: &[u8]) -> Vec<u8> {
    let mut ip = Vec::new();
    ip.push(0x45);
    ip.push(0);
    ip.extend_from_slice(&((20 + transport.len()) as u16).to_be_bytes());
    ip.extend_from_slice(&[0, 0, 0, 0]); // id + fragmentation
    ip.push(64);
    ip.push(protocol);
    ip.extend_from_slice(&0u16.to_be_bytes()); // checksum, not validated
    ip.extend_from_slice(&src);
    ip.extend_from_slice(&dst);

    let mut frame = Vec::new();
    frame.extend_from_slice(&[0u8; 12]); // mac addresses
    frame.extend_from_slice(&0x0800u16.to_be_bytes());
    frame.extend_from_slice(&ip);
    frame.extend_from_slice(transport);
    frame
}
