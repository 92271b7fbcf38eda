//! PCAP and PCAPNG file sources.
//!
//! The leading four file bytes pick the container; anything unrecognized is
//! rejected at open time with the sniffed magic in the error. Legacy
//! captures fix their timestamp tick size (microseconds or nanoseconds) at
//! open time too, so record timestamps convert to seconds without consulting
//! the header again.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use pcap_parser::{
    Block, LegacyPcapReader, Linktype, PcapBlockOwned, PcapError, PcapNGReader,
    traits::PcapReaderIterator,
};

use super::{CaptureFormat, FrameSource, RawFrame, SourceError};

const READER_BUFFER_SIZE: usize = 65536;

/// Leading file bytes of a legacy capture: microsecond and nanosecond
/// precision, each in both byte orders.
const PCAP_MAGICS: [[u8; 4]; 4] = [
    [0xd4, 0xc3, 0xb2, 0xa1],
    [0xa1, 0xb2, 0xc3, 0xd4],
    [0x4d, 0x3c, 0xb2, 0xa1],
    [0xa1, 0xb2, 0x3c, 0x4d],
];

/// Leading file bytes of a pcapng section header block.
const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

/// Legacy magics that announce nanosecond record timestamps, as the u32
/// pcap-parser reads from the leading bytes.
const PCAP_MAGIC_NSEC: u32 = 0xa1b2_3c4d;
const PCAP_MAGIC_NSEC_SWAPPED: u32 = 0x4d3c_b2a1;

/// Frame source backed by a capture file on disk.
///
/// Accepts legacy pcap in either byte order with microsecond or nanosecond
/// records, and pcapng. A file that starts with anything else fails at
/// [`PcapFileSource::open`], before any frame is produced.
///
/// # Examples
/// ```no_run
/// use flowscope_core::{FrameSource, PcapFileSource};
/// use std::path::Path;
///
/// let mut source = PcapFileSource::open(Path::new("capture.pcap"))?;
/// let mut frames = 0;
/// while let Some(_frame) = source.next_frame()? {
///     frames += 1;
/// }
/// # Ok::<(), flowscope_core::SourceError>(())
/// ```
pub struct PcapFileSource {
    reader: CaptureReader,
    frames_read: u64,
}

enum CaptureReader {
    Pcap {
        inner: LegacyPcapReader<File>,
        /// Seconds per timestamp fraction tick, fixed by the sniffed magic.
        ts_divisor: f64,
        linktype: Option<Linktype>,
    },
    PcapNg {
        inner: PcapNGReader<File>,
        /// Linktype per interface id, in declaration order.
        linktypes: Vec<Linktype>,
    },
}

impl PcapFileSource {
    /// Open a capture file, sniffing the container from its magic.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let mut file = File::open(path)?;
        let magic = sniff_magic(&mut file)?;

        let reader = if magic == PCAPNG_MAGIC {
            let inner = PcapNGReader::new(READER_BUFFER_SIZE, file)
                .map_err(|e| malformed(CaptureFormat::PcapNg, 0, e))?;
            CaptureReader::PcapNg {
                inner,
                linktypes: Vec::new(),
            }
        } else if PCAP_MAGICS.contains(&magic) {
            let ts_divisor = match u32::from_le_bytes(magic) {
                PCAP_MAGIC_NSEC | PCAP_MAGIC_NSEC_SWAPPED => 1e-9,
                _ => 1e-6,
            };
            let inner = LegacyPcapReader::new(READER_BUFFER_SIZE, file)
                .map_err(|e| malformed(CaptureFormat::Pcap, 0, e))?;
            CaptureReader::Pcap {
                inner,
                ts_divisor,
                linktype: None,
            }
        } else {
            return Err(SourceError::UnrecognizedFormat { magic });
        };

        Ok(Self {
            reader,
            frames_read: 0,
        })
    }
}

impl FrameSource for PcapFileSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        let frames_read = self.frames_read;
        let frame = match &mut self.reader {
            CaptureReader::Pcap {
                inner,
                ts_divisor,
                linktype,
            } => read_pcap_frame(inner, *ts_divisor, linktype, frames_read)?,
            CaptureReader::PcapNg { inner, linktypes } => {
                read_pcapng_frame(inner, linktypes, frames_read)?
            }
        };
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }
}

fn sniff_magic(file: &mut File) -> Result<[u8; 4], SourceError> {
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(magic)
}

fn read_pcap_frame(
    reader: &mut LegacyPcapReader<File>,
    ts_divisor: f64,
    linktype: &mut Option<Linktype>,
    frames_read: u64,
) -> Result<Option<RawFrame>, SourceError> {
    loop {
        match reader.next() {
            Ok((consumed, block)) => {
                let frame = match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        *linktype = Some(header.network);
                        None
                    }
                    PcapBlockOwned::Legacy(record) => Some(RawFrame {
                        ts: record.ts_sec as f64 + record.ts_usec as f64 * ts_divisor,
                        linktype: linktype.unwrap_or(Linktype::ETHERNET),
                        data: record.data.to_vec(),
                    }),
                    _ => None,
                };
                reader.consume(consumed);
                if frame.is_some() {
                    return Ok(frame);
                }
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| malformed(CaptureFormat::Pcap, frames_read, e))?;
            }
            Err(e) => return Err(malformed(CaptureFormat::Pcap, frames_read, e)),
        }
    }
}

fn read_pcapng_frame(
    reader: &mut PcapNGReader<File>,
    linktypes: &mut Vec<Linktype>,
    frames_read: u64,
) -> Result<Option<RawFrame>, SourceError> {
    loop {
        match reader.next() {
            Ok((consumed, block)) => {
                let frame = match block {
                    PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                        linktypes.push(idb.linktype);
                        None
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => Some(RawFrame {
                        ts: ng_ts_seconds(epb.ts_high, epb.ts_low),
                        linktype: linktypes
                            .get(epb.if_id as usize)
                            .copied()
                            .unwrap_or(Linktype::ETHERNET),
                        data: epb.data.to_vec(),
                    }),
                    _ => None,
                };
                reader.consume(consumed);
                if frame.is_some() {
                    return Ok(frame);
                }
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| malformed(CaptureFormat::PcapNg, frames_read, e))?;
            }
            Err(e) => return Err(malformed(CaptureFormat::PcapNg, frames_read, e)),
        }
    }
}

/// Enhanced packet block timestamps tick at the default microsecond
/// interface resolution.
fn ng_ts_seconds(ts_high: u32, ts_low: u32) -> f64 {
    let ticks = ((ts_high as u64) << 32) | ts_low as u64;
    ticks as f64 * 1e-6
}

fn malformed<E: fmt::Display>(format: CaptureFormat, frames_read: u64, err: E) -> SourceError {
    SourceError::Malformed {
        format,
        frames_read,
        message: err.to_string(),
    }
}
