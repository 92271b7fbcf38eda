//! Capture sources.
//!
//! A source hands the pipeline raw link-layer frames and does no protocol
//! work; turning frames into packet metadata is the decoder's job. The
//! types here therefore speak in frames: the bytes as captured, the
//! linktype needed to decode them, and a timestamp already normalized to
//! seconds so the rest of the pipeline never sees container-specific tick
//! units.

mod pcap;

pub use pcap::PcapFileSource;

use std::fmt;

use pcap_parser::Linktype;
use thiserror::Error;

/// One captured frame, before any decoding.
///
/// # Examples
/// ```
/// use flowscope_core::RawFrame;
/// use pcap_parser::Linktype;
///
/// let frame = RawFrame {
///     ts: 42.125,
///     linktype: Linktype::ETHERNET,
///     data: vec![0u8; 64],
/// };
/// assert_eq!(frame.data.len(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Capture timestamp, seconds since the Unix epoch. Microsecond and
    /// nanosecond record precisions both land here normalized.
    pub ts: f64,
    /// Link layer the frame bytes start at.
    pub linktype: Linktype,
    /// Frame bytes as captured; may be shorter than the original frame when
    /// the capture was snapped.
    pub data: Vec<u8>,
}

/// Something that yields captured frames in arrival order.
///
/// The decoder worker drains a `FrameSource` to completion on its own
/// thread; an implementation only has to produce the next frame or say the
/// capture is finished.
///
/// # Examples
/// ```
/// use flowscope_core::{FrameSource, RawFrame, SourceError};
///
/// /// Replays a fixed list of frames; handy in tests.
/// struct Replay(Vec<RawFrame>);
///
/// impl FrameSource for Replay {
///     fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
///         if self.0.is_empty() {
///             Ok(None)
///         } else {
///             Ok(Some(self.0.remove(0)))
///         }
///     }
/// }
/// ```
pub trait FrameSource {
    /// Returns the next frame, or `None` once the capture is exhausted.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError>;
}

/// Capture container format, as sniffed from the file magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Pcap,
    PcapNg,
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CaptureFormat::Pcap => "pcap",
            CaptureFormat::PcapNg => "pcapng",
        })
    }
}

/// Why a capture could not be read.
///
/// `Io` and `UnrecognizedFormat` surface before the first frame and abort
/// the run. `Malformed` can also show up mid-capture; the pipeline treats
/// that as a truncated capture and keeps whatever streams were already
/// built.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading the capture from disk failed.
    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The file starts with bytes no supported container uses.
    #[error("unrecognized capture format (magic {magic:02x?}); expected pcap or pcapng")]
    UnrecognizedFormat { magic: [u8; 4] },
    /// The container parser rejected the capture.
    #[error("malformed {format} capture after frame {frames_read}: {message}")]
    Malformed {
        format: CaptureFormat,
        /// Frames successfully read before the failure.
        frames_read: u64,
        message: String,
    },
}
