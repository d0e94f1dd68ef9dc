//! TFmini-family rangefinder frame codec.
//!
//! The sensor streams fixed 9-byte frames over a UART:
//!
//! ```text
//! 0x59 0x59 dist_lo dist_hi str_lo str_hi temp_lo temp_hi checksum
//! ```
//!
//! - distance in centimeters, little endian
//! - checksum is the low byte of the sum of the first eight bytes
//! - temperature is `raw / 8 − 256` °C
//!
//! [`FrameReader`] hunts for the double header in an arbitrary byte stream and
//! gives up after a fixed byte budget, so a disconnected or noisy line surfaces
//! as `SyncLost` instead of a hung read.

use std::io::{self, Read};

use thiserror::Error;
use tiltscan_types::{RawFrame, ScanError};
use tracing::trace;

use crate::distance::DistanceSource;

/// Length of one frame in bytes.
pub const FRAME_LEN: usize = 9;
/// Header byte, repeated twice at the start of every frame (`'Y'`).
pub const HEADER: u8 = 0x59;
/// Default number of bytes scanned for a header before giving up.
pub const DEFAULT_SYNC_BUDGET: usize = 200;

/// Errors produced while framing or decoding.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("no frame header within {scanned} byte(s)")]
    NoHeader { scanned: usize },

    #[error("frame does not start with 0x5959")]
    BadHeader,

    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },

    #[error("stream ended inside a frame")]
    Truncated,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<FrameError> for ScanError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => ScanError::HardwareFault {
                component: "rangefinder".to_string(),
                details: e.to_string(),
            },
            other => ScanError::SyncLost(other.to_string()),
        }
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Decode one complete frame.
///
/// # Errors
///
/// [`FrameError::BadHeader`] or [`FrameError::Checksum`] for a corrupt frame.
pub fn decode(bytes: &[u8; FRAME_LEN]) -> Result<RawFrame, FrameError> {
    if bytes[0] != HEADER || bytes[1] != HEADER {
        return Err(FrameError::BadHeader);
    }
    let expected = checksum(&bytes[..FRAME_LEN - 1]);
    let actual = bytes[FRAME_LEN - 1];
    if expected != actual {
        return Err(FrameError::Checksum { expected, actual });
    }
    let distance_cm = u16::from_le_bytes([bytes[2], bytes[3]]);
    let strength = u16::from_le_bytes([bytes[4], bytes[5]]);
    let temp_raw = u16::from_le_bytes([bytes[6], bytes[7]]);
    Ok(RawFrame {
        distance_cm,
        strength,
        temperature_c: f64::from(temp_raw) / 8.0 - 256.0,
    })
}

/// Encode a frame, computing its checksum.  Mostly useful for simulation and
/// tests.
pub fn encode(distance_cm: u16, strength: u16, temp_raw: u16) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    out[0] = HEADER;
    out[1] = HEADER;
    out[2..4].copy_from_slice(&distance_cm.to_le_bytes());
    out[4..6].copy_from_slice(&strength.to_le_bytes());
    out[6..8].copy_from_slice(&temp_raw.to_le_bytes());
    out[8] = checksum(&out[..FRAME_LEN - 1]);
    out
}

/// Header-hunting frame reader over any byte stream.
///
/// A read that times out counts against the sync budget like a consumed
/// byte, so a silent line exhausts the budget instead of blocking forever.
pub struct FrameReader<R> {
    inner: R,
    sync_budget: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            sync_budget: DEFAULT_SYNC_BUDGET,
        }
    }

    /// Override the header search budget (builder-style).
    pub fn with_sync_budget(mut self, bytes: usize) -> Self {
        self.sync_budget = bytes.max(2);
        self
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Read and decode the next frame from the stream.
    ///
    /// # Errors
    ///
    /// See [`FrameError`].
    pub fn next_frame(&mut self) -> Result<RawFrame, FrameError> {
        let mut saw_header = false;
        for scanned in 0..self.sync_budget {
            let Some(byte) = self.next_byte()? else {
                saw_header = false;
                continue;
            };
            if byte != HEADER {
                saw_header = false;
                continue;
            }
            if !saw_header {
                saw_header = true;
                continue;
            }

            let mut frame = [0u8; FRAME_LEN];
            frame[0] = HEADER;
            frame[1] = HEADER;
            self.read_body(&mut frame[2..])?;
            trace!(scanned, "frame header found");
            return decode(&frame);
        }
        Err(FrameError::NoHeader {
            scanned: self.sync_budget,
        })
    }

    // `Ok(None)` on a read timeout; EOF is a hard stop for the current frame.
    fn next_byte(&mut self) -> Result<Option<u8>, FrameError> {
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Err(FrameError::Truncated),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(FrameError::Io(e)),
            }
        }
    }

    fn read_body(&mut self, body: &mut [u8]) -> Result<(), FrameError> {
        match self.inner.read_exact(body) {
            Ok(()) => Ok(()),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::UnexpectedEof
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::WouldBlock
                ) =>
            {
                Err(FrameError::Truncated)
            }
            Err(e) => Err(FrameError::Io(e)),
        }
    }
}

impl<R: Read + Send> DistanceSource for FrameReader<R> {
    fn read_raw(&mut self) -> Result<RawFrame, ScanError> {
        Ok(self.next_frame()?)
    }
}
