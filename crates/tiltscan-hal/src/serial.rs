//! [`SerialRangefinder`] – TFmini-family LiDAR on a UART.

use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tiltscan_types::{RawFrame, ScanError};
use tracing::{debug, info};

use crate::distance::DistanceSource;
use crate::frame::FrameReader;

/// Default UART speed of the sensor.
pub const DEFAULT_BAUD: u32 = 115_200;

/// A rangefinder reached through a serial port.
///
/// The sensor streams frames continuously; stale frames accumulate in the
/// driver's receive buffer while the head is moving.  Each
/// [`read_raw`][DistanceSource::read_raw] therefore discards pending input
/// before framing, so the returned distance belongs to the current pose.
pub struct SerialRangefinder {
    reader: FrameReader<Box<dyn SerialPort>>,
    path: String,
}

impl SerialRangefinder {
    /// Open `path` at `baud_rate` (8N1, no flow control).
    ///
    /// `read_timeout` bounds every single byte read; together with the frame
    /// reader's sync budget it bounds the whole call.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::HardwareFault`] if the port cannot be opened.
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, ScanError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|e| ScanError::HardwareFault {
                component: path.to_string(),
                details: e.to_string(),
            })?;

        info!(path, baud_rate, "opened rangefinder serial port");

        Ok(Self {
            reader: FrameReader::new(port),
            path: path.to_string(),
        })
    }

    /// Override the header search budget (builder-style).
    pub fn with_sync_budget(mut self, bytes: usize) -> Self {
        self.reader = self.reader.with_sync_budget(bytes);
        self
    }
}

impl DistanceSource for SerialRangefinder {
    fn read_raw(&mut self) -> Result<RawFrame, ScanError> {
        if let Err(e) = self.reader.get_mut().clear(ClearBuffer::Input) {
            debug!(path = %self.path, error = %e, "could not flush serial input");
        }
        self.reader.read_raw()
    }
}
