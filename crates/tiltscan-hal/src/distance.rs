//! The `DistanceSource` capability.

use tiltscan_types::{RawFrame, ScanError};

/// A single-point rangefinder.
///
/// `read_raw` performs one bounded, blocking read of a sensor frame.  When the
/// byte stream cannot be synchronised within the driver's budget it returns
/// [`ScanError::SyncLost`]; retry policy lives above this trait, in the range
/// sampler.
pub trait DistanceSource: Send {
    /// # Errors
    ///
    /// - [`ScanError::SyncLost`] – no valid frame could be framed this call.
    /// - [`ScanError::HardwareFault`] – the underlying device failed.
    fn read_raw(&mut self) -> Result<RawFrame, ScanError>;
}

impl<T: DistanceSource + ?Sized> DistanceSource for Box<T> {
    fn read_raw(&mut self) -> Result<RawFrame, ScanError> {
        (**self).read_raw()
    }
}
