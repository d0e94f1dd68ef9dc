//! Generic `Actuator` trait for the position-controlled axes of the scanning
//! head.
//!
//! Drivers implement this trait and are handed to a
//! [`PanTiltRig`][crate::rig::PanTiltRig].  The sweep only ever talks to the
//! rig, so a servo driver can be swapped for a stepper or a simulation without
//! touching scheduling logic.

use tiltscan_types::ScanError;

/// A single position-controlled axis (servo, stepper, …).
pub trait Actuator: Send {
    /// Stable identifier for this actuator, e.g. `"pan"` or `"tilt"`.
    fn id(&self) -> &str;

    /// Command the actuator to `angle_deg` and block until it has settled.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::HardwareFault`] if the command cannot be applied.
    fn move_to(&mut self, angle_deg: f64) -> Result<(), ScanError>;

    /// The most recently commanded angle, or `None` when the axis has not
    /// been driven since it was created or released.
    fn angle(&self) -> Option<f64>;

    /// Stop driving the axis (drive signal off).
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::HardwareFault`] if the output cannot be disabled.
    fn release(&mut self) -> Result<(), ScanError>;
}
