//! [`PanTiltRig`] – the two-axis scanning head.
//!
//! The rig owns one [`Actuator`] per [`Axis`] and exposes them through the
//! [`ActuatorSource`] capability used by the sweep scheduler.  Repeating a
//! command for an axis that is already at the requested angle is a no-op, so
//! callers may issue idempotent `move_to` calls freely.
//!
//! [`ActuatorSource::park`] is the defined neutral state: both axes are
//! released (drive signal off), matching what happens at the end of every
//! sweep.

use tiltscan_types::{Axis, ScanError};
use tracing::{debug, warn};

use crate::actuator::Actuator;

/// Capability to position the scanning head.
pub trait ActuatorSource: Send {
    /// Move `axis` to `angle_deg`, blocking until settled.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::HardwareFault`] when the axis driver fails.
    fn move_to(&mut self, axis: Axis, angle_deg: f64) -> Result<(), ScanError>;

    /// Release both axes.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScanError::HardwareFault`] encountered; every axis
    /// is still attempted.
    fn park(&mut self) -> Result<(), ScanError>;
}

impl<T: ActuatorSource + ?Sized> ActuatorSource for Box<T> {
    fn move_to(&mut self, axis: Axis, angle_deg: f64) -> Result<(), ScanError> {
        (**self).move_to(axis, angle_deg)
    }

    fn park(&mut self) -> Result<(), ScanError> {
        (**self).park()
    }
}

/// Pan and tilt actuators bundled into one [`ActuatorSource`].
pub struct PanTiltRig {
    pan: Box<dyn Actuator>,
    tilt: Box<dyn Actuator>,
}

impl PanTiltRig {
    pub fn new(pan: Box<dyn Actuator>, tilt: Box<dyn Actuator>) -> Self {
        Self { pan, tilt }
    }

    /// The last commanded angle of `axis`.
    pub fn angle(&self, axis: Axis) -> Option<f64> {
        self.actuator(axis).angle()
    }

    fn actuator(&self, axis: Axis) -> &Box<dyn Actuator> {
        match axis {
            Axis::Pan => &self.pan,
            Axis::Tilt => &self.tilt,
        }
    }

    fn actuator_mut(&mut self, axis: Axis) -> &mut Box<dyn Actuator> {
        match axis {
            Axis::Pan => &mut self.pan,
            Axis::Tilt => &mut self.tilt,
        }
    }
}

impl ActuatorSource for PanTiltRig {
    fn move_to(&mut self, axis: Axis, angle_deg: f64) -> Result<(), ScanError> {
        let act = self.actuator_mut(axis);
        if act.angle() == Some(angle_deg) {
            return Ok(());
        }
        debug!(%axis, angle_deg, actuator = act.id(), "moving axis");
        act.move_to(angle_deg)
    }

    fn park(&mut self) -> Result<(), ScanError> {
        let mut first_err = None;
        for axis in [Axis::Pan, Axis::Tilt] {
            if let Err(e) = self.actuator_mut(axis).release() {
                warn!(%axis, error = %e, "failed to release axis");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
