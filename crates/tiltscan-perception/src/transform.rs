//! Spherical → cartesian projection of range samples.
//!
//! The sensor sits at `(0, 0, H)` and looks straight down at pan = tilt = 0.
//! Pan swings the beam along +x, tilt along +y:
//!
//! ```text
//! x = d · cos(tilt) · sin(pan)
//! y = d · sin(tilt)
//! z = H − d · cos(pan) · cos(tilt)
//! ```
//!
//! This is the one convention used by every stage downstream.
//!
//! # Example
//!
//! ```rust
//! use tiltscan_perception::transform::spherical_to_cartesian;
//!
//! let p = spherical_to_cartesian(100.0, 0.0, 0.0, 70.0);
//! assert!((p.z + 30.0).abs() < 1e-9);
//! ```

use tiltscan_types::{Point3D, ScanSample};

/// Project one reading taken at (`pan_deg`, `tilt_deg`) from a sensor mounted
/// `sensor_height_cm` above the ground.
pub fn spherical_to_cartesian(
    distance_cm: f64,
    pan_deg: f64,
    tilt_deg: f64,
    sensor_height_cm: f64,
) -> Point3D {
    let (a, b) = (pan_deg.to_radians(), tilt_deg.to_radians());
    Point3D::new(
        distance_cm * b.cos() * a.sin(),
        distance_cm * b.sin(),
        sensor_height_cm - distance_cm * a.cos() * b.cos(),
    )
}

/// [`spherical_to_cartesian`] bound to a fixed mounting height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalProjection {
    pub sensor_height_cm: f64,
}

impl SphericalProjection {
    pub fn new(sensor_height_cm: f64) -> Self {
        Self { sensor_height_cm }
    }

    pub fn project(&self, sample: &ScanSample) -> Point3D {
        spherical_to_cartesian(
            sample.distance_cm,
            sample.pan_deg,
            sample.tilt_deg,
            self.sensor_height_cm,
        )
    }
}
