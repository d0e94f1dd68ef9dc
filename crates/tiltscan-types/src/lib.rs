//! `tiltscan-types` – shared data model for the tiltscan workspace.
//!
//! Every crate in the pipeline speaks in these types: raw [`ScanSample`]s
//! captured by the sweep, [`Point3D`]s and [`PointCloud`]s produced by the
//! spherical projection, the fitted ground [`Plane`], and the configuration
//! records that drive a run.  [`ScanError`] is the single error taxonomy that
//! crosses crate boundaries.
//!
//! Units: distances and coordinates are centimeters, angles are degrees.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// A reconstructed surface point, first sensor-relative, later ground-relative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// One raw range reading tagged with the actuator pose at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanSample {
    pub pan_deg: f64,
    pub tilt_deg: f64,
    pub distance_cm: f64,
}

/// Ordered sequence of [`Point3D`].
///
/// Plane fitting and gridding refuse an empty cloud; use
/// [`PointCloud::ensure_non_empty`] before handing one downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointCloud {
    points: Vec<Point3D>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, point: Point3D) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3D] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point3D> {
        self.points.iter()
    }

    /// # Errors
    ///
    /// Returns [`ScanError::EmptyCloud`] when the cloud holds no points.
    pub fn ensure_non_empty(&self) -> Result<(), ScanError> {
        if self.points.is_empty() {
            Err(ScanError::EmptyCloud)
        } else {
            Ok(())
        }
    }
}

impl From<Vec<Point3D>> for PointCloud {
    fn from(points: Vec<Point3D>) -> Self {
        Self { points }
    }
}

impl FromIterator<Point3D> for PointCloud {
    fn from_iter<I: IntoIterator<Item = Point3D>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PointCloud {
    type Item = &'a Point3D;
    type IntoIter = std::slice::Iter<'a, Point3D>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Ground plane `z = a·x + b·y + c`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Plane {
    /// Height of the plane above `(x, y)`.
    pub fn height_at(&self, x: f64, y: f64) -> f64 {
        self.a * x + self.b * y + self.c
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Hardware-facing records
// ────────────────────────────────────────────────────────────────────────────

/// The two rotation axes of the scanning head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Horizontal rotation.
    Pan,
    /// Vertical rotation.
    Tilt,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Pan => write!(f, "pan"),
            Axis::Tilt => write!(f, "tilt"),
        }
    }
}

/// One decoded rangefinder frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    /// Measured distance in centimeters.
    pub distance_cm: u16,
    /// Return signal strength (sensor-specific units).
    pub strength: u16,
    /// Sensor die temperature in °C.
    pub temperature_c: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Configuration records
// ────────────────────────────────────────────────────────────────────────────

/// Angular extent and resolution of one sweep, plus the sensor mounting
/// height used by the spherical projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub pan_min: f64,
    pub pan_max: f64,
    pub pan_step: f64,
    pub tilt_min: f64,
    pub tilt_max: f64,
    pub tilt_step: f64,
    /// Height of the sensor's optical centre above the scanned surface.
    pub sensor_height_cm: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            pan_min: -35.0,
            pan_max: 35.0,
            pan_step: 1.0,
            tilt_min: -15.0,
            tilt_max: 15.0,
            tilt_step: 1.0,
            sensor_height_cm: 70.0,
        }
    }
}

impl SweepConfig {
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidConfig`] for non-finite bounds, a
    /// non-positive step, or an inverted range.
    pub fn validate(&self) -> Result<(), ScanError> {
        check_range("pan", self.pan_min, self.pan_max, self.pan_step)?;
        check_range("tilt", self.tilt_min, self.tilt_max, self.tilt_step)?;
        if !self.sensor_height_cm.is_finite() {
            return Err(ScanError::InvalidConfig(
                "sensor_height_cm must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_range(axis: &str, min: f64, max: f64, step: f64) -> Result<(), ScanError> {
    if !(min.is_finite() && max.is_finite() && step.is_finite()) {
        return Err(ScanError::InvalidConfig(format!(
            "{axis} range must be finite"
        )));
    }
    if step <= 0.0 {
        return Err(ScanError::InvalidConfig(format!(
            "{axis}_step must be positive, got {step}"
        )));
    }
    if max < min {
        return Err(ScanError::InvalidConfig(format!(
            "{axis}_max ({max}) is below {axis}_min ({min})"
        )));
    }
    Ok(())
}

/// Retry, smoothing and gating policy for the range sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Attempts per raw reading before giving up with a timeout.
    pub max_attempts: u32,
    /// Consecutive raw readings per sample; values above 1 return the median.
    pub window: usize,
    /// Maximum accepted jump from the previous accepted distance.
    /// `None` disables gating.
    pub max_delta_cm: Option<f64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: 1,
            max_delta_cm: None,
        }
    }
}

/// Parameters for the ground-flatten → grid → mesh stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub cell_size_cm: f64,
    /// Cells higher than this above ground are treated as built structure.
    pub building_threshold_cm: f64,
    /// Name written into the `solid` / `endsolid` lines of the mesh file.
    pub solid_name: String,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            cell_size_cm: 2.0,
            building_threshold_cm: 5.0,
            solid_name: "scan".to_string(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Session state
// ────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepState {
    Idle,
    Running,
    Completed,
    Aborted,
    Failed,
}

impl SweepState {
    pub fn as_u8(self) -> u8 {
        match self {
            SweepState::Idle => 0,
            SweepState::Running => 1,
            SweepState::Completed => 2,
            SweepState::Aborted => 3,
            SweepState::Failed => 4,
        }
    }

    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SweepState::Running,
            2 => SweepState::Completed,
            3 => SweepState::Aborted,
            4 => SweepState::Failed,
            _ => SweepState::Idle,
        }
    }
}

/// Point-in-time view of sweep progress, safe to hand to any observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Poses visited so far (including skipped ones).
    pub completed: usize,
    pub total: usize,
    /// Poses that produced no point (timeout or rejected reading).
    pub skipped: usize,
    pub running: bool,
    pub state: SweepState,
}

impl ProgressSnapshot {
    /// Whole-number percentage of poses visited.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let pct = self.completed.min(self.total) * 100 / self.total;
        pct as u8
    }
}

/// Result of asking the service to start a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "session", rename_all = "lowercase")]
pub enum StartOutcome {
    Accepted(Uuid),
    /// Another sweep is active; the request was rejected, not queued.
    Busy,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error taxonomy shared by the hardware, geometry and runtime layers.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScanError {
    #[error("Sensor sync lost: {0}")]
    SyncLost(String),

    #[error("Hardware timeout: no valid frame after {attempts} attempt(s)")]
    HardwareTimeout { attempts: u32 },

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Point cloud is empty")]
    EmptyCloud,

    #[error("Degenerate plane fit: {0}")]
    DegeneratePlane(String),

    #[error("Failed to write {path}: {details}")]
    ExportWrite { path: String, details: String },

    #[error("Sweep aborted")]
    Aborted,

    #[error("No scan result available")]
    NoResult,
}
