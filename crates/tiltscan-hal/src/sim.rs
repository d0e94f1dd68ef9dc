//! In-process simulation drivers for running the scan pipeline without
//! hardware.
//!
//! - [`SimActuator`] records every command; linked actuators also publish
//!   their angle into a shared [`SimPose`].
//! - [`SimRangefinder`] ray-marches a [`SimScene`] from the current pose, so a
//!   sweep over the simulated rig produces a geometrically consistent cloud.
//! - [`ScriptedSource`] replays a fixed queue of frames and failures, for
//!   exercising retry and gating logic.
//!
//! # Example
//!
//! ```rust
//! use tiltscan_hal::sim::{SimRig, SimScene, SimBox};
//! use tiltscan_hal::{ActuatorSource, DistanceSource};
//! use tiltscan_types::Axis;
//!
//! let scene = SimScene::flat(70.0).with_box(SimBox::new(-5.0, 5.0, -5.0, 5.0, 10.0));
//! let (mut rig, mut lidar) = SimRig::new(scene).build();
//!
//! rig.move_to(Axis::Tilt, 0.0).unwrap();
//! rig.move_to(Axis::Pan, 0.0).unwrap();
//! // Straight down onto a 10 cm box from 70 cm.
//! assert_eq!(lidar.read_raw().unwrap().distance_cm, 60);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tiltscan_types::{Axis, RawFrame, ScanError};

use crate::actuator::Actuator;
use crate::distance::DistanceSource;
use crate::rig::PanTiltRig;

// ────────────────────────────────────────────────────────────────────────────
// Shared pose
// ────────────────────────────────────────────────────────────────────────────

/// Current angles of the simulated head, shared between the actuators and
/// the rangefinder.
#[derive(Debug, Default)]
pub struct SimPose {
    pan_bits: AtomicU64,
    tilt_bits: AtomicU64,
}

impl SimPose {
    pub fn get(&self, axis: Axis) -> f64 {
        let bits = match axis {
            Axis::Pan => self.pan_bits.load(Ordering::Acquire),
            Axis::Tilt => self.tilt_bits.load(Ordering::Acquire),
        };
        f64::from_bits(bits)
    }

    fn set(&self, axis: Axis, angle_deg: f64) {
        let bits = angle_deg.to_bits();
        match axis {
            Axis::Pan => self.pan_bits.store(bits, Ordering::Release),
            Axis::Tilt => self.tilt_bits.store(bits, Ordering::Release),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub actuator
// ────────────────────────────────────────────────────────────────────────────

/// A simulated axis that records every command.  Always succeeds.
pub struct SimActuator {
    id: String,
    angle: Option<f64>,
    history: Vec<f64>,
    link: Option<(Axis, Arc<SimPose>)>,
}

impl SimActuator {
    /// A free-standing simulated actuator.
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            angle: None,
            history: Vec::new(),
            link: None,
        })
    }

    /// A simulated actuator that publishes its angle into `pose`.
    pub fn linked(axis: Axis, pose: Arc<SimPose>) -> Box<Self> {
        Box::new(Self {
            id: axis.to_string(),
            angle: None,
            history: Vec::new(),
            link: Some((axis, pose)),
        })
    }

    /// Every angle commanded so far, in order.
    pub fn history(&self) -> &[f64] {
        &self.history
    }
}

impl Actuator for SimActuator {
    fn id(&self) -> &str {
        &self.id
    }

    fn move_to(&mut self, angle_deg: f64) -> Result<(), ScanError> {
        self.history.push(angle_deg);
        self.angle = Some(angle_deg);
        if let Some((axis, pose)) = &self.link {
            pose.set(*axis, angle_deg);
        }
        Ok(())
    }

    fn angle(&self) -> Option<f64> {
        self.angle
    }

    fn release(&mut self) -> Result<(), ScanError> {
        self.angle = None;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scene + ray-marching rangefinder
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned block standing on the ground.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub height: f64,
}

impl SimBox {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64, height: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
            height,
        }
    }

    fn covers(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

/// Flat ground at z = 0 with optional blocks, seen from a sensor mounted
/// `sensor_height_cm` above the ground.
#[derive(Debug, Clone, PartialEq)]
pub struct SimScene {
    pub sensor_height_cm: f64,
    pub boxes: Vec<SimBox>,
    /// Readings beyond this range saturate to it.
    pub max_range_cm: f64,
    /// Ray-march increment.
    pub step_cm: f64,
}

impl SimScene {
    pub fn flat(sensor_height_cm: f64) -> Self {
        Self {
            sensor_height_cm,
            boxes: Vec::new(),
            max_range_cm: 1200.0,
            step_cm: 0.1,
        }
    }

    pub fn with_box(mut self, block: SimBox) -> Self {
        self.boxes.push(block);
        self
    }

    /// Terrain height at `(x, y)`.
    pub fn surface_height(&self, x: f64, y: f64) -> f64 {
        self.boxes
            .iter()
            .filter(|b| b.covers(x, y))
            .map(|b| b.height)
            .fold(0.0, f64::max)
    }

    /// Distance along the ray for the given pose until it meets the terrain.
    pub fn cast(&self, pan_deg: f64, tilt_deg: f64) -> f64 {
        let (a, b) = (pan_deg.to_radians(), tilt_deg.to_radians());
        let dir = (b.cos() * a.sin(), b.sin(), -a.cos() * b.cos());
        let step = self.step_cm.max(1e-3);
        let mut t = 0.0;
        while t < self.max_range_cm {
            let (x, y, z) = (t * dir.0, t * dir.1, self.sensor_height_cm + t * dir.2);
            if z <= self.surface_height(x, y) {
                return t;
            }
            t += step;
        }
        self.max_range_cm
    }
}

/// Simulated rangefinder that reads the terrain under the shared pose.
pub struct SimRangefinder {
    scene: SimScene,
    pose: Arc<SimPose>,
}

impl SimRangefinder {
    pub fn new(scene: SimScene, pose: Arc<SimPose>) -> Self {
        Self { scene, pose }
    }
}

impl DistanceSource for SimRangefinder {
    fn read_raw(&mut self) -> Result<RawFrame, ScanError> {
        let d = self
            .scene
            .cast(self.pose.get(Axis::Pan), self.pose.get(Axis::Tilt));
        Ok(RawFrame {
            distance_cm: d.round().clamp(0.0, f64::from(u16::MAX)) as u16,
            strength: 1000,
            temperature_c: 25.0,
        })
    }
}

/// Builds a linked [`PanTiltRig`] + [`SimRangefinder`] pair over one scene.
pub struct SimRig {
    scene: SimScene,
}

impl SimRig {
    pub fn new(scene: SimScene) -> Self {
        Self { scene }
    }

    pub fn build(self) -> (PanTiltRig, SimRangefinder) {
        let pose = Arc::new(SimPose::default());
        let rig = PanTiltRig::new(
            SimActuator::linked(Axis::Pan, pose.clone()),
            SimActuator::linked(Axis::Tilt, pose.clone()),
        );
        (rig, SimRangefinder::new(self.scene, pose))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scripted source
// ────────────────────────────────────────────────────────────────────────────

/// Replays a queue of results; reports `SyncLost` once the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<RawFrame, ScanError>>,
    reads: usize,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Result<RawFrame, ScanError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            reads: 0,
        }
    }

    /// A script of successful readings.
    pub fn distances(distances: impl IntoIterator<Item = u16>) -> Self {
        Self::new(distances.into_iter().map(|d| Ok(frame(d))))
    }

    /// Number of `read_raw` calls made so far.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

/// A plausible frame carrying `distance_cm`.
pub fn frame(distance_cm: u16) -> RawFrame {
    RawFrame {
        distance_cm,
        strength: 1000,
        temperature_c: 25.0,
    }
}

impl DistanceSource for ScriptedSource {
    fn read_raw(&mut self) -> Result<RawFrame, ScanError> {
        self.reads += 1;
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(ScanError::SyncLost("script exhausted".to_string())))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
