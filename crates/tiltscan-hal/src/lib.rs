//! `tiltscan-hal` – hardware capabilities for the pan/tilt scanning head.
//!
//! The sweep logic never talks to a device directly.  It sees two narrow
//! capabilities:
//!
//! - [`DistanceSource`][distance::DistanceSource] – a blocking read of one
//!   rangefinder frame that fails with `SyncLost` instead of hanging.
//! - [`ActuatorSource`][rig::ActuatorSource] – move an [`Axis`] to an angle
//!   and block until settled, or park the head.
//!
//! # Modules
//!
//! - [`actuator`] – per-axis [`Actuator`][actuator::Actuator] trait.
//! - [`rig`] – [`PanTiltRig`][rig::PanTiltRig]: routes axis commands to the
//!   pan and tilt actuators.
//! - [`distance`] – the [`DistanceSource`][distance::DistanceSource] trait.
//! - [`frame`] – TFmini 9-byte frame codec and the header-hunting
//!   [`FrameReader`][frame::FrameReader].
//! - [`serial`] – [`SerialRangefinder`][serial::SerialRangefinder] over a UART.
//! - [`servo`] – [`ServoActuator`][servo::ServoActuator] driving a hobby servo
//!   through Linux sysfs PWM.
//! - [`sim`] – simulated drivers and a ray-marched terrain for running the
//!   full pipeline without hardware.
//!
//! [`Axis`]: tiltscan_types::Axis

pub mod actuator;
pub mod distance;
pub mod frame;
pub mod rig;
pub mod serial;
pub mod servo;
pub mod sim;

pub use actuator::Actuator;
pub use distance::DistanceSource;
pub use frame::{FrameError, FrameReader};
pub use rig::{ActuatorSource, PanTiltRig};
pub use serial::SerialRangefinder;
pub use servo::ServoActuator;
pub use sim::{ScriptedSource, SimRig, SimScene};
