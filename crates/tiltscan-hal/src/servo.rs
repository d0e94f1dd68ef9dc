//! [`ServoActuator`] – a hobby servo on a Linux sysfs PWM channel.
//!
//! Angles in `[-90, 90]` degrees map linearly onto pulse widths of
//! 500–2500 µs inside a 20 ms period.  When the previous pulse width is known
//! the servo is slewed towards the target in small increments to avoid
//! jerking the sensor head, then held for a settle interval before
//! [`Actuator::move_to`] returns.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tiltscan_types::ScanError;
use tracing::{debug, info};

use crate::actuator::Actuator;

/// PWM period for standard hobby servos (50 Hz).
pub const PERIOD_NS: u64 = 20_000_000;
const MIN_PULSE_US: f64 = 500.0;
const PULSE_SPAN_US: f64 = 2000.0;

/// Pulse width in microseconds for `angle_deg`, clamped to the servo's
/// ±90° travel.
pub fn pulse_width_us(angle_deg: f64) -> u32 {
    let angle = angle_deg.clamp(-90.0, 90.0);
    (MIN_PULSE_US + (angle + 90.0) * PULSE_SPAN_US / 180.0) as u32
}

/// Motion profile of a servo move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoTiming {
    /// Pulse width increment per slew step.
    pub slew_step_us: u32,
    /// Pause between slew steps.
    pub slew_delay: Duration,
    /// Hold time after reaching the target before the move counts as settled.
    pub settle: Duration,
}

impl Default for ServoTiming {
    fn default() -> Self {
        Self {
            slew_step_us: 8,
            slew_delay: Duration::from_millis(4),
            settle: Duration::from_millis(80),
        }
    }
}

/// Servo driven through `/sys/class/pwm/pwmchipN/pwmM`.
pub struct ServoActuator {
    id: String,
    channel_dir: PathBuf,
    timing: ServoTiming,
    pulse_us: Option<u32>,
    angle: Option<f64>,
    enabled: bool,
}

impl ServoActuator {
    /// Export `channel` on `chip` (if needed) and configure its period.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::HardwareFault`] when sysfs cannot be written.
    pub fn open(
        id: impl Into<String>,
        chip: &Path,
        channel: u32,
        timing: ServoTiming,
    ) -> Result<Self, ScanError> {
        let id = id.into();
        let channel_dir = chip.join(format!("pwm{channel}"));
        if !channel_dir.exists() {
            write_attr(&id, &chip.join("export"), channel)?;
        }
        let servo = Self::with_channel_dir(id, channel_dir, timing)?;
        info!(id = %servo.id, dir = %servo.channel_dir.display(), "servo channel ready");
        Ok(servo)
    }

    /// Use an already exported channel directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::HardwareFault`] when the period cannot be set.
    pub fn with_channel_dir(
        id: impl Into<String>,
        channel_dir: impl Into<PathBuf>,
        timing: ServoTiming,
    ) -> Result<Self, ScanError> {
        let servo = Self {
            id: id.into(),
            channel_dir: channel_dir.into(),
            timing,
            pulse_us: None,
            angle: None,
            enabled: false,
        };
        servo.write("period", PERIOD_NS)?;
        Ok(servo)
    }

    fn write(&self, attr: &str, value: impl ToString) -> Result<(), ScanError> {
        write_attr(&self.id, &self.channel_dir.join(attr), value)
    }

    fn set_pulse(&mut self, pulse_us: u32) -> Result<(), ScanError> {
        self.write("duty_cycle", u64::from(pulse_us) * 1_000)?;
        self.pulse_us = Some(pulse_us);
        Ok(())
    }
}

fn write_attr(id: &str, path: &Path, value: impl ToString) -> Result<(), ScanError> {
    fs::write(path, value.to_string()).map_err(|e| ScanError::HardwareFault {
        component: id.to_string(),
        details: format!("write {}: {e}", path.display()),
    })
}

impl Actuator for ServoActuator {
    fn id(&self) -> &str {
        &self.id
    }

    fn move_to(&mut self, angle_deg: f64) -> Result<(), ScanError> {
        let target = pulse_width_us(angle_deg);
        let step = self.timing.slew_step_us.max(1);

        if let Some(mut current) = self.pulse_us {
            while current.abs_diff(target) > step {
                current = if target > current {
                    current + step
                } else {
                    current - step
                };
                self.set_pulse(current)?;
                if !self.enabled {
                    self.write("enable", 1)?;
                    self.enabled = true;
                }
                thread::sleep(self.timing.slew_delay);
            }
        }

        self.set_pulse(target)?;
        if !self.enabled {
            self.write("enable", 1)?;
            self.enabled = true;
        }
        thread::sleep(self.timing.settle);

        debug!(id = %self.id, angle_deg, pulse_us = target, "servo settled");
        self.angle = Some(angle_deg);
        Ok(())
    }

    fn angle(&self) -> Option<f64> {
        self.angle
    }

    fn release(&mut self) -> Result<(), ScanError> {
        self.write("enable", 0)?;
        self.enabled = false;
        self.pulse_us = None;
        self.angle = None;
        Ok(())
    }
}
