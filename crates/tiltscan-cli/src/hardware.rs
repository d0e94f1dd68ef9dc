//! Builds the [`ScanHardware`] pair for the configured backend.

use std::time::Duration;

use tiltscan_hal::servo::ServoTiming;
use tiltscan_hal::sim::SimBox;
use tiltscan_hal::{PanTiltRig, SerialRangefinder, ServoActuator, SimRig, SimScene};
use tiltscan_runtime::ScanHardware;
use tiltscan_types::{ScanError, SweepConfig};
use tracing::info;

use crate::config::{Backend, HardwareConfig};

/// Open the rig and rangefinder named by `hw`.
///
/// The simulated backend scans flat ground with a single raised block in
/// front of the sensor.
///
/// # Errors
///
/// [`ScanError::HardwareFault`] when a serial port or PWM channel cannot be
/// opened.
pub fn open(hw: &HardwareConfig, sweep: &SweepConfig) -> Result<ScanHardware, ScanError> {
    match hw.backend {
        Backend::Sim => {
            let (rig, rangefinder) = SimRig::new(demo_scene(sweep.sensor_height_cm)).build();
            info!(backend = %hw.backend, "simulated scan hardware ready");
            Ok(ScanHardware::new(rig, rangefinder))
        }
        Backend::Serial => {
            let timing = ServoTiming {
                slew_step_us: hw.slew_step_us.max(1),
                settle: Duration::from_millis(hw.settle_ms),
                ..ServoTiming::default()
            };
            let pan = ServoActuator::open("pan", &hw.pwm_chip, hw.pan_channel, timing)?;
            let tilt = ServoActuator::open("tilt", &hw.pwm_chip, hw.tilt_channel, timing)?;
            let rangefinder = SerialRangefinder::open(
                &hw.serial_port,
                hw.baud_rate,
                Duration::from_millis(hw.read_timeout_ms),
            )?;
            info!(
                backend = %hw.backend,
                port = %hw.serial_port,
                chip = %hw.pwm_chip.display(),
                "serial scan hardware ready"
            );
            Ok(ScanHardware::new(
                PanTiltRig::new(Box::new(pan), Box::new(tilt)),
                rangefinder,
            ))
        }
    }
}

fn demo_scene(sensor_height_cm: f64) -> SimScene {
    SimScene::flat(sensor_height_cm).with_box(SimBox::new(-12.0, 12.0, -8.0, 8.0, 20.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiltscan_runtime::{ScanService, ServiceConfig};
    use tiltscan_types::{StartOutcome, SweepState};

    #[test]
    fn sim_backend_scans_the_demo_block() {
        let sweep = SweepConfig {
            pan_min: -20.0,
            pan_max: 20.0,
            pan_step: 4.0,
            tilt_min: -10.0,
            tilt_max: 10.0,
            tilt_step: 4.0,
            sensor_height_cm: 70.0,
        };
        let hardware = open(&HardwareConfig::default(), &sweep).expect("sim hardware");
        let service = ScanService::new(hardware, ServiceConfig::default());

        assert!(matches!(
            service.start_sweep(sweep).unwrap(),
            StartOutcome::Accepted(_)
        ));
        let session = service.wait().expect("session");
        assert_eq!(session.state, SweepState::Completed);
        assert_eq!(session.raw_cloud.len(), 11 * 6);

        // The block stands out of the fitted ground.
        let grid = session.height_grid().expect("grid");
        let peak = grid.cells().iter().flatten().fold(f64::MIN, |m, h| m.max(*h));
        assert!(peak > 5.0, "peak {peak}");
    }

    #[test]
    fn serial_backend_reports_missing_pwm_chip() {
        let hw = HardwareConfig {
            backend: Backend::Serial,
            pwm_chip: "/nonexistent/pwmchip9".into(),
            ..HardwareConfig::default()
        };
        assert!(matches!(
            open(&hw, &SweepConfig::default()),
            Err(ScanError::HardwareFault { .. })
        ));
    }
}
