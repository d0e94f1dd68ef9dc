//! [`RangeSampler`] – bounded, smoothed, gated distance readings.
//!
//! Layers three policies over a [`DistanceSource`]:
//!
//! 1. **Retry** – `SyncLost` is retried up to `max_attempts` times per raw
//!    reading, then surfaces as [`ScanError::HardwareTimeout`].  Other errors
//!    propagate immediately.
//! 2. **Median window** – with `window > 1`, that many raw readings are taken
//!    and their median returned, which suppresses single-sample spikes.
//! 3. **Outlier gate** – with `max_delta_cm` set, a reading further than that
//!    from the last *accepted* one is reported as
//!    [`SampleOutcome::Rejected`] and does not move the gate.

use tiltscan_hal::DistanceSource;
use tiltscan_types::{SamplerConfig, ScanError};
use tracing::trace;

/// Result of one successful sampling call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    Accepted(f64),
    /// Skipped by the outlier gate; not substituted.
    Rejected { distance_cm: f64, previous_cm: f64 },
}

pub struct RangeSampler {
    config: SamplerConfig,
    last_accepted: Option<f64>,
}

impl RangeSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            last_accepted: None,
        }
    }

    /// Forget the last accepted distance.  Called at the start of each sweep.
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }

    /// One raw distance, retrying lost sync.
    ///
    /// # Errors
    ///
    /// [`ScanError::HardwareTimeout`] once the attempt budget is spent; any
    /// non-`SyncLost` error from the source as is.
    pub fn read_one(&self, source: &mut dyn DistanceSource) -> Result<f64, ScanError> {
        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            match source.read_raw() {
                Ok(frame) => return Ok(f64::from(frame.distance_cm)),
                Err(ScanError::SyncLost(reason)) => {
                    trace!(attempt, %reason, "sync lost, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ScanError::HardwareTimeout { attempts })
    }

    /// Smoothed and gated distance for the current pose.
    ///
    /// # Errors
    ///
    /// See [`read_one`](Self::read_one).
    pub fn sample(&mut self, source: &mut dyn DistanceSource) -> Result<SampleOutcome, ScanError> {
        let window = self.config.window.max(1);
        let distance = if window == 1 {
            self.read_one(source)?
        } else {
            let mut readings = (0..window)
                .map(|_| self.read_one(source))
                .collect::<Result<Vec<_>, _>>()?;
            median(&mut readings)
        };

        if let (Some(max_delta), Some(previous)) = (self.config.max_delta_cm, self.last_accepted) {
            if (distance - previous).abs() > max_delta {
                return Ok(SampleOutcome::Rejected {
                    distance_cm: distance,
                    previous_cm: previous,
                });
            }
        }
        self.last_accepted = Some(distance);
        Ok(SampleOutcome::Accepted(distance))
    }
}

// Mean of the two middle values for an even count.
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}
