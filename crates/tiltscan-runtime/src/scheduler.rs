//! Sweep planning and execution.
//!
//! [`SweepPlan`] enumerates the poses of one sweep.  Tilt rows run from
//! `tilt_min` upward; within a row the pan direction alternates by **row
//! index** (even rows ascending, odd rows descending), so the last pan of one
//! row is next to the first pan of the following row regardless of where the
//! tilt range is centred.
//!
//! [`SweepScheduler`] drives the rig through the plan strictly sequentially:
//! one tilt move per row, then per pose one pan move, one sample, one
//! projected point.  Poses whose sample times out or is gated out are skipped
//! and counted.  The rig is parked when the sweep ends, however it ends.

use std::sync::atomic::{AtomicBool, Ordering};

use tiltscan_hal::{ActuatorSource, DistanceSource};
use tiltscan_perception::SphericalProjection;
use tiltscan_types::{Axis, PointCloud, SamplerConfig, ScanError, ScanSample, SweepConfig};
use tracing::{debug, info, instrument, warn};

use crate::progress::ProgressTracker;
use crate::sampler::{RangeSampler, SampleOutcome};

// Absorbs float error when the range is an exact multiple of the step.
const STEP_EPSILON: f64 = 1e-9;

/// One target pose of a sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub row: usize,
    pub tilt_deg: f64,
    pub pan_deg: f64,
}

/// Ordered pose sequence for one sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    pans: Vec<f64>,
    tilts: Vec<f64>,
}

impl SweepPlan {
    /// # Errors
    ///
    /// [`ScanError::InvalidConfig`] when `config` does not validate.
    pub fn new(config: &SweepConfig) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self {
            pans: axis_values(config.pan_min, config.pan_max, config.pan_step),
            tilts: axis_values(config.tilt_min, config.tilt_max, config.tilt_step),
        })
    }

    /// Number of poses.
    pub fn len(&self) -> usize {
        self.pans.len() * self.tilts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tilts(&self) -> &[f64] {
        &self.tilts
    }

    /// Pan angles of `row` in traversal order.
    pub fn row_pans(&self, row: usize) -> Vec<f64> {
        if row % 2 == 0 {
            self.pans.clone()
        } else {
            self.pans.iter().rev().copied().collect()
        }
    }

    /// Every pose in traversal order.
    pub fn poses(&self) -> impl Iterator<Item = Pose> + '_ {
        self.tilts.iter().enumerate().flat_map(move |(row, &tilt_deg)| {
            self.row_pans(row).into_iter().map(move |pan_deg| Pose {
                row,
                tilt_deg,
                pan_deg,
            })
        })
    }
}

// Inclusive of `max` when it lies on the step grid.
fn axis_values(min: f64, max: f64, step: f64) -> Vec<f64> {
    let n = ((max - min) / step + STEP_EPSILON).floor() as usize;
    (0..=n).map(|i| min + i as f64 * step).collect()
}

/// What a finished sweep captured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepOutput {
    /// Raw readings of every accepted pose, in capture order.
    pub samples: Vec<ScanSample>,
    /// `samples` projected to cartesian, same order.
    pub cloud: PointCloud,
    /// Poses that produced no point.
    pub skipped: usize,
}

/// Executes a [`SweepPlan`] against the hardware capabilities.
pub struct SweepScheduler {
    plan: SweepPlan,
    projection: SphericalProjection,
    sampler: RangeSampler,
}

impl SweepScheduler {
    /// # Errors
    ///
    /// [`ScanError::InvalidConfig`] for an invalid sweep range.
    pub fn new(config: &SweepConfig, sampler: SamplerConfig) -> Result<Self, ScanError> {
        Ok(Self {
            plan: SweepPlan::new(config)?,
            projection: SphericalProjection::new(config.sensor_height_cm),
            sampler: RangeSampler::new(sampler),
        })
    }

    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    /// Run one full sweep.
    ///
    /// `cancel` is checked before every pose; once set the sweep stops with
    /// [`ScanError::Aborted`].  The rig is parked on every exit path.
    ///
    /// # Errors
    ///
    /// - [`ScanError::Aborted`] when cancelled.
    /// - [`ScanError::HardwareFault`] from the rig or the rangefinder.
    #[instrument(name = "sweep", skip_all, fields(poses = self.plan.len()))]
    pub fn run(
        &mut self,
        rig: &mut dyn ActuatorSource,
        source: &mut dyn DistanceSource,
        progress: &ProgressTracker,
        cancel: &AtomicBool,
    ) -> Result<SweepOutput, ScanError> {
        self.sampler.reset();
        progress.begin(self.plan.len());
        info!(
            poses = self.plan.len(),
            rows = self.plan.tilts().len(),
            "sweep started"
        );

        let result = self.sweep(rig, source, progress, cancel);

        if let Err(e) = rig.park() {
            warn!(error = %e, "failed to park rig after sweep");
        }
        match &result {
            Ok(out) => info!(
                points = out.cloud.len(),
                skipped = out.skipped,
                "sweep finished"
            ),
            Err(e) => warn!(error = %e, "sweep stopped"),
        }
        result
    }

    fn sweep(
        &mut self,
        rig: &mut dyn ActuatorSource,
        source: &mut dyn DistanceSource,
        progress: &ProgressTracker,
        cancel: &AtomicBool,
    ) -> Result<SweepOutput, ScanError> {
        let mut out = SweepOutput {
            samples: Vec::with_capacity(self.plan.len()),
            cloud: PointCloud::with_capacity(self.plan.len()),
            skipped: 0,
        };

        for (row, &tilt_deg) in self.plan.tilts.iter().enumerate() {
            if cancel.load(Ordering::Acquire) {
                return Err(ScanError::Aborted);
            }
            rig.move_to(Axis::Tilt, tilt_deg)?;

            for pan_deg in self.plan.row_pans(row) {
                if cancel.load(Ordering::Acquire) {
                    return Err(ScanError::Aborted);
                }
                rig.move_to(Axis::Pan, pan_deg)?;

                let skipped = match self.sampler.sample(source) {
                    Ok(SampleOutcome::Accepted(distance_cm)) => {
                        let sample = ScanSample {
                            pan_deg,
                            tilt_deg,
                            distance_cm,
                        };
                        out.cloud.push(self.projection.project(&sample));
                        out.samples.push(sample);
                        debug!(pan_deg, tilt_deg, distance_cm, "pose sampled");
                        false
                    }
                    Ok(SampleOutcome::Rejected {
                        distance_cm,
                        previous_cm,
                    }) => {
                        warn!(pan_deg, tilt_deg, distance_cm, previous_cm, "reading rejected by gate");
                        true
                    }
                    Err(ScanError::HardwareTimeout { attempts }) => {
                        warn!(pan_deg, tilt_deg, attempts, "pose skipped after sensor timeout");
                        true
                    }
                    Err(e) => return Err(e),
                };
                if skipped {
                    out.skipped += 1;
                }
                progress.advance(skipped);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiltscan_hal::sim::{ScriptedSource, SimRig, SimScene, frame};
    use tiltscan_types::RawFrame;

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct RecordingRig {
        moves: Vec<(Axis, f64)>,
        parks: usize,
        fail_on_pan: Option<f64>,
    }

    impl ActuatorSource for RecordingRig {
        fn move_to(&mut self, axis: Axis, angle_deg: f64) -> Result<(), ScanError> {
            if axis == Axis::Pan && self.fail_on_pan == Some(angle_deg) {
                return Err(ScanError::HardwareFault {
                    component: "pan".to_string(),
                    details: "stalled".to_string(),
                });
            }
            self.moves.push((axis, angle_deg));
            Ok(())
        }

        fn park(&mut self) -> Result<(), ScanError> {
            self.parks += 1;
            Ok(())
        }
    }

    /// Constant readings; raises `cancel` after `cancel_after` reads.
    struct CancellingSource<'a> {
        reads: usize,
        cancel_after: usize,
        cancel: &'a AtomicBool,
    }

    impl DistanceSource for CancellingSource<'_> {
        fn read_raw(&mut self) -> Result<RawFrame, ScanError> {
            self.reads += 1;
            if self.reads >= self.cancel_after {
                self.cancel.store(true, Ordering::Release);
            }
            Ok(frame(50))
        }
    }

    fn small_config() -> SweepConfig {
        SweepConfig {
            pan_min: -2.0,
            pan_max: 2.0,
            pan_step: 1.0,
            tilt_min: 10.0,
            tilt_max: 12.0,
            tilt_step: 1.0,
            sensor_height_cm: 70.0,
        }
    }

    // ------------------------------------------------------------------
    // Plan
    // ------------------------------------------------------------------

    #[test]
    fn plan_is_inclusive_of_both_ends() {
        let plan = SweepPlan::new(&SweepConfig::default()).unwrap();
        // 71 pans × 31 tilts
        assert_eq!(plan.len(), 2201);
        assert_eq!(plan.tilts().first(), Some(&-15.0));
        assert_eq!(plan.tilts().last(), Some(&15.0));
    }

    #[test]
    fn fractional_steps_land_on_the_upper_bound() {
        assert_eq!(axis_values(0.0, 1.0, 0.1).len(), 11);
        assert_eq!(axis_values(0.0, 1.05, 0.5), vec![0.0, 0.5, 1.0]);
        assert_eq!(axis_values(3.0, 3.0, 1.0), vec![3.0]);
    }

    #[test]
    fn rows_alternate_by_index_not_angle() {
        // Tilt range starts at an even angle offset from zero; parity must
        // still follow the row index.
        let plan = SweepPlan::new(&small_config()).unwrap();
        assert_eq!(plan.row_pans(0), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(plan.row_pans(1), vec![2.0, 1.0, 0.0, -1.0, -2.0]);
        assert_eq!(plan.row_pans(2), plan.row_pans(0));

        let poses: Vec<Pose> = plan.poses().collect();
        assert_eq!(poses.len(), plan.len());
        // End of each row is adjacent in pan to the start of the next.
        for pair in poses.windows(2) {
            if pair[0].row != pair[1].row {
                assert_eq!(pair[0].pan_deg, pair[1].pan_deg);
            }
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = small_config();
        cfg.pan_step = -1.0;
        assert!(matches!(SweepPlan::new(&cfg), Err(ScanError::InvalidConfig(_))));
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    #[test]
    fn tilt_moves_once_per_row_and_rig_is_parked() {
        let mut rig = RecordingRig::default();
        let mut src = ScriptedSource::distances(std::iter::repeat_n(50, 15));
        let progress = ProgressTracker::new();
        let mut sched = SweepScheduler::new(&small_config(), SamplerConfig::default()).unwrap();

        let out = sched.run(&mut rig, &mut src, &progress, &AtomicBool::new(false)).unwrap();

        assert_eq!(out.cloud.len(), 15);
        assert_eq!(out.samples.len(), 15);
        let tilt_moves = rig.moves.iter().filter(|(a, _)| *a == Axis::Tilt).count();
        assert_eq!(tilt_moves, 3);
        assert_eq!(rig.parks, 1);
        assert_eq!(progress.snapshot().completed, 15);
        // Second row starts where the first ended.
        assert_eq!(out.samples[4].pan_deg, 2.0);
        assert_eq!(out.samples[5].pan_deg, 2.0);
        assert_eq!(out.samples[5].tilt_deg, 11.0);
    }

    #[test]
    fn timeouts_skip_the_pose_and_are_counted() {
        let lost = || Err(ScanError::SyncLost("noise".to_string()));
        // First pose: two lost frames → timeout with max_attempts 2.
        let mut script = vec![lost(), lost()];
        script.extend((0..14).map(|_| Ok(frame(60))));
        let mut src = ScriptedSource::new(script);
        let sampler = SamplerConfig {
            max_attempts: 2,
            ..SamplerConfig::default()
        };
        let progress = ProgressTracker::new();
        let mut sched = SweepScheduler::new(&small_config(), sampler).unwrap();

        let out = sched
            .run(&mut RecordingRig::default(), &mut src, &progress, &AtomicBool::new(false))
            .unwrap();

        assert_eq!(out.skipped, 1);
        assert_eq!(out.cloud.len(), 14);
        let snap = progress.snapshot();
        assert_eq!((snap.completed, snap.skipped), (15, 1));
    }

    #[test]
    fn cancellation_parks_and_aborts() {
        let cancel = AtomicBool::new(false);
        let mut src = CancellingSource {
            reads: 0,
            cancel_after: 4,
            cancel: &cancel,
        };
        let mut rig = RecordingRig::default();
        let progress = ProgressTracker::new();
        let mut sched = SweepScheduler::new(&small_config(), SamplerConfig::default()).unwrap();

        let result = sched.run(&mut rig, &mut src, &progress, &cancel);

        assert_eq!(result, Err(ScanError::Aborted));
        assert_eq!(rig.parks, 1);
        assert_eq!(progress.snapshot().completed, 4);
    }

    #[test]
    fn rig_fault_stops_the_sweep_and_parks() {
        let mut rig = RecordingRig {
            fail_on_pan: Some(0.0),
            ..RecordingRig::default()
        };
        let mut src = ScriptedSource::distances(std::iter::repeat_n(50, 15));
        let mut sched = SweepScheduler::new(&small_config(), SamplerConfig::default()).unwrap();

        let result = sched.run(&mut rig, &mut src, &ProgressTracker::new(), &AtomicBool::new(false));

        assert!(matches!(result, Err(ScanError::HardwareFault { .. })));
        assert_eq!(rig.parks, 1);
    }

    #[test]
    fn simulated_flat_floor_projects_to_ground_level() {
        let (mut rig, mut lidar) = SimRig::new(SimScene::flat(70.0)).build();
        let mut sched = SweepScheduler::new(&small_config(), SamplerConfig::default()).unwrap();

        let out = sched
            .run(&mut rig, &mut lidar, &ProgressTracker::new(), &AtomicBool::new(false))
            .unwrap();

        assert_eq!(out.cloud.len(), 15);
        // Distances are whole centimeters, so ground lands within ~1 cm of 0.
        assert!(out.cloud.iter().all(|p| p.z.abs() < 1.0), "{:?}", out.cloud);
    }
}
