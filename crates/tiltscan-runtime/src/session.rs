//! [`ScanSession`] and [`ScanService`] – one sweep at a time, observable from
//! anywhere.
//!
//! A `ScanSession` is the immutable record of one finished sweep: the raw
//! samples and cloud, the skip count, and either the reconstruction or the
//! error that stopped it.  The raw cloud is kept even when reconstruction
//! fails.
//!
//! `ScanService` owns the hardware and runs each sweep on a dedicated worker
//! thread.  Starting a sweep while one is active returns
//! [`StartOutcome::Busy`]; requests are never queued.  Progress is read from
//! atomics, so observers never contend with the sweep loop.
//!
//! # Example
//!
//! ```rust
//! use tiltscan_hal::sim::{SimRig, SimScene};
//! use tiltscan_runtime::session::{ScanHardware, ScanService};
//! use tiltscan_types::{StartOutcome, SweepConfig, SweepState};
//!
//! let (rig, lidar) = SimRig::new(SimScene::flat(70.0)).build();
//! let service = ScanService::new(ScanHardware::new(rig, lidar), Default::default());
//!
//! let sweep = SweepConfig { pan_min: -3.0, pan_max: 3.0, tilt_min: -3.0, tilt_max: 3.0, ..Default::default() };
//! assert!(matches!(service.start_sweep(sweep).unwrap(), StartOutcome::Accepted(_)));
//!
//! let session = service.wait().unwrap();
//! assert_eq!(session.state, SweepState::Completed);
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use tiltscan_hal::{ActuatorSource, DistanceSource};
use tiltscan_perception::{HeightGrid, Mesh, cloud_io};
use tiltscan_types::{
    PointCloud, ProgressSnapshot, ReconstructionConfig, SamplerConfig, ScanError, ScanSample,
    StartOutcome, SweepConfig, SweepState,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::export;
use crate::pipeline::{self, Reconstruction};
use crate::progress::ProgressTracker;
use crate::scheduler::SweepScheduler;

// ────────────────────────────────────────────────────────────────────────────
// ScanSession
// ────────────────────────────────────────────────────────────────────────────

/// The result of one sweep.
#[derive(Debug, Clone)]
pub struct ScanSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state: SweepState,
    pub sweep: SweepConfig,
    pub samples: Vec<ScanSample>,
    pub raw_cloud: PointCloud,
    pub skipped: usize,
    /// Present when reconstruction succeeded.
    pub reconstruction: Option<Reconstruction>,
    /// Why the sweep or its reconstruction stopped.
    pub error: Option<ScanError>,
    pub solid_name: String,
}

impl ScanSession {
    /// # Errors
    ///
    /// The reconstruction error, or [`ScanError::NoResult`].
    pub fn reconstruction(&self) -> Result<&Reconstruction, ScanError> {
        match (&self.reconstruction, &self.error) {
            (Some(rec), _) => Ok(rec),
            (None, Some(e)) => Err(e.clone()),
            (None, None) => Err(ScanError::NoResult),
        }
    }

    pub fn mesh(&self) -> Result<&Mesh, ScanError> {
        self.reconstruction().map(|r| &r.mesh)
    }

    pub fn height_grid(&self) -> Result<&HeightGrid, ScanError> {
        self.reconstruction().map(|r| &r.grid)
    }

    /// The mesh rendered as ASCII STL.
    pub fn stl_text(&self) -> Result<String, ScanError> {
        Ok(self.mesh()?.to_stl_string(&self.solid_name))
    }

    /// The raw cloud rendered as an `x,y,z` table.  Available even when
    /// reconstruction failed.
    pub fn csv_text(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = cloud_io::write_csv(&self.raw_cloud, &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// The height grid as a JSON raster.
    pub fn heightmap_json(&self) -> Result<String, ScanError> {
        serde_json::to_string(self.height_grid()?).map_err(|e| ScanError::ExportWrite {
            path: "heightmap".to_string(),
            details: e.to_string(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ScanService
// ────────────────────────────────────────────────────────────────────────────

/// The two capabilities a sweep needs.
pub struct ScanHardware {
    pub rig: Box<dyn ActuatorSource>,
    pub rangefinder: Box<dyn DistanceSource>,
}

impl ScanHardware {
    pub fn new(
        rig: impl ActuatorSource + 'static,
        rangefinder: impl DistanceSource + 'static,
    ) -> Self {
        Self {
            rig: Box::new(rig),
            rangefinder: Box::new(rangefinder),
        }
    }
}

/// Per-service policy applied to every sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceConfig {
    pub sampler: SamplerConfig,
    pub reconstruction: ReconstructionConfig,
}

struct Inner {
    active: AtomicBool,
    cancel: AtomicBool,
    progress: ProgressTracker,
    hardware: Mutex<ScanHardware>,
    latest: RwLock<Option<Arc<ScanSession>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: ServiceConfig,
}

/// Cloneable handle to the single-sweep scan service.
#[derive(Clone)]
pub struct ScanService {
    inner: Arc<Inner>,
}

impl ScanService {
    pub fn new(hardware: ScanHardware, config: ServiceConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                active: AtomicBool::new(false),
                cancel: AtomicBool::new(false),
                progress: ProgressTracker::new(),
                hardware: Mutex::new(hardware),
                latest: RwLock::new(None),
                worker: Mutex::new(None),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Start a sweep on a worker thread.
    ///
    /// Returns [`StartOutcome::Busy`] without side effects if a sweep is
    /// already active.
    ///
    /// # Errors
    ///
    /// - [`ScanError::InvalidConfig`] when `sweep` does not validate.
    /// - [`ScanError::HardwareFault`] when the worker thread cannot start.
    pub fn start_sweep(&self, sweep: SweepConfig) -> Result<StartOutcome, ScanError> {
        let scheduler = SweepScheduler::new(&sweep, self.inner.config.sampler.clone())?;

        // Held until the handle is stored so a concurrent `wait` cannot miss it.
        let mut worker = self.inner.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .inner
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("sweep request rejected: another sweep is running");
            return Ok(StartOutcome::Busy);
        }

        let id = Uuid::new_v4();
        self.inner.cancel.store(false, Ordering::Release);
        self.inner.progress.begin(scheduler.plan().len());

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("tiltscan-sweep".to_string())
            .spawn(move || run_session(&inner, id, sweep, scheduler));

        match spawned {
            Ok(handle) => {
                // A finished worker from an earlier sweep is dropped here;
                // it has already published its session.
                *worker = Some(handle);
                info!(session = %id, "sweep accepted");
                Ok(StartOutcome::Accepted(id))
            }
            Err(e) => {
                self.inner.progress.finish(SweepState::Failed);
                self.inner.active.store(false, Ordering::Release);
                Err(ScanError::HardwareFault {
                    component: "sweep-worker".to_string(),
                    details: e.to_string(),
                })
            }
        }
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.inner.progress.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Ask the active sweep to stop.  Returns `false` when nothing is running.
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.inner.cancel.store(true, Ordering::Release);
        info!("sweep cancellation requested");
        true
    }

    /// The most recent finished session.
    pub fn latest(&self) -> Option<Arc<ScanSession>> {
        self.inner
            .latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Block until the current worker (if any) exits, then return the latest
    /// session.
    pub fn wait(&self) -> Option<Arc<ScanSession>> {
        let handle = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("sweep worker panicked");
            }
        }
        self.latest()
    }

    fn require_latest(&self) -> Result<Arc<ScanSession>, ScanError> {
        self.latest().ok_or(ScanError::NoResult)
    }

    /// # Errors
    ///
    /// [`ScanError::NoResult`] before the first sweep, the reconstruction
    /// error if there is no mesh, or [`ScanError::ExportWrite`].
    pub fn export_mesh(&self, path: &Path) -> Result<(), ScanError> {
        let session = self.require_latest()?;
        export::export_mesh(session.mesh()?, &session.solid_name, path)
    }

    /// # Errors
    ///
    /// [`ScanError::NoResult`] before the first sweep, or
    /// [`ScanError::ExportWrite`].
    pub fn export_point_cloud(&self, path: &Path) -> Result<(), ScanError> {
        let session = self.require_latest()?;
        export::export_point_cloud(&session.raw_cloud, path)
    }

    /// # Errors
    ///
    /// As [`export_mesh`](Self::export_mesh).
    pub fn export_height_grid(&self, path: &Path) -> Result<(), ScanError> {
        let session = self.require_latest()?;
        export::export_height_grid(session.height_grid()?, path)
    }
}

fn run_session(inner: &Inner, id: Uuid, sweep: SweepConfig, scheduler: SweepScheduler) {
    let started_at = Utc::now();
    let span = tracing::info_span!("session", %id);
    let _enter = span.enter();

    let session = panic::catch_unwind(AssertUnwindSafe(|| {
        sweep_and_reconstruct(inner, id, started_at, sweep.clone(), scheduler)
    }))
    .unwrap_or_else(|payload| {
        let details = panic_message(payload.as_ref());
        error!(%details, "sweep worker panicked; parking the rig");
        let mut hw = inner.hardware.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = hw.rig.park() {
            warn!(error = %e, "failed to park after worker panic");
        }
        ScanSession {
            id,
            started_at,
            finished_at: Utc::now(),
            state: SweepState::Failed,
            sweep,
            samples: Vec::new(),
            raw_cloud: PointCloud::new(),
            skipped: inner.progress.snapshot().skipped,
            reconstruction: None,
            error: Some(ScanError::HardwareFault {
                component: "sweep-worker".to_string(),
                details,
            }),
            solid_name: inner.config.reconstruction.solid_name.clone(),
        }
    });

    info!(
        state = ?session.state,
        points = session.raw_cloud.len(),
        skipped = session.skipped,
        elapsed_ms = (session.finished_at - session.started_at).num_milliseconds(),
        "session finished"
    );

    let state = session.state;
    *inner.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(session));
    inner.progress.finish(state);
    inner.active.store(false, Ordering::Release);
}

fn sweep_and_reconstruct(
    inner: &Inner,
    id: Uuid,
    started_at: DateTime<Utc>,
    sweep: SweepConfig,
    mut scheduler: SweepScheduler,
) -> ScanSession {
    let outcome = {
        let mut hw = inner.hardware.lock().unwrap_or_else(PoisonError::into_inner);
        let ScanHardware { rig, rangefinder } = &mut *hw;
        scheduler.run(
            rig.as_mut(),
            rangefinder.as_mut(),
            &inner.progress,
            &inner.cancel,
        )
    };

    let solid_name = inner.config.reconstruction.solid_name.clone();
    match outcome {
        Ok(out) => {
            let (reconstruction, error) =
                match pipeline::reconstruct(&out.cloud, &inner.config.reconstruction) {
                    Ok(rec) => (Some(rec), None),
                    Err(e) => {
                        warn!(error = %e, "reconstruction failed; raw cloud kept");
                        (None, Some(e))
                    }
                };
            ScanSession {
                id,
                started_at,
                finished_at: Utc::now(),
                state: SweepState::Completed,
                sweep,
                samples: out.samples,
                raw_cloud: out.cloud,
                skipped: out.skipped,
                reconstruction,
                error,
                solid_name,
            }
        }
        Err(e) => {
            let state = if e == ScanError::Aborted {
                SweepState::Aborted
            } else {
                SweepState::Failed
            };
            ScanSession {
                id,
                started_at,
                finished_at: Utc::now(),
                state,
                sweep,
                samples: Vec::new(),
                raw_cloud: PointCloud::new(),
                skipped: inner.progress.snapshot().skipped,
                reconstruction: None,
                error: Some(e),
                solid_name,
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use tiltscan_hal::sim::{ScriptedSource, SimBox, SimRig, SimScene};
    use tiltscan_types::{Axis, RawFrame};

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    struct NullRig;

    impl ActuatorSource for NullRig {
        fn move_to(&mut self, _axis: Axis, _angle_deg: f64) -> Result<(), ScanError> {
            Ok(())
        }
        fn park(&mut self) -> Result<(), ScanError> {
            Ok(())
        }
    }

    /// Blocks every read until the test releases it.
    struct GatedSource {
        gate: mpsc::Receiver<()>,
    }

    impl DistanceSource for GatedSource {
        fn read_raw(&mut self) -> Result<RawFrame, ScanError> {
            match self.gate.recv_timeout(Duration::from_secs(5)) {
                Ok(()) => Ok(tiltscan_hal::sim::frame(70)),
                Err(_) => Err(ScanError::HardwareFault {
                    component: "gate".to_string(),
                    details: "closed".to_string(),
                }),
            }
        }
    }

    /// Counts `park` calls so tests can see the rig was released.
    struct CountingRig {
        parks: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl ActuatorSource for CountingRig {
        fn move_to(&mut self, _axis: Axis, _angle_deg: f64) -> Result<(), ScanError> {
            Ok(())
        }
        fn park(&mut self) -> Result<(), ScanError> {
            self.parks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A driver bug: the first read panics.
    struct PanickingSource;

    impl DistanceSource for PanickingSource {
        fn read_raw(&mut self) -> Result<RawFrame, ScanError> {
            panic!("rangefinder driver bug");
        }
    }

    fn tiny_sweep() -> SweepConfig {
        SweepConfig {
            pan_min: -4.0,
            pan_max: 4.0,
            pan_step: 2.0,
            tilt_min: -4.0,
            tilt_max: 4.0,
            tilt_step: 2.0,
            sensor_height_cm: 70.0,
        }
    }

    fn sim_service(scene: SimScene) -> ScanService {
        let (rig, lidar) = SimRig::new(scene).build();
        ScanService::new(ScanHardware::new(rig, lidar), ServiceConfig::default())
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn completed_sweep_produces_session_and_mesh() {
        let service = sim_service(SimScene::flat(70.0));
        let outcome = service.start_sweep(tiny_sweep()).unwrap();
        let StartOutcome::Accepted(id) = outcome else {
            panic!("expected acceptance, got {outcome:?}");
        };

        let session = service.wait().unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.state, SweepState::Completed);
        assert_eq!(session.raw_cloud.len(), 25);
        assert!(session.reconstruction().is_ok());
        assert!(session.stl_text().unwrap().starts_with("solid scan\n"));
        assert!(session.csv_text().starts_with("x,y,z\n"));

        let snap = service.progress();
        assert_eq!((snap.completed, snap.total), (25, 25));
        assert_eq!(snap.state, SweepState::Completed);
        assert!(!service.is_running());
    }

    #[test]
    fn second_start_while_running_is_busy() {
        let (tx, rx) = mpsc::channel();
        let service = ScanService::new(
            ScanHardware::new(NullRig, GatedSource { gate: rx }),
            ServiceConfig::default(),
        );

        assert!(matches!(
            service.start_sweep(tiny_sweep()).unwrap(),
            StartOutcome::Accepted(_)
        ));
        assert!(service.is_running());
        assert_eq!(service.start_sweep(tiny_sweep()).unwrap(), StartOutcome::Busy);

        for _ in 0..25 {
            tx.send(()).unwrap();
        }
        let session = service.wait().unwrap();
        assert_eq!(session.state, SweepState::Completed);

        // Free again once the first sweep is done.
        drop(tx);
        assert!(matches!(
            service.start_sweep(tiny_sweep()).unwrap(),
            StartOutcome::Accepted(_)
        ));
        let failed = service.wait().unwrap();
        assert_eq!(failed.state, SweepState::Failed);
    }

    #[test]
    fn cancel_marks_session_aborted() {
        let (tx, rx) = mpsc::channel();
        let service = ScanService::new(
            ScanHardware::new(NullRig, GatedSource { gate: rx }),
            ServiceConfig::default(),
        );
        service.start_sweep(tiny_sweep()).unwrap();
        tx.send(()).unwrap();
        assert!(service.cancel());
        // Release the read that may be in flight.
        tx.send(()).unwrap();

        let session = service.wait().unwrap();
        assert_eq!(session.state, SweepState::Aborted);
        assert_eq!(session.error, Some(ScanError::Aborted));
        assert_eq!(service.progress().state, SweepState::Aborted);
        assert!(!service.cancel());
    }

    #[test]
    fn degenerate_reconstruction_keeps_raw_cloud() {
        // Only the pan == tilt == 0 column: a single-row sweep is collinear.
        let sweep = SweepConfig {
            tilt_min: 0.0,
            tilt_max: 0.0,
            ..tiny_sweep()
        };
        let service = sim_service(SimScene::flat(70.0));
        service.start_sweep(sweep).unwrap();
        let session = service.wait().unwrap();

        assert_eq!(session.state, SweepState::Completed);
        assert_eq!(session.raw_cloud.len(), 5);
        assert!(matches!(session.mesh(), Err(ScanError::DegeneratePlane(_))));
        assert!(matches!(
            service.export_mesh(Path::new("unused.stl")),
            Err(ScanError::DegeneratePlane(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("raw.csv");
        service.export_point_cloud(&csv).unwrap();
        assert_eq!(std::fs::read_to_string(&csv).unwrap().lines().count(), 6);
    }

    #[test]
    fn all_poses_timing_out_yields_empty_cloud_error() {
        let service = ScanService::new(
            ScanHardware::new(NullRig, ScriptedSource::default()),
            ServiceConfig::default(),
        );
        service.start_sweep(tiny_sweep()).unwrap();
        let session = service.wait().unwrap();
        assert_eq!(session.state, SweepState::Completed);
        assert_eq!(session.skipped, 25);
        assert_eq!(session.error, Some(ScanError::EmptyCloud));
    }

    #[test]
    fn exports_before_first_sweep_report_no_result() {
        let service = sim_service(SimScene::flat(70.0));
        let path = Path::new("never-written.stl");
        assert_eq!(service.export_mesh(path), Err(ScanError::NoResult));
        assert_eq!(service.export_point_cloud(path), Err(ScanError::NoResult));
        assert!(service.latest().is_none());
    }

    #[test]
    fn invalid_sweep_is_an_error_not_busy() {
        let service = sim_service(SimScene::flat(70.0));
        let mut sweep = tiny_sweep();
        sweep.tilt_step = 0.0;
        assert!(matches!(
            service.start_sweep(sweep),
            Err(ScanError::InvalidConfig(_))
        ));
        assert!(!service.is_running());
    }

    #[test]
    fn worker_panic_records_failed_session_and_frees_service() {
        let parks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let service = ScanService::new(
            ScanHardware::new(CountingRig { parks: Arc::clone(&parks) }, PanickingSource),
            ServiceConfig::default(),
        );

        let StartOutcome::Accepted(id) = service.start_sweep(tiny_sweep()).unwrap() else {
            panic!("expected acceptance");
        };
        let session = service.wait().expect("panicked sweep still records a session");
        assert_eq!(session.id, id);
        assert_eq!(session.state, SweepState::Failed);
        match &session.error {
            Some(ScanError::HardwareFault { component, details }) => {
                assert_eq!(component, "sweep-worker");
                assert!(details.contains("rangefinder driver bug"), "{details}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(parks.load(Ordering::SeqCst) >= 1);
        assert!(!service.is_running());
        assert_eq!(service.progress().state, SweepState::Failed);

        // Not stuck busy.
        assert!(matches!(
            service.start_sweep(tiny_sweep()).unwrap(),
            StartOutcome::Accepted(_)
        ));
        assert_eq!(service.wait().unwrap().state, SweepState::Failed);
    }

    #[test]
    fn oversized_height_grid_is_a_reconstruction_error() {
        let (rig, lidar) = SimRig::new(SimScene::flat(70.0)).build();
        let service = ScanService::new(
            ScanHardware::new(rig, lidar),
            ServiceConfig {
                reconstruction: ReconstructionConfig {
                    cell_size_cm: 1e-8,
                    ..ReconstructionConfig::default()
                },
                ..ServiceConfig::default()
            },
        );

        service.start_sweep(tiny_sweep()).unwrap();
        let session = service.wait().unwrap();
        assert_eq!(session.state, SweepState::Completed);
        assert_eq!(session.raw_cloud.len(), 25);
        assert!(matches!(session.error, Some(ScanError::InvalidConfig(_))));
        assert!(!service.is_running());
        assert!(matches!(
            service.start_sweep(tiny_sweep()).unwrap(),
            StartOutcome::Accepted(_)
        ));
        service.wait();
    }

    #[test]
    fn wait_returns_the_session_it_was_started_for() {
        let service = sim_service(SimScene::flat(70.0));
        for _ in 0..3 {
            let StartOutcome::Accepted(id) = service.start_sweep(tiny_sweep()).unwrap() else {
                panic!("expected acceptance");
            };
            assert_eq!(service.wait().unwrap().id, id);
            assert!(!service.is_running());
        }
    }

    #[test]
    fn exports_all_artifacts() {
        let scene = SimScene::flat(70.0).with_box(SimBox::new(-3.0, 3.0, -3.0, 3.0, 15.0));
        let service = sim_service(scene);
        service.start_sweep(tiny_sweep()).unwrap();
        service.wait().unwrap();

        let dir = tempfile::tempdir().unwrap();
        service.export_mesh(&dir.path().join("m.stl")).unwrap();
        service.export_point_cloud(&dir.path().join("c.csv")).unwrap();
        service.export_height_grid(&dir.path().join("g.json")).unwrap();
        for name in ["m.stl", "c.csv", "g.json"] {
            assert!(dir.path().join(name).exists(), "{name} missing");
        }
    }
}
