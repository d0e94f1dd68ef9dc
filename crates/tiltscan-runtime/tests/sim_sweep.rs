//! End-to-end: simulated rig → sweep → reconstruction → exported files.

use std::fs;
use std::io::Cursor;
use std::sync::atomic::AtomicBool;

use tiltscan_hal::frame::encode;
use tiltscan_hal::sim::{SimBox, SimRig, SimScene};
use tiltscan_hal::{ActuatorSource, FrameReader, PanTiltRig};
use tiltscan_perception::cloud_io;
use tiltscan_runtime::export::{CLOUD_FILE, GRID_FILE, MESH_FILE};
use tiltscan_runtime::{
    ProgressTracker, ScanHardware, ScanService, ServiceConfig, SweepScheduler, reconstruct,
};
use tiltscan_types::{ReconstructionConfig, SamplerConfig, StartOutcome, SweepConfig, SweepState};

fn sweep() -> SweepConfig {
    SweepConfig {
        pan_min: -20.0,
        pan_max: 20.0,
        pan_step: 2.0,
        tilt_min: -20.0,
        tilt_max: 20.0,
        tilt_step: 2.0,
        sensor_height_cm: 70.0,
    }
}

#[test]
fn block_on_flat_ground_becomes_walls_and_files() {
    let scene = SimScene::flat(70.0).with_box(SimBox::new(-6.0, 6.0, -6.0, 6.0, 25.0));
    let (rig, lidar) = SimRig::new(scene).build();
    let service = ScanService::new(
        ScanHardware::new(rig, lidar),
        ServiceConfig {
            sampler: SamplerConfig::default(),
            reconstruction: ReconstructionConfig {
                cell_size_cm: 3.0,
                building_threshold_cm: 10.0,
                solid_name: "block".to_string(),
            },
        },
    );

    assert!(matches!(
        service.start_sweep(sweep()).unwrap(),
        StartOutcome::Accepted(_)
    ));
    let session = service.wait().expect("session recorded");

    assert_eq!(session.state, SweepState::Completed);
    assert_eq!(session.raw_cloud.len(), 21 * 21);
    assert_eq!(session.skipped, 0);

    let rec = session.reconstruction().unwrap();
    let tallest = rec
        .grid
        .cells()
        .iter()
        .flatten()
        .fold(f64::MIN, |a, &b| a.max(b));
    assert!(tallest > 15.0, "block lost in flattening: {tallest}");
    // Walls exist: some vertices sit at z = 0 with others at the block top.
    assert!(
        rec.mesh
            .triangles
            .iter()
            .flat_map(|t| t.vertices)
            .any(|v| v.z == 0.0)
    );

    let dir = tempfile::tempdir().unwrap();
    service.export_mesh(&dir.path().join(MESH_FILE)).unwrap();
    service.export_point_cloud(&dir.path().join(CLOUD_FILE)).unwrap();
    service.export_height_grid(&dir.path().join(GRID_FILE)).unwrap();

    let stl = fs::read_to_string(dir.path().join(MESH_FILE)).unwrap();
    assert!(stl.starts_with("solid block\n"));
    assert!(stl.ends_with("endsolid block\n"));
    assert_eq!(stl.matches("facet normal 0 0 1").count(), rec.mesh.len());

    // The saved table re-meshes to the same surface.
    let text = fs::read(dir.path().join(CLOUD_FILE)).unwrap();
    let cloud = cloud_io::read_csv(Cursor::new(text)).unwrap();
    assert_eq!(cloud.len(), session.raw_cloud.len());
    let again = reconstruct(&cloud, &service.config().reconstruction).unwrap();
    assert_eq!(again.mesh.len(), rec.mesh.len());
}

/// A rig that never moves; only the framing path is under test.
struct StillRig;

impl ActuatorSource for StillRig {
    fn move_to(&mut self, _: tiltscan_types::Axis, _: f64) -> Result<(), tiltscan_types::ScanError> {
        Ok(())
    }
    fn park(&mut self) -> Result<(), tiltscan_types::ScanError> {
        Ok(())
    }
}

#[test]
fn framed_byte_stream_feeds_a_sweep() {
    // Nine poses; garbage between frames and one corrupted frame that the
    // sampler must retry past.
    let mut bytes = Vec::new();
    for i in 0..9u16 {
        bytes.extend_from_slice(&[0x00, 0x59, 0x13]);
        if i == 4 {
            let mut bad = encode(100, 1, 2048);
            bad[8] ^= 0xFF;
            bytes.extend_from_slice(&bad);
        }
        bytes.extend_from_slice(&encode(70 + i, 500, 2048));
    }
    let mut reader = FrameReader::new(Cursor::new(bytes));

    let config = SweepConfig {
        pan_min: -1.0,
        pan_max: 1.0,
        pan_step: 1.0,
        tilt_min: -1.0,
        tilt_max: 1.0,
        tilt_step: 1.0,
        sensor_height_cm: 70.0,
    };
    let mut scheduler = SweepScheduler::new(&config, SamplerConfig::default()).unwrap();
    let out = scheduler
        .run(&mut StillRig, &mut reader, &ProgressTracker::new(), &AtomicBool::new(false))
        .unwrap();

    assert_eq!(out.skipped, 0);
    let distances: Vec<f64> = out.samples.iter().map(|s| s.distance_cm).collect();
    assert_eq!(distances, (70..79).map(f64::from).collect::<Vec<_>>());
}

#[test]
fn simulated_rig_is_released_after_sweep() {
    let (mut rig, mut lidar): (PanTiltRig, _) = SimRig::new(SimScene::flat(50.0)).build();
    let mut scheduler = SweepScheduler::new(
        &SweepConfig {
            pan_min: 0.0,
            pan_max: 2.0,
            tilt_min: 0.0,
            tilt_max: 2.0,
            ..SweepConfig::default()
        },
        SamplerConfig::default(),
    )
    .unwrap();
    scheduler
        .run(&mut rig, &mut lidar, &ProgressTracker::new(), &AtomicBool::new(false))
        .unwrap();
    assert_eq!(rig.angle(tiltscan_types::Axis::Pan), None);
    assert_eq!(rig.angle(tiltscan_types::Axis::Tilt), None);
}
