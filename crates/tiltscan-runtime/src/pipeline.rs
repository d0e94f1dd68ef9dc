//! Post-sweep reconstruction: raw cloud → ground plane → flattened cloud →
//! height grid → mesh.

use tiltscan_perception::{GroundPlaneEstimator, HeightGrid, Mesh, MeshExporter};
use tiltscan_types::{Plane, PointCloud, ReconstructionConfig, ScanError};
use tracing::{info, instrument};

/// Everything derived from one raw cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub plane: Plane,
    pub flattened: PointCloud,
    pub grid: HeightGrid,
    pub mesh: Mesh,
}

/// Run every reconstruction stage on `cloud`.
///
/// # Errors
///
/// - [`ScanError::EmptyCloud`] before any stage runs.
/// - [`ScanError::DegeneratePlane`] when no ground plane can be fitted.
/// - [`ScanError::InvalidConfig`] for a non-positive cell size.
#[instrument(name = "reconstruct", skip_all, fields(points = cloud.len()))]
pub fn reconstruct(
    cloud: &PointCloud,
    config: &ReconstructionConfig,
) -> Result<Reconstruction, ScanError> {
    cloud.ensure_non_empty()?;

    let plane = GroundPlaneEstimator::default().fit(cloud)?;
    let flattened = GroundPlaneEstimator::flatten(cloud, &plane);
    let grid = HeightGrid::build(&flattened, config.cell_size_cm)?;
    let mesh = MeshExporter::new(config.building_threshold_cm).export(&grid);

    info!(
        grid_width = grid.width,
        grid_height = grid.height,
        triangles = mesh.len(),
        "reconstruction finished"
    );
    Ok(Reconstruction {
        plane,
        flattened,
        grid,
        mesh,
    })
}
