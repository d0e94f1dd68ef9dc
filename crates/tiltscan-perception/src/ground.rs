//! Ground-plane estimation and flattening.
//!
//! [`GroundPlaneEstimator::fit`] finds the least-squares plane
//! `z = a·x + b·y + c` through a cloud.  The normal equations are solved on
//! mean-centred coordinates, which reduces the 3×3 system to a 2×2 one for
//! `(a, b)` and keeps it well conditioned when the scan sits far from the
//! origin.  `c` then follows from the centroid.
//!
//! [`GroundPlaneEstimator::flatten`] subtracts the plane so heights become
//! ground-relative.

use tiltscan_types::{Plane, Point3D, PointCloud, ScanError};
use tracing::debug;

/// Least-squares ground plane fitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPlaneEstimator {
    /// Relative determinant below which the x/y spread counts as collinear.
    pub rank_tolerance: f64,
}

impl Default for GroundPlaneEstimator {
    fn default() -> Self {
        Self {
            rank_tolerance: 1e-9,
        }
    }
}

impl GroundPlaneEstimator {
    /// Fit a plane through `cloud`.
    ///
    /// # Errors
    ///
    /// - [`ScanError::EmptyCloud`] for an empty cloud.
    /// - [`ScanError::DegeneratePlane`] for fewer than three points, or when
    ///   the points' x/y footprint is collinear (rank < 3).
    pub fn fit(&self, cloud: &PointCloud) -> Result<Plane, ScanError> {
        cloud.ensure_non_empty()?;
        let n = cloud.len();
        if n < 3 {
            return Err(ScanError::DegeneratePlane(format!(
                "need at least 3 points, got {n}"
            )));
        }

        let nf = n as f64;
        let (sx, sy, sz) = cloud
            .iter()
            .fold((0.0, 0.0, 0.0), |(sx, sy, sz), p| (sx + p.x, sy + p.y, sz + p.z));
        let (mx, my, mz) = (sx / nf, sy / nf, sz / nf);

        let (mut sxx, mut sxy, mut syy, mut sxz, mut syz) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for p in cloud {
            let (dx, dy, dz) = (p.x - mx, p.y - my, p.z - mz);
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
            sxz += dx * dz;
            syz += dy * dz;
        }

        let det = sxx * syy - sxy * sxy;
        if !det.is_finite() || det <= self.rank_tolerance * sxx * syy || sxx * syy == 0.0 {
            return Err(ScanError::DegeneratePlane(
                "points are collinear in x/y".to_string(),
            ));
        }

        let a = (sxz * syy - syz * sxy) / det;
        let b = (syz * sxx - sxz * sxy) / det;
        let plane = Plane {
            a,
            b,
            c: mz - a * mx - b * my,
        };
        debug!(points = n, a = plane.a, b = plane.b, c = plane.c, "ground plane fitted");
        Ok(plane)
    }

    /// A new cloud with every `z` replaced by its height above `plane`.
    pub fn flatten(cloud: &PointCloud, plane: &Plane) -> PointCloud {
        cloud
            .iter()
            .map(|p| Point3D::new(p.x, p.y, p.z - plane.height_at(p.x, p.y)))
            .collect()
    }
}
