//! Height grid → triangle mesh, and ASCII STL serialisation.
//!
//! # Top surface
//!
//! Each grid cell is a vertex at `(col_x, row_y, height)`.  Every 2×2 block
//! of present cells becomes a quad split along one fixed diagonal:
//!
//! ```text
//!  v01 ─── v11        tri(v00, v10, v01)
//!   │ ╲     │         tri(v10, v11, v01)
//!   │   ╲   │
//!  v00 ─── v10
//! ```
//!
//! A block with any absent corner leaves a hole.
//!
//! # Walls
//!
//! A *feature* cell is one higher than the building threshold.  For each
//! feature cell, every edge-adjacent neighbour that is out of bounds, absent,
//! or not itself a feature gets a vertical quad along the shared edge of the
//! cell footprint, from `z = 0` up to the cell height.  Walls are a visual
//! approximation; the result is not guaranteed to be a closed manifold.

use std::io::{self, Write};

use tiltscan_types::Point3D;
use tracing::debug;

use crate::grid::HeightGrid;

/// Three vertices in emission order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Point3D; 3],
}

impl Triangle {
    pub const fn new(a: Point3D, b: Point3D, c: Point3D) -> Self {
        Self {
            vertices: [a, b, c],
        }
    }
}

/// Ordered triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Write the mesh as one ASCII `solid` block.
    ///
    /// Facet normals are written as the fixed placeholder `0 0 1`.
    pub fn write_stl<W: Write>(&self, name: &str, mut out: W) -> io::Result<()> {
        writeln!(out, "solid {name}")?;
        for tri in &self.triangles {
            writeln!(out, "  facet normal 0 0 1")?;
            writeln!(out, "    outer loop")?;
            for v in &tri.vertices {
                writeln!(out, "      vertex {} {} {}", v.x, v.y, v.z)?;
            }
            writeln!(out, "    endloop")?;
            writeln!(out, "  endfacet")?;
        }
        writeln!(out, "endsolid {name}")?;
        out.flush()
    }

    pub fn to_stl_string(&self, name: &str) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_stl(name, &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Triangulates a [`HeightGrid`] into a top surface plus boundary walls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshExporter {
    pub building_threshold_cm: f64,
}

impl MeshExporter {
    pub fn new(building_threshold_cm: f64) -> Self {
        Self {
            building_threshold_cm,
        }
    }

    /// Top surface followed by walls.  Deterministic for a given grid.
    pub fn export(&self, grid: &HeightGrid) -> Mesh {
        let mut mesh = Mesh::default();
        top_surface(grid, &mut mesh.triangles);
        let top = mesh.len();
        self.walls(grid, &mut mesh.triangles);
        debug!(
            top,
            walls = mesh.len() - top,
            threshold = self.building_threshold_cm,
            "mesh exported"
        );
        mesh
    }

    fn is_feature(&self, height: Option<f64>) -> bool {
        height.is_some_and(|h| h > self.building_threshold_cm)
    }

    fn walls(&self, grid: &HeightGrid, out: &mut Vec<Triangle>) {
        for row in 0..grid.height {
            for col in 0..grid.width {
                let Some(h) = grid.get(row, col) else {
                    continue;
                };
                if h <= self.building_threshold_cm {
                    continue;
                }
                let (r, c) = (row as isize, col as isize);
                let xl = grid.col_x(col);
                let xr = xl + grid.cell_size;
                let yb = grid.row_y(row);
                let yt = yb + grid.cell_size;

                if !self.is_feature(grid.get_signed(r, c - 1)) {
                    let [v1, v2, v3, v4] = x_face(xl, yb, yt, h);
                    out.push(Triangle::new(v1, v3, v2));
                    out.push(Triangle::new(v3, v4, v2));
                }
                if !self.is_feature(grid.get_signed(r, c + 1)) {
                    let [v1, v2, v3, v4] = x_face(xr, yb, yt, h);
                    out.push(Triangle::new(v2, v3, v1));
                    out.push(Triangle::new(v2, v4, v3));
                }
                if !self.is_feature(grid.get_signed(r - 1, c)) {
                    let [v1, v2, v3, v4] = y_face(yb, xl, xr, h);
                    out.push(Triangle::new(v1, v3, v2));
                    out.push(Triangle::new(v3, v4, v2));
                }
                if !self.is_feature(grid.get_signed(r + 1, c)) {
                    let [v1, v2, v3, v4] = y_face(yt, xl, xr, h);
                    out.push(Triangle::new(v2, v3, v1));
                    out.push(Triangle::new(v2, v4, v3));
                }
            }
        }
    }
}

/// Two triangles per complete 2×2 block of present cells.
pub fn top_surface(grid: &HeightGrid, out: &mut Vec<Triangle>) {
    for row in 0..grid.height.saturating_sub(1) {
        for col in 0..grid.width.saturating_sub(1) {
            let (Some(h00), Some(h10), Some(h01), Some(h11)) = (
                grid.get(row, col),
                grid.get(row, col + 1),
                grid.get(row + 1, col),
                grid.get(row + 1, col + 1),
            ) else {
                continue;
            };
            let (x0, x1) = (grid.col_x(col), grid.col_x(col + 1));
            let (y0, y1) = (grid.row_y(row), grid.row_y(row + 1));
            let v00 = Point3D::new(x0, y0, h00);
            let v10 = Point3D::new(x1, y0, h10);
            let v01 = Point3D::new(x0, y1, h01);
            let v11 = Point3D::new(x1, y1, h11);
            out.push(Triangle::new(v00, v10, v01));
            out.push(Triangle::new(v10, v11, v01));
        }
    }
}

// Wall quad in the plane x = `x`: bottom pair then top pair, low y first.
fn x_face(x: f64, y0: f64, y1: f64, h: f64) -> [Point3D; 4] {
    [
        Point3D::new(x, y0, 0.0),
        Point3D::new(x, y1, 0.0),
        Point3D::new(x, y0, h),
        Point3D::new(x, y1, h),
    ]
}

// Wall quad in the plane y = `y`: bottom pair then top pair, low x first.
fn y_face(y: f64, x0: f64, x1: f64, h: f64) -> [Point3D; 4] {
    [
        Point3D::new(x0, y, 0.0),
        Point3D::new(x1, y, 0.0),
        Point3D::new(x0, y, h),
        Point3D::new(x1, y, h),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiltscan_types::PointCloud;

    fn grid(points: &[(f64, f64, f64)], cell: f64) -> HeightGrid {
        let cloud: PointCloud = points.iter().map(|&(x, y, z)| Point3D::new(x, y, z)).collect();
        HeightGrid::build(&cloud, cell).unwrap()
    }

    fn p(x: f64, y: f64, z: f64) -> Point3D {
        Point3D::new(x, y, z)
    }

    #[test]
    fn single_block_gives_two_triangles_on_the_fixed_diagonal() {
        let g = grid(
            &[(0.0, 0.0, 10.0), (2.0, 0.0, 10.0), (0.0, 2.0, 10.0), (2.0, 2.0, 10.0)],
            2.0,
        );
        // Threshold at the block height: no cell is a feature.
        let mesh = MeshExporter::new(10.0).export(&g);
        assert_eq!(
            mesh.triangles,
            vec![
                Triangle::new(p(0.0, 0.0, 10.0), p(2.0, 0.0, 10.0), p(0.0, 2.0, 10.0)),
                Triangle::new(p(2.0, 0.0, 10.0), p(2.0, 2.0, 10.0), p(0.0, 2.0, 10.0)),
            ]
        );
    }

    #[test]
    fn block_with_absent_corner_leaves_a_hole() {
        // Corner (2, 2) is never hit.
        let g = grid(&[(0.0, 0.0, 1.0), (2.0, 0.0, 1.0), (0.0, 2.0, 1.0)], 2.0);
        assert_eq!(g.get(1, 1), None);
        let mut tris = Vec::new();
        top_surface(&g, &mut tris);
        assert!(tris.is_empty());
        assert!(MeshExporter::new(5.0).export(&g).is_empty());
    }

    #[test]
    fn isolated_feature_gets_four_walls() {
        // 3×3 ground with a raised centre.
        let mut pts = Vec::new();
        for row in 0..3 {
            for col in 0..3 {
                let h = if (row, col) == (1, 1) { 20.0 } else { 0.0 };
                pts.push((f64::from(col), f64::from(row), h));
            }
        }
        let g = grid(&pts, 1.0);
        let mut walls = Vec::new();
        MeshExporter::new(5.0).walls(&g, &mut walls);
        assert_eq!(walls.len(), 8);

        // Every wall vertex sits on the centre cell's footprint, z in {0, 20}.
        for v in walls.iter().flat_map(|t| t.vertices) {
            assert!((1.0..=2.0).contains(&v.x) && (1.0..=2.0).contains(&v.y));
            assert!(v.z == 0.0 || v.z == 20.0);
        }
        // Left wall comes first and lies in x = 1.
        assert_eq!(
            walls[0],
            Triangle::new(p(1.0, 1.0, 0.0), p(1.0, 1.0, 20.0), p(1.0, 2.0, 0.0))
        );
        // Full mesh: 4 top blocks × 2 + 8 walls.
        assert_eq!(MeshExporter::new(5.0).export(&g).len(), 16);
    }

    #[test]
    fn adjacent_features_share_no_wall() {
        let g = grid(&[(0.0, 0.0, 10.0), (1.0, 0.0, 10.0)], 1.0);
        let mut walls = Vec::new();
        MeshExporter::new(5.0).walls(&g, &mut walls);
        // Two cells, 3 exposed sides each.
        assert_eq!(walls.len(), 12);
    }

    #[test]
    fn export_is_deterministic() {
        let g = grid(
            &[(0.0, 0.0, 1.0), (1.0, 0.0, 8.0), (0.0, 1.0, 2.0), (1.0, 1.0, 9.0), (2.0, 2.0, 3.0)],
            1.0,
        );
        let exporter = MeshExporter::new(5.0);
        let a = exporter.export(&g).to_stl_string("scan");
        let b = exporter.export(&g).to_stl_string("scan");
        assert_eq!(a, b);
    }

    #[test]
    fn stl_text_follows_facet_grammar() {
        let mesh = Mesh {
            triangles: vec![Triangle::new(p(0.0, 0.0, 1.5), p(2.0, 0.0, 1.5), p(0.0, 2.0, -1.0))],
        };
        let text = mesh.to_stl_string("roof");
        let expected = "solid roof\n\
                        \x20 facet normal 0 0 1\n\
                        \x20   outer loop\n\
                        \x20     vertex 0 0 1.5\n\
                        \x20     vertex 2 0 1.5\n\
                        \x20     vertex 0 2 -1\n\
                        \x20   endloop\n\
                        \x20 endfacet\n\
                        endsolid roof\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn empty_mesh_is_still_a_valid_solid() {
        assert_eq!(Mesh::default().to_stl_string("x"), "solid x\nendsolid x\n");
    }
}
