//! `tiltscan-perception` – scan geometry.
//!
//! Pure functions and immutable records that turn pan/tilt range samples into
//! a ground-relative surface.  Nothing here touches hardware or threads.
//!
//! # Modules
//!
//! - [`transform`] – [`spherical_to_cartesian`][transform::spherical_to_cartesian]:
//!   the single projection convention for `(distance, pan, tilt, H)`.
//! - [`ground`] – [`GroundPlaneEstimator`][ground::GroundPlaneEstimator]:
//!   least-squares plane fit and flattening.
//! - [`grid`] – [`HeightGrid`][grid::HeightGrid]: fixed-size max-height
//!   raster over the flattened cloud.
//! - [`mesh`] – [`MeshExporter`][mesh::MeshExporter]: top surface plus wall
//!   synthesis, and ASCII STL output.
//! - [`cloud_io`] – the `x,y,z` point-cloud table format.

pub mod cloud_io;
pub mod grid;
pub mod ground;
pub mod mesh;
pub mod transform;

pub use grid::HeightGrid;
pub use ground::GroundPlaneEstimator;
pub use mesh::{Mesh, MeshExporter, Triangle};
pub use transform::{SphericalProjection, spherical_to_cartesian};
