//! Artifact files.
//!
//! Every writer goes through [`write_atomic`]: content lands in a sibling
//! `<name>.partial` file that is flushed, synced and renamed over the target.
//! On any failure the partial file is removed, so a file at the target path
//! is always complete.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tiltscan_perception::cloud_io;
use tiltscan_perception::{HeightGrid, Mesh};
use tiltscan_types::{PointCloud, ScanError};
use tracing::{info, warn};

/// Default artifact file names inside an output directory.
pub const MESH_FILE: &str = "scan.stl";
pub const CLOUD_FILE: &str = "scan.csv";
pub const GRID_FILE: &str = "heightmap.json";

fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

fn export_error(path: &Path, err: impl std::fmt::Display) -> ScanError {
    ScanError::ExportWrite {
        path: path.display().to_string(),
        details: err.to_string(),
    }
}

/// Write `path` through a temporary sibling and rename it into place.
///
/// # Errors
///
/// [`ScanError::ExportWrite`] carrying the underlying I/O error.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), ScanError>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let partial = partial_path(path);
    let result = (|| -> io::Result<()> {
        let mut out = BufWriter::new(File::create(&partial)?);
        write(&mut out)?;
        out.flush()?;
        out.get_ref().sync_all()?;
        drop(out);
        fs::rename(&partial, path)
    })();

    match result {
        Ok(()) => {
            info!(path = %path.display(), "artifact written");
            Ok(())
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(&partial) {
                if rm.kind() != io::ErrorKind::NotFound {
                    warn!(path = %partial.display(), error = %rm, "could not remove partial file");
                }
            }
            Err(export_error(path, e))
        }
    }
}

/// ASCII STL with `solid_name` in the header and footer.
pub fn export_mesh(mesh: &Mesh, solid_name: &str, path: &Path) -> Result<(), ScanError> {
    write_atomic(path, |out| mesh.write_stl(solid_name, out))
}

/// `x,y,z` table.
pub fn export_point_cloud(cloud: &PointCloud, path: &Path) -> Result<(), ScanError> {
    write_atomic(path, |out| cloud_io::write_csv(cloud, out))
}

/// JSON raster.
pub fn export_height_grid(grid: &HeightGrid, path: &Path) -> Result<(), ScanError> {
    write_atomic(path, |out| {
        serde_json::to_writer(&mut *out, grid)?;
        writeln!(out)
    })
}
