//! Point-cloud table codec.
//!
//! One header line `x,y,z`, then one comma-separated row per point.  Values
//! are centimeters; no units are embedded.

use std::io::{self, BufRead, Write};

use thiserror::Error;
use tiltscan_types::{Point3D, PointCloud};

pub const HEADER: &str = "x,y,z";

#[derive(Error, Debug)]
pub enum CloudIoError {
    #[error("missing `x,y,z` header")]
    MissingHeader,

    #[error("line {line}: {details}")]
    Parse { line: usize, details: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Write `cloud` as a table.
pub fn write_csv<W: Write>(cloud: &PointCloud, mut out: W) -> io::Result<()> {
    writeln!(out, "{HEADER}")?;
    for p in cloud {
        writeln!(out, "{},{},{}", p.x, p.y, p.z)?;
    }
    out.flush()
}

/// Read a table written by [`write_csv`].  Blank lines are skipped.
///
/// # Errors
///
/// [`CloudIoError::MissingHeader`] when the first line is not the header,
/// [`CloudIoError::Parse`] for a malformed row.
pub fn read_csv<R: BufRead>(input: R) -> Result<PointCloud, CloudIoError> {
    let mut lines = input.lines();
    let header = lines.next().transpose()?;
    if header.as_deref().map(str::trim) != Some(HEADER) {
        return Err(CloudIoError::MissingHeader);
    }

    let mut cloud = PointCloud::new();
    for (idx, line) in lines.enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let lineno = idx + 2;
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [x, y, z] = fields.as_slice() else {
            return Err(CloudIoError::Parse {
                line: lineno,
                details: format!("expected 3 fields, got {}", fields.len()),
            });
        };
        let parse = |s: &str| {
            s.parse::<f64>().map_err(|e| CloudIoError::Parse {
                line: lineno,
                details: format!("`{s}`: {e}"),
            })
        };
        cloud.push(Point3D::new(parse(*x)?, parse(*y)?, parse(*z)?));
    }
    Ok(cloud)
}
