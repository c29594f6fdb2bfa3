//! Legacy VTK file output.
//!
//! Writes the grid as an ASCII `STRUCTURED_POINTS` dataset with the solution
//! values as scalar point data, readable by ParaView and VisIt.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::domain::Domain;

/// Writes a `rows x cols` grid to a legacy ASCII VTK file.
///
/// Values are flattened row-major. The dataset origin and spacing are taken
/// from the physical domain.
pub fn write_vtk(path: &Path, values: &[f64], rows: usize, cols: usize, domain: &Domain) -> Result<()> {
    if values.len() != rows * cols {
        return Err(anyhow!(
            "grid has {} values, expected {} ({rows} x {cols})",
            values.len(),
            rows * cols
        ));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let file =
        File::create(path).with_context(|| format!("Failed to create file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    let h = domain.spacing(cols);

    writeln!(writer, "# vtk DataFile Version 3.0")?;
    writeln!(writer, "Jacobi relaxation solution")?;
    writeln!(writer, "ASCII")?;
    writeln!(writer, "DATASET STRUCTURED_POINTS")?;
    writeln!(writer, "DIMENSIONS {cols} {rows} 1")?;
    writeln!(writer, "ORIGIN {} {} 0", domain.x_min, domain.y_min)?;
    writeln!(writer, "SPACING {h} {h} 1")?;
    writeln!(writer, "POINT_DATA {}", rows * cols)?;
    writeln!(writer, "SCALARS solution double 1")?;
    writeln!(writer, "LOOKUP_TABLE default")?;

    for value in values {
        writeln!(writer, "{value}")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_structured_points_header() {
        let path = std::env::temp_dir().join("jacobi2d_vtk_header_test.vtk");
        let values = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        write_vtk(&path, &values, 2, 3, &Domain::unit_square()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "# vtk DataFile Version 3.0");
        assert_eq!(lines[3], "DATASET STRUCTURED_POINTS");
        assert_eq!(lines[4], "DIMENSIONS 3 2 1");
        assert_eq!(lines[7], "POINT_DATA 6");
        // 10 header lines followed by one value per point
        assert_eq!(lines.len(), 10 + 6);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_rejects_size_mismatch() {
        let path = std::env::temp_dir().join("jacobi2d_vtk_mismatch_test.vtk");
        let values = vec![0.0; 5];
        assert!(write_vtk(&path, &values, 2, 3, &Domain::unit_square()).is_err());
    }
}
