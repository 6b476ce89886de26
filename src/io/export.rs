//! Export fit results to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or plotting scripts.

use std::path::Path;

use serde::Serialize;

use crate::domain::{Point, ResidualRecord};
use crate::error::AppError;

#[derive(Debug, Serialize)]
struct ResidualRow {
    index: usize,
    side: &'static str,
    arc_length: f64,
    residual_px: f64,
}

#[derive(Debug, Serialize)]
struct PointRow {
    x: f64,
    y: f64,
}

/// Write per-point residuals (contour order, ascending `y`).
pub fn write_residuals_csv(path: &Path, residuals: &[ResidualRecord]) -> Result<(), AppError> {
    let rows = residuals.iter().enumerate().map(|(index, r)| ResidualRow {
        index,
        side: if r.arc_length < 0.0 { "left" } else { "right" },
        arc_length: r.arc_length.abs(),
        residual_px: r.residual,
    });
    write_rows(path, rows)
}

/// Write a polyline (e.g. the fitted contour) as `x,y` rows.
pub fn write_points_csv(path: &Path, points: &[Point]) -> Result<(), AppError> {
    write_rows(path, points.iter().map(|p| PointRow { x: p[0], y: p[1] }))
}

fn write_rows<R: Serialize>(path: &Path, rows: impl Iterator<Item = R>) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display()))
    })?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::contour::load_contour;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ylfit-{name}-{}.csv", std::process::id()))
    }

    #[test]
    fn exported_points_can_be_read_back() {
        let path = temp_path("export-points");
        let points = vec![[1.5, -2.0], [3.0, 4.25]];
        write_points_csv(&path, &points).unwrap();
        let loaded = load_contour(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.points, points);
        assert!(loaded.row_errors.is_empty());
    }

    #[test]
    fn residual_rows_carry_side_and_unsigned_arc_length() {
        let path = temp_path("export-residuals");
        let residuals = vec![
            ResidualRecord { arc_length: -0.75, residual: 0.125 },
            ResidualRecord { arc_length: 0.0, residual: -0.5 },
            ResidualRecord { arc_length: 1.25, residual: 2.0 },
        ];
        write_residuals_csv(&path, &residuals).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        std::fs::remove_file(&path).ok();

        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            ["index", "side", "arc_length", "residual_px"]
        );
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][1], "left");
        assert_eq!(rows[0][2].parse::<f64>().unwrap(), 0.75);
        assert_eq!(&rows[1][1], "right");
        assert_eq!(rows[1][3].parse::<f64>().unwrap(), -0.5);
        assert_eq!(&rows[2][0], "2");
        assert_eq!(rows[2][3].parse::<f64>().unwrap(), 2.0);
    }
}
