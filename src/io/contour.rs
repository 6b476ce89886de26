//! Contour CSV ingest and orientation.
//!
//! Input is a CSV with `x` and `y` columns in pixels (extra columns are
//! ignored). Rows that do not parse to two finite numbers are skipped and
//! reported, the same way a single bad row never sinks a whole file.
//!
//! Images are usually stored with `y` pointing down. The fit wants the apex at
//! the low end of `y`, so [`orient`] flips `y` when the image convention and
//! the drop kind require it.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{DropKind, Point};
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct IngestedContour {
    pub points: Vec<Point>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load contour points from a CSV file.
pub fn load_contour(path: &Path) -> Result<IngestedContour, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open contour CSV '{}': {e}", path.display())))?;
    read_contour(file).map_err(|e| AppError::new(e.exit_code(), format!("{}: {e}", path.display())))
}

/// Parse contour points from any CSV reader.
pub fn read_contour(input: impl Read) -> Result<IngestedContour, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    let (x_col, y_col) = match (header_map.get("x"), header_map.get("y")) {
        (Some(&x), Some(&y)) => (x, y),
        _ => {
            return Err(AppError::new(
                2,
                "Contour CSV must have 'x' and 'y' columns.",
            ));
        }
    };

    let mut points = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header, CSV lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match (parse_coord(&record, x_col), parse_coord(&record, y_col)) {
            (Ok(x), Ok(y)) => points.push([x, y]),
            (Err(message), _) | (_, Err(message)) => row_errors.push(RowError { line, message }),
        }
    }

    if !row_errors.is_empty() {
        log::warn!("contour ingest: skipped {} of {rows_read} rows", row_errors.len());
    }

    Ok(IngestedContour {
        points,
        row_errors,
        rows_read,
    })
}

/// Put the apex at the low end of `y`.
///
/// Pendant drops hang with the apex at the bottom, sessile drops rest with the
/// apex on top; `y_down` says whether the source image has `y` pointing down.
pub fn orient(points: &[Point], y_down: bool, kind: DropKind) -> Vec<Point> {
    if flips_y(y_down, kind) {
        points.iter().map(|p| [p[0], -p[1]]).collect()
    } else {
        points.to_vec()
    }
}

/// Whether [`orient`] negates `y` for this combination.
pub fn flips_y(y_down: bool, kind: DropKind) -> bool {
    y_down != (kind == DropKind::Sessile)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
        .collect()
}

fn parse_coord(record: &StringRecord, col: usize) -> Result<f64, String> {
    let raw = record
        .get(col)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing column {}", col + 1))?;
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("'{raw}' is not finite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_points_and_reports_bad_rows() {
        let csv = "id,X,Y\n1,10.5,20\n2,abc,3\n3, 11 ,21.25\n4,,5\n";
        let out = read_contour(csv.as_bytes()).unwrap();
        assert_eq!(out.points, vec![[10.5, 20.0], [11.0, 21.25]]);
        assert_eq!(out.rows_read, 4);
        let lines: Vec<usize> = out.row_errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 5]);
    }

    #[test]
    fn missing_columns_are_rejected() {
        let err = read_contour("a,b\n1,2\n".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn orientation_depends_on_image_convention_and_drop_kind() {
        let pts = [[1.0, 2.0]];
        assert_eq!(orient(&pts, true, DropKind::Pendant), vec![[1.0, -2.0]]);
        assert_eq!(orient(&pts, false, DropKind::Pendant), vec![[1.0, 2.0]]);
        assert_eq!(orient(&pts, true, DropKind::Sessile), vec![[1.0, 2.0]]);
        assert_eq!(orient(&pts, false, DropKind::Sessile), vec![[1.0, -2.0]]);
    }
}
