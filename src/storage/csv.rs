//! Headerless CSV files exchanged with the reduction step and with renderers.
//!
//! ```text
//! input:    index, x, y, feature_1, ..., feature_n
//! refined:  index, dred1, dred2, height, feature_1, ..., feature_n
//! matrix:   d_0_0, d_0_1, ..., d_0_N   (one row per cell)
//! ```

use crate::error::{Result, TopoError};
use crate::grid::{Datapoint, Grid};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One row of the input CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The index column, kept verbatim.
    pub label: String,
    /// Initial x coordinate.
    pub x: f64,
    /// Initial y coordinate.
    pub y: f64,
    /// Original feature vector.
    pub features: Vec<f64>,
}

/// A reduced dataset: 2D coordinates plus the original features.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Rows in file order.
    pub records: Vec<Record>,
}

impl Dataset {
    /// Builds a dataset, checking that every row has the same feature count.
    pub fn from_records(records: Vec<Record>) -> Result<Self> {
        if records.is_empty() {
            return Err(TopoError::EmptyInput("dataset has no rows".to_string()));
        }
        let dimension = records[0].features.len();
        if dimension == 0 {
            return Err(TopoError::Config("dataset has no feature columns".to_string()));
        }
        if let Some((line, r)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| r.features.len() != dimension)
        {
            return Err(TopoError::Parse {
                line: line + 1,
                message: format!("expected {} features, found {}", dimension, r.features.len()),
            });
        }
        Ok(Self { records })
    }

    /// Loads an input CSV from disk.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TopoError::FileNotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        Self::parse(BufReader::new(file))
    }

    /// Parses input CSV rows. Blank lines are skipped.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut records = Vec::new();
        let mut expected_columns: Option<usize> = None;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = i + 1;
            if line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 4 {
                return Err(TopoError::Parse {
                    line: line_no,
                    message: format!(
                        "expected index, x, y and at least one feature, found {} columns",
                        fields.len()
                    ),
                });
            }
            match expected_columns {
                Some(n) if n != fields.len() => {
                    return Err(TopoError::Parse {
                        line: line_no,
                        message: format!("expected {} columns, found {}", n, fields.len()),
                    });
                }
                None => expected_columns = Some(fields.len()),
                _ => {}
            }

            let values = parse_floats(&fields[1..], line_no)?;
            records.push(Record {
                label: fields[0].to_string(),
                x: values[0],
                y: values[1],
                features: values[2..].to_vec(),
            });
        }

        Self::from_records(records)
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Dimensionality of the feature vectors.
    pub fn dimension(&self) -> usize {
        self.records.first().map(|r| r.features.len()).unwrap_or(0)
    }

    /// Converts every row into an unowned point, keeping the file order.
    pub fn to_datapoints(&self) -> Vec<Datapoint> {
        self.records
            .iter()
            .enumerate()
            .map(|(row, r)| Datapoint::new(row, r.label.clone(), r.x, r.y, r.features.clone()))
            .collect()
    }

    /// Bounding box of the 2D coordinates as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.records.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), r| (x0.min(r.x), y0.min(r.y), x1.max(r.x), y1.max(r.y)),
        )
    }

    /// Writes the dataset in input CSV format.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = String::new();
        for r in &self.records {
            out.push_str(&r.label);
            push_values(&mut out, [r.x, r.y].iter().chain(r.features.iter()));
            out.push('\n');
        }
        write_file(path.as_ref(), &out)
    }
}

/// Writes the refined points in input row order.
///
/// Every row carries the current coordinates and the height of the owning
/// cell. Nothing is written if any point has no owner.
pub fn write_refined_csv<P: AsRef<Path>>(grid: &Grid, path: P) -> Result<()> {
    let mut rows: Vec<usize> = (0..grid.points.len()).collect();
    rows.sort_by_key(|&p| grid.points[p].row);

    let mut out = String::new();
    for p in rows {
        let point = &grid.points[p];
        let height = grid.get_cell_of_point(p)?.height;
        out.push_str(&point.label);
        push_values(
            &mut out,
            [point.x_axis, point.y_axis, height].iter().chain(point.data.iter()),
        );
        out.push('\n');
    }
    write_file(path.as_ref(), &out)
}

/// Loads a refined CSV back into points placed at their refined coordinates.
/// The height column is dropped.
pub fn load_refined_points<P: AsRef<Path>>(path: P) -> Result<Vec<Datapoint>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TopoError::FileNotFound(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);

    let mut points = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 5 {
            return Err(TopoError::Parse {
                line: i + 1,
                message: format!("refined rows need at least 5 columns, found {}", fields.len()),
            });
        }
        let values = parse_floats(&fields[1..], i + 1)?;
        let row = points.len();
        points.push(Datapoint::new(row, fields[0], values[0], values[1], values[3..].to_vec()));
    }

    if points.is_empty() {
        return Err(TopoError::EmptyInput(format!("{} has no rows", path.display())));
    }
    Ok(points)
}

/// Writes a square distance matrix without header or index.
pub fn write_distance_matrix<P: AsRef<Path>>(matrix: &Array2<f64>, path: P) -> Result<()> {
    let mut out = String::new();
    for row in matrix.rows() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    write_file(path.as_ref(), &out)
}

/// Reads a square distance matrix written by [`write_distance_matrix`].
pub fn load_distance_matrix<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TopoError::FileNotFound(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);

    let mut values = Vec::new();
    let mut rows = 0;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        values.extend(parse_floats(&fields, i + 1)?);
        rows += 1;
    }

    if rows == 0 || values.len() != rows * rows {
        return Err(TopoError::Parse {
            line: rows,
            message: format!("matrix with {} rows has {} values", rows, values.len()),
        });
    }
    Array2::from_shape_vec((rows, rows), values)
        .map_err(|e| TopoError::Serialization(e.to_string()))
}

fn parse_floats(fields: &[&str], line: usize) -> Result<Vec<f64>> {
    fields
        .iter()
        .map(|f| {
            f.parse::<f64>().map_err(|e| TopoError::Parse {
                line,
                message: format!("'{}': {}", f, e),
            })
        })
        .collect()
}

fn push_values<'a, I: Iterator<Item = &'a f64>>(out: &mut String, values: I) {
    for v in values {
        out.push(',');
        out.push_str(&v.to_string());
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(contents.as_bytes())?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    const SAMPLE: &str = "0,0.1,0.2,1.0,2.0,3.0\n1,0.9,0.8,4.0,5.0,6.0\n\n2,0.5,0.5,7,8,9\n";

    #[test]
    fn test_parse_dataset() {
        let dataset = Dataset::parse(Cursor::new(SAMPLE)).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.dimension(), 3);
        assert_eq!(dataset.records[1].label, "1");
        assert_eq!(dataset.records[1].x, 0.9);
        assert_eq!(dataset.records[2].features, vec![7.0, 8.0, 9.0]);
        assert_eq!(dataset.bounds(), (0.1, 0.2, 0.9, 0.8));
    }

    #[test]
    fn test_parse_errors() {
        let err = Dataset::parse(Cursor::new("0,0.1,0.2\n")).unwrap_err();
        assert!(matches!(err, TopoError::Parse { line: 1, .. }));

        let err = Dataset::parse(Cursor::new("0,0.1,0.2,1\n1,0.1,abc,1\n")).unwrap_err();
        assert!(matches!(err, TopoError::Parse { line: 2, .. }));

        let err = Dataset::parse(Cursor::new("0,0.1,0.2,1\n1,0.1,0.2,1,2\n")).unwrap_err();
        assert!(matches!(err, TopoError::Parse { line: 2, .. }));

        let err = Dataset::parse(Cursor::new("\n\n")).unwrap_err();
        assert!(matches!(err, TopoError::EmptyInput(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Dataset::load_csv("/no/such/input.csv").unwrap_err();
        assert!(matches!(err, TopoError::FileNotFound(_)));
    }

    #[test]
    fn test_save_and_load_dataset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.csv");
        let dataset = Dataset::parse(Cursor::new(SAMPLE)).unwrap();
        dataset.save_csv(&path).unwrap();

        let loaded = Dataset::load_csv(&path).unwrap();
        assert_eq!(loaded.records, dataset.records);
    }

    #[test]
    fn test_refined_csv_in_input_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("refined.csv");

        let dataset = Dataset::parse(Cursor::new(SAMPLE)).unwrap();
        let mut grid = Grid::autogenerated(2, None, 3, None, None).unwrap();
        grid.init_points_to_right_cell(&dataset).unwrap();
        grid.set_mountains([(3, 0.5)]).unwrap();
        write_refined_csv(&grid, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "0,0.1,0.2,0,1,2,3");
        assert_eq!(lines[1], "1,0.9,0.8,0.5,4,5,6");

        let points = load_refined_points(&path).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[1].coordinates(), (0.9, 0.8));
        assert_eq!(points[1].data, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_refined_csv_requires_owner() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("refined.csv");
        let mut grid = Grid::autogenerated(2, None, 1, None, None).unwrap();
        grid.points.push(Datapoint::new(0, "0", 0.1, 0.1, vec![1.0]));
        assert!(write_refined_csv(&grid, &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_distance_matrix_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dm.csv");
        let matrix = Array2::from_shape_vec((2, 2), vec![0.0, 1.5, 1.5, 0.0]).unwrap();
        write_distance_matrix(&matrix, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "0,1.5\n1.5,0\n");
        assert_eq!(load_distance_matrix(&path).unwrap(), matrix);
    }
}
