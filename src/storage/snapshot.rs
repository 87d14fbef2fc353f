//! Read-only JSON snapshot of a refined grid for external renderers.

use crate::error::{Result, TopoError};
use crate::grid::{CellId, Grid};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Per-cell state visible to renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    /// Cell id.
    pub id: CellId,
    /// Lattice row.
    pub row: usize,
    /// Lattice column.
    pub col: usize,
    /// Lower-left corner x.
    pub posx: f64,
    /// Lower-left corner y.
    pub posy: f64,
    /// Elevation.
    pub height: f64,
    /// Most recent local error.
    pub local_error: f64,
    /// Intra-cell variance.
    pub icv: f64,
    /// Number of owned points.
    pub point_count: usize,
}

/// Per-point state visible to renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSnapshot {
    /// Input row.
    pub row: usize,
    /// Index column of the input.
    pub label: String,
    /// Current x.
    pub x: f64,
    /// Current y.
    pub y: f64,
    /// Initial x.
    pub x_org: f64,
    /// Initial y.
    pub y_org: f64,
    /// Owning cell.
    pub owner: Option<CellId>,
}

/// Snapshot of a grid's cells and points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// Format version.
    pub version: u32,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub columns: usize,
    /// Cell width.
    pub cellwidth: f64,
    /// Feature dimensionality.
    pub dimension: usize,
    /// Neutral variance of the grid.
    pub neutral_variance: f64,
    /// Cells in row-major order.
    pub cells: Vec<CellSnapshot>,
    /// Points in input row order.
    pub points: Vec<PointSnapshot>,
}

impl GridSnapshot {
    /// Captures the current state of a grid.
    pub fn capture(grid: &Grid) -> Self {
        let cells = grid
            .cells
            .iter()
            .map(|c| {
                let (row, col) = grid.index_to_coords(c.id);
                CellSnapshot {
                    id: c.id,
                    row,
                    col,
                    posx: c.posx,
                    posy: c.posy,
                    height: c.height,
                    local_error: c.local_error,
                    icv: c.icv,
                    point_count: c.point_count(),
                }
            })
            .collect();

        let points = grid
            .points_in_input_order()
            .into_iter()
            .map(|p| PointSnapshot {
                row: p.row,
                label: p.label.clone(),
                x: p.x_axis,
                y: p.y_axis,
                x_org: p.x_org,
                y_org: p.y_org,
                owner: p.owner,
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            rows: grid.rows,
            columns: grid.columns,
            cellwidth: grid.cellwidth,
            dimension: grid.dimension,
            neutral_variance: grid.neutral_variance,
            cells,
            points,
        }
    }

    /// Writes the snapshot as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a snapshot written by [`GridSnapshot::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TopoError::FileNotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let snapshot: GridSnapshot = serde_json::from_reader(reader)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(TopoError::Serialization(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Highest cell elevation, floored at 0 (sea level).
    pub fn max_height(&self) -> f64 {
        self.cells.iter().map(|c| c.height).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Datapoint;
    use tempfile::tempdir;

    fn sample_grid() -> Grid {
        let mut grid = Grid::autogenerated(2, None, 1, None, None).unwrap();
        grid.add_point(Datapoint::new(0, "a", 0.8, 0.8, vec![1.0])).unwrap();
        grid.add_point(Datapoint::new(1, "b", 0.2, 0.2, vec![2.0])).unwrap();
        grid.set_mountains([(3, 0.75)]).unwrap();
        grid
    }

    #[test]
    fn test_capture() {
        let snapshot = GridSnapshot::capture(&sample_grid());
        assert_eq!(snapshot.cells.len(), 4);
        assert_eq!(snapshot.cells[3].row, 1);
        assert_eq!(snapshot.cells[3].col, 1);
        assert_eq!(snapshot.cells[3].point_count, 1);
        assert_eq!(snapshot.max_height(), 0.75);

        assert_eq!(snapshot.points[0].label, "a");
        assert_eq!(snapshot.points[0].owner, Some(3));
        assert_eq!(snapshot.points[1].owner, Some(0));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.json");
        let snapshot = GridSnapshot::capture(&sample_grid());
        snapshot.save(&path).unwrap();

        let loaded = GridSnapshot::load(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            GridSnapshot::load(&path),
            Err(TopoError::Serialization(_))
        ));
        assert!(matches!(
            GridSnapshot::load(dir.path().join("missing.json")),
            Err(TopoError::FileNotFound(_))
        ));
    }
}
