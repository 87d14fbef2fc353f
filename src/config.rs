//! Configuration for grid construction and refinement.

use crate::error::{Result, TopoError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Lowest root accepted as a candidate height before falling back to all roots.
pub const DEFAULT_HEIGHT_FLOOR: f64 = -0.1;

/// Main configuration for a refinement run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Lattice configuration.
    pub grid: GridConfig,

    /// Refinement loop configuration.
    pub refinement: RefinementConfig,

    /// Input and output locations.
    pub io: IoConfig,
}

impl Config {
    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TopoError::FileNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section, reporting the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        self.refinement.validate()
    }
}

/// Lattice configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Number of rows. The cell width is `1 / rows`.
    /// Default: 22.
    pub rows: usize,

    /// Number of columns.
    /// Default: None (same as rows).
    pub columns: Option<usize>,

    /// Lower-left x coordinate of the lattice.
    /// Default: None (0.0).
    pub start_x: Option<f64>,

    /// Lower-left y coordinate of the lattice.
    /// Default: None (0.0).
    pub start_y: Option<f64>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: 22,
            columns: None,
            start_x: None,
            start_y: None,
        }
    }
}

impl GridConfig {
    /// Returns the effective number of columns.
    #[inline]
    pub fn columns(&self) -> usize {
        self.columns.unwrap_or(self.rows)
    }

    /// Returns the total number of cells.
    #[inline]
    pub fn total_cells(&self) -> usize {
        self.rows * self.columns()
    }

    fn validate(&self) -> Result<()> {
        if self.rows == 0 {
            return Err(TopoError::Config("rows must be positive".to_string()));
        }
        if self.columns() == 0 {
            return Err(TopoError::Config("columns must be positive".to_string()));
        }
        Ok(())
    }
}

/// Refinement loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Number of iterations. The loop never stops early.
    /// Default: 10.
    pub iterations: usize,

    /// Neighbourhood search radius in multiples of the cell width.
    /// Default: 5.0.
    pub max_distance: f64,

    /// Percentage of cells (by error and by ICV) touched per iteration.
    /// Default: 75.0.
    pub cut_list_at: f64,

    /// Roots below this value are only considered when no root reaches it.
    /// Default: -0.1.
    pub height_floor: f64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            max_distance: 5.0,
            cut_list_at: 75.0,
            height_floor: DEFAULT_HEIGHT_FLOOR,
        }
    }
}

impl RefinementConfig {
    fn validate(&self) -> Result<()> {
        if !(self.max_distance > 0.0) {
            return Err(TopoError::Config(format!(
                "max_distance must be positive, got {}",
                self.max_distance
            )));
        }
        if !(0.0..=100.0).contains(&self.cut_list_at) {
            return Err(TopoError::Config(format!(
                "cut_list_at must be a percentage in [0, 100], got {}",
                self.cut_list_at
            )));
        }
        if !self.height_floor.is_finite() {
            return Err(TopoError::Config("height_floor must be finite".to_string()));
        }
        Ok(())
    }
}

/// Input and output locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Input CSV: `index, x, y, features...`, no header.
    pub input: Option<PathBuf>,

    /// Output CSV: `index, dred1, dred2, height, features...`, no header.
    pub output: Option<PathBuf>,

    /// Optional JSON snapshot of the refined grid for renderers.
    pub snapshot: Option<PathBuf>,

    /// Optional geodesic distance matrix CSV written by the evaluation pass.
    pub distance_matrix: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.grid.rows, 22);
        assert_eq!(config.grid.columns(), 22);
        assert_eq!(config.grid.total_cells(), 484);
        assert_eq!(config.refinement.iterations, 10);
        assert_eq!(config.refinement.height_floor, DEFAULT_HEIGHT_FLOOR);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_shape_rejected() {
        let mut config = Config::default();
        config.grid.rows = 0;
        assert!(matches!(config.validate(), Err(TopoError::Config(_))));

        let mut config = Config::default();
        config.grid.columns = Some(0);
        assert!(matches!(config.validate(), Err(TopoError::Config(_))));
    }

    #[test]
    fn test_invalid_refinement_rejected() {
        let mut config = Config::default();
        config.refinement.cut_list_at = 120.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.refinement.max_distance = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"grid": {{"rows": 8, "columns": 4}}, "refinement": {{"iterations": 3}}}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.grid.rows, 8);
        assert_eq!(config.grid.columns(), 4);
        assert_eq!(config.refinement.iterations, 3);
        assert_eq!(config.refinement.cut_list_at, 75.0);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/definitely/not/here.json");
        assert!(matches!(result, Err(TopoError::FileNotFound(_))));
    }
}
