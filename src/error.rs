//! Error types for the topographic grid engine.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for grid refinement and evaluation.
#[derive(Error, Debug)]
pub enum TopoError {
    /// Invalid grid shape, dimension or refinement parameter.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A cell id outside the lattice was requested.
    #[error("Cell not found: {0}")]
    CellNotFound(usize),

    /// A 2D distance was requested for a non-adjacent pair that is not in the
    /// source cell's cached neighbourhood.
    #[error("Distance between cell {from} and cell {to} is not cached; compute the neighbourhood first")]
    DistanceNotCached {
        /// The cell whose neighbourhood was searched.
        from: usize,
        /// The cell that was not found in it.
        to: usize,
    },

    /// A point has no owning cell.
    #[error("Point {0} has no owning cell")]
    PointWithoutOwner(usize),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV input.
    #[error("Parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number in the source file.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Index out of bounds.
    #[error("Index out of bounds: {index} >= {max}")]
    IndexOutOfBounds {
        /// The index that was out of bounds.
        index: usize,
        /// The maximum allowed index.
        max: usize,
    },

    /// Empty input.
    #[error("Empty input: {0}")]
    EmptyInput(String),
}

/// Result type alias for grid operations.
pub type Result<T> = std::result::Result<T, TopoError>;

impl From<serde_json::Error> for TopoError {
    fn from(err: serde_json::Error) -> Self {
        TopoError::Serialization(err.to_string())
    }
}
