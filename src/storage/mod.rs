//! File formats: input and refined CSVs, distance matrices, grid snapshots,
//! and seeded synthetic datasets.

mod csv;
mod snapshot;
mod synthetic;

pub use csv::{
    load_distance_matrix, load_refined_points, write_distance_matrix, write_refined_csv, Dataset,
    Record,
};
pub use snapshot::{CellSnapshot, GridSnapshot, PointSnapshot, SNAPSHOT_VERSION};
pub use synthetic::synthetic_blobs;
