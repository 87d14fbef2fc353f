//! Evaluation of a refined grid.
//!
//! - **Geodesic**: all-pairs shortest paths over the cell graph (geodesic.rs)
//! - **Preservation**: ε-neighbourhood precision and recall (preservation.rs)
//! - **Distortion**: deviation of normalized pairwise distances (distortion.rs)

mod distortion;
mod geodesic;
mod preservation;

pub use distortion::{distance_distortion, distortion_from, DistortionReport};
pub use geodesic::{floyd_warshall, floyd_warshall_with_progress, seed_distances, UNREACHABLE};
pub use preservation::{
    calc_neighborhood_preservation, preservation_from, PairwiseDistances, PreservationReport,
    NEIGHBOURHOOD_FRACTION,
};
