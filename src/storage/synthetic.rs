//! Seeded synthetic datasets: gaussian blobs in feature space whose first two
//! features, scaled into the unit square, serve as the initial 2D embedding.

use crate::error::{Result, TopoError};
use crate::storage::{Dataset, Record};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Cluster centers are drawn uniformly from `[0, CENTER_RANGE)` per feature.
const CENTER_RANGE: f64 = 10.0;

/// Standard deviation of every blob.
const BLOB_SPREAD: f64 = 0.5;

/// Generates `n` points around `clusters` gaussian centers in `dimension` features.
///
/// Points are assigned to clusters round-robin. The same seed always yields
/// the same dataset.
pub fn synthetic_blobs(n: usize, clusters: usize, dimension: usize, seed: u64) -> Result<Dataset> {
    if n == 0 {
        return Err(TopoError::EmptyInput("cannot generate zero points".to_string()));
    }
    if clusters == 0 {
        return Err(TopoError::Config("cluster count must be positive".to_string()));
    }
    if dimension < 2 {
        return Err(TopoError::Config(format!(
            "synthetic data needs at least 2 features, got {}",
            dimension
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0, BLOB_SPREAD).map_err(|e| TopoError::Config(e.to_string()))?;

    let centers: Vec<Vec<f64>> = (0..clusters)
        .map(|_| (0..dimension).map(|_| rng.gen_range(0.0..CENTER_RANGE)).collect())
        .collect();

    let features: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            centers[i % clusters]
                .iter()
                .map(|c| c + normal.sample(&mut rng))
                .collect()
        })
        .collect();

    let xs = unit_scale(features.iter().map(|f| f[0]));
    let ys = unit_scale(features.iter().map(|f| f[1]));

    let records = features
        .into_iter()
        .enumerate()
        .map(|(i, features)| Record {
            label: i.to_string(),
            x: xs[i],
            y: ys[i],
            features,
        })
        .collect();

    Dataset::from_records(records)
}

/// Min-max scales values into `[0, 1]`. A constant column maps to 0.5.
fn unit_scale<I: Iterator<Item = f64>>(values: I) -> Vec<f64> {
    let values: Vec<f64> = values.collect();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= 0.0 {
        return vec![0.5; values.len()];
    }
    values.into_iter().map(|v| (v - min) / range).collect()
}
