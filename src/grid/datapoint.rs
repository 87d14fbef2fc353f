//! A single observation placed on the grid.

use serde::{Deserialize, Serialize};

/// Index of a point in the grid's point arena.
pub type PointId = usize;

/// One row of the input dataset.
///
/// The original features and the initial 2D placement never change. The
/// current placement moves with the cell that owns the point, and every move
/// is recorded in `shifts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datapoint {
    /// Position of the row in the input file.
    pub row: usize,
    /// The index column of the input row, kept verbatim.
    pub label: String,
    /// Original high-dimensional feature vector.
    pub data: Vec<f64>,
    /// Initial x coordinate from the reduction.
    pub x_org: f64,
    /// Initial y coordinate from the reduction.
    pub y_org: f64,
    /// Current x coordinate.
    pub x_axis: f64,
    /// Current y coordinate.
    pub y_axis: f64,
    /// Every (dx, dy) translation applied so far, oldest first.
    pub shifts: Vec<(f64, f64)>,
    /// Cell that currently owns the point.
    pub owner: Option<usize>,
    /// Cell that received the point at initialization.
    pub origin: Option<usize>,
}

impl Datapoint {
    /// Creates an unowned point at its initial placement.
    pub fn new(row: usize, label: impl Into<String>, x: f64, y: f64, data: Vec<f64>) -> Self {
        Self {
            row,
            label: label.into(),
            data,
            x_org: x,
            y_org: y,
            x_axis: x,
            y_axis: y,
            shifts: Vec::new(),
            owner: None,
            origin: None,
        }
    }

    /// Returns the current coordinates.
    #[inline]
    pub fn coordinates(&self) -> (f64, f64) {
        (self.x_axis, self.y_axis)
    }

    /// Moves the point from the cell centered at `old_center` to the cell
    /// centered at `new_center`, keeping its offset from the center.
    pub fn add_shift(&mut self, new_center: (f64, f64), old_center: (f64, f64)) {
        let new_x = new_center.0 + (self.x_axis - old_center.0);
        let new_y = new_center.1 + (self.y_axis - old_center.1);

        self.shifts.push((new_x - self.x_axis, new_y - self.y_axis));
        self.x_axis = new_x;
        self.y_axis = new_y;
    }

    /// Total translation applied since initialization.
    pub fn total_shift(&self) -> (f64, f64) {
        self.shifts
            .iter()
            .fold((0.0, 0.0), |(ax, ay), (dx, dy)| (ax + dx, ay + dy))
    }

    /// Euclidean distance between the current placements of two points.
    #[inline]
    pub fn planar_distance(&self, other: &Datapoint) -> f64 {
        ((self.x_axis - other.x_axis).powi(2) + (self.y_axis - other.y_axis).powi(2)).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_point() {
        let p = Datapoint::new(3, "4", 0.25, 0.75, vec![1.0, 2.0]);
        assert_eq!(p.row, 3);
        assert_eq!(p.label, "4");
        assert_eq!(p.coordinates(), (0.25, 0.75));
        assert_eq!((p.x_org, p.y_org), (0.25, 0.75));
        assert!(p.shifts.is_empty());
        assert!(p.owner.is_none());
    }

    #[test]
    fn test_add_shift_keeps_offset() {
        let mut p = Datapoint::new(0, "0", 0.3, 0.2, vec![0.0]);
        // From the cell centered at (0.25, 0.25) to the one at (0.75, 0.25).
        p.add_shift((0.75, 0.25), (0.25, 0.25));

        assert!((p.x_axis - 0.8).abs() < 1e-12);
        assert!((p.y_axis - 0.2).abs() < 1e-12);
        assert_eq!(p.shifts.len(), 1);
        assert!((p.shifts[0].0 - 0.5).abs() < 1e-12);
        assert!(p.shifts[0].1.abs() < 1e-12);

        // The initial placement is untouched.
        assert_eq!((p.x_org, p.y_org), (0.3, 0.2));
    }

    #[test]
    fn test_total_shift() {
        let mut p = Datapoint::new(0, "0", 0.1, 0.1, vec![0.0]);
        p.add_shift((0.5, 0.5), (0.25, 0.25));
        p.add_shift((0.25, 0.5), (0.5, 0.5));
        let (dx, dy) = p.total_shift();
        assert!((dx - 0.0).abs() < 1e-12);
        assert!((dy - 0.25).abs() < 1e-12);
        assert!((p.x_axis - p.x_org - dx).abs() < 1e-12);
    }

    #[test]
    fn test_planar_distance() {
        let a = Datapoint::new(0, "0", 0.0, 0.0, vec![]);
        let b = Datapoint::new(1, "1", 0.3, 0.4, vec![]);
        assert!((a.planar_distance(&b) - 0.5).abs() < 1e-12);
    }
}
