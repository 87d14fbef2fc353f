//! Height optimization.
//!
//! The local error of a cell is a sum of squares that are quadratic in the
//! cell's height, so its derivative is a cubic. The real roots of that cubic
//! are the candidate heights.

use crate::error::Result;
use crate::grid::cell::{squared_distance, CellId};
use crate::grid::Grid;
use log::{debug, warn};
use std::f64::consts::PI;

/// Coefficients below this (relative to the largest) are treated as zero.
const COEFFICIENT_EPSILON: f64 = 1e-14;

/// Discriminants within this band count as repeated roots.
const DISCRIMINANT_EPSILON: f64 = 1e-14;

/// Newton steps used to polish closed-form roots.
const POLISH_STEPS: usize = 3;

/// Real roots of `a x³ + b x² + c x + d`.
///
/// Uses the closed form on the depressed cubic (Cardano for one real root,
/// the trigonometric form for three) and polishes each root with Newton
/// steps. Falls back to the quadratic or linear case when the leading
/// coefficients vanish. Repeated roots are reported once per multiplicity
/// class, complex roots are dropped.
pub fn real_roots(coefficients: [f64; 4]) -> Vec<f64> {
    let [a, b, c, d] = coefficients;
    let magnitude = coefficients.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if magnitude == 0.0 {
        return Vec::new();
    }
    let negligible = |v: f64| v.abs() <= COEFFICIENT_EPSILON * magnitude;

    if negligible(a) {
        return quadratic_roots(b, c, d, &negligible);
    }

    let (b, c, d) = (b / a, c / a, d / a);
    let shift = b / 3.0;
    let p = c - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c / 3.0 + d;
    let disc = (q / 2.0).powi(2) + (p / 3.0).powi(3);
    let tolerance = DISCRIMINANT_EPSILON * (1.0 + (q / 2.0).powi(2) + (p / 3.0).abs().powi(3));

    let depressed: Vec<f64> = if disc > tolerance {
        let s = disc.sqrt();
        vec![(-q / 2.0 + s).cbrt() + (-q / 2.0 - s).cbrt()]
    } else if disc < -tolerance {
        let m = 2.0 * (-p / 3.0).sqrt();
        let arg = ((3.0 * q) / (2.0 * p) * (-3.0 / p).sqrt()).clamp(-1.0, 1.0);
        let theta = arg.acos() / 3.0;
        (0..3)
            .map(|k| m * (theta - 2.0 * PI * k as f64 / 3.0).cos())
            .collect()
    } else if p.abs() <= DISCRIMINANT_EPSILON {
        vec![0.0]
    } else {
        vec![3.0 * q / p, -3.0 * q / (2.0 * p)]
    };

    let mut roots: Vec<f64> = depressed
        .into_iter()
        .map(|t| polish(t - shift, 1.0, b, c, d))
        .collect();
    roots.sort_by(|x, y| x.total_cmp(y));
    roots
}

fn quadratic_roots(a: f64, b: f64, c: f64, negligible: &dyn Fn(f64) -> bool) -> Vec<f64> {
    if negligible(a) {
        if negligible(b) {
            return Vec::new();
        }
        return vec![-c / b];
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    // Numerically stable form
    let q = -0.5 * (b + b.signum() * disc.sqrt());
    if q == 0.0 {
        return vec![0.0];
    }
    let mut roots = vec![q / a, c / q];
    roots.sort_by(|x, y| x.total_cmp(y));
    roots.dedup();
    roots
}

/// Newton iterations on `a x³ + b x² + c x + d`, keeping the best estimate.
fn polish(mut x: f64, a: f64, b: f64, c: f64, d: f64) -> f64 {
    let eval = |x: f64| ((a * x + b) * x + c) * x + d;
    let deriv = |x: f64| (3.0 * a * x + 2.0 * b) * x + c;

    for _ in 0..POLISH_STEPS {
        let fx = eval(x);
        let dfx = deriv(x);
        if fx == 0.0 || dfx == 0.0 {
            break;
        }
        let next = x - fx / dfx;
        if !next.is_finite() || eval(next).abs() >= fx.abs() {
            break;
        }
        x = next;
    }
    x
}

impl Grid {
    /// Height that minimizes the local error of a cell.
    ///
    /// Returns 0 when no direct neighbour owns a point. Roots below
    /// `height_floor` are only considered when no root reaches it.
    pub fn calc_mountain_height(&self, id: CellId, height_floor: f64) -> Result<f64> {
        let cell = self.get_cell(id)?;

        let weight: usize = cell
            .direct_neighbours
            .iter()
            .map(|&n| self.cells[n].point_count())
            .sum();
        if weight == 0 {
            return Ok(0.0);
        }

        let scale = self.error_scale(cell);
        let w = self.cellwidth;
        let n = cell.direct_neighbours.len() as f64;

        let (mut sum_h, mut sum_h2, mut sum_h3, mut sum_r, mut sum_hr) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for &nb in &cell.direct_neighbours {
            let neighbour = &self.cells[nb];
            let h = neighbour.height;
            let r = scale * squared_distance(&cell.representative, &neighbour.representative).sqrt();
            sum_h += h;
            sum_h2 += h * h;
            sum_h3 += h * h * h;
            sum_r += r;
            sum_hr += h * r;
        }

        let a = 4.0 * n;
        let b = -12.0 * sum_h;
        let c = 4.0 * w * n - 4.0 * sum_r + 12.0 * sum_h2;
        let d = -4.0 * w * sum_h + 4.0 * sum_hr - 4.0 * sum_h3;

        let roots = real_roots([a, b, c, d]);
        debug!("Cell {}: roots {:?}", id, roots);

        let mut candidates: Vec<f64> = roots.iter().copied().filter(|r| *r >= height_floor).collect();
        if candidates.is_empty() {
            warn!(
                "Cell {}: no root at or above {}, evaluating all roots {:?}",
                id, height_floor, roots
            );
            candidates = roots;
        }

        let mut best: Option<(f64, f64)> = None;
        for root in candidates {
            let error = self.calc_localerror(id, Some(root))?;
            match best {
                Some((_, e)) if e <= error => {}
                _ => best = Some((root, error)),
            }
        }

        Ok(best.map(|(root, _)| root).unwrap_or(cell.height))
    }
}
