use itertools::{Itertools, MinMaxResult};
use ndarray::{arr1, Array1};
use ndarray_stats::QuantileExt;

pub fn opt_absolute_diff_vect(a: &[f64], b: &[f64]) -> Array1<f64> {
    let c: Array1<f64> = arr1(b) - &arr1(a);
    c.mapv(f64::abs)
}

/// Largest absolute difference; `f64::INFINITY` if some difference is NaN.
pub fn max_absolute_difference(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let c = opt_absolute_diff_vect(a, b);
    if c.iter().any(|x| x.is_nan()) {
        return f64::INFINITY;
    }
    c.max().copied().unwrap_or(f64::INFINITY)
}

/// Largest difference relative to the new value. Entries where both vectors
/// are zero or equal infinities do not count.
pub fn max_relative_difference(old: &[f64], new: &[f64]) -> f64 {
    if old.is_empty() {
        return 0.0;
    }
    let c: Array1<f64> = Array1::from_iter(old.iter().zip(new.iter()).map(|(o, n)| {
        if o == n {
            0.0
        } else if *n == 0.0 {
            (n - o).abs()
        } else {
            ((n - o) / n).abs()
        }
    }));
    if c.iter().any(|x| x.is_nan()) {
        return f64::INFINITY;
    }
    c.max().copied().unwrap_or(f64::INFINITY)
}

pub fn equal_modulo_precision(old: &[f64], new: &[f64], precision: f64, relative: bool) -> bool {
    let diff = if relative { max_relative_difference(old, new) } else { max_absolute_difference(old, new) };
    diff <= precision
}

/// Smallest and largest entry of a non-empty slice.
pub fn min_max(values: &[f64]) -> (f64, f64) {
    match values.iter().copied().minmax() {
        MinMaxResult::NoElements => (0.0, 0.0),
        MinMaxResult::OneElement(x) => (x, x),
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
    }
}
