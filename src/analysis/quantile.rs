//! Interpolated quantiles over order statistics.
//!
//! Samples are ordered with IEEE total ordering, so infinities take part
//! in the ranking instead of being dropped. A NaN anywhere in a sample
//! makes every quantile of it NaN.

use crate::models::{QuantileBand, QuantileLevel};

/// Sort a sample in place, infinities at the ends.
pub fn sort_sample(sample: &mut [f64]) {
    sample.sort_by(|a, b| a.total_cmp(b));
}

/// Quantile of an ascending sample with linear interpolation.
///
/// For `n` values and level `p` the target position is `h = p * (n - 1)`;
/// the result interpolates between the order statistics at `floor(h)` and
/// `ceil(h)`. Returns `None` for an empty sample and NaN for a sample
/// holding NaN.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    if sorted.iter().any(|v| v.is_nan()) {
        return Some(f64::NAN);
    }
    let p = p.clamp(0.0, 1.0);
    let h = p * (sorted.len() - 1) as f64;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let w = h - lo as f64;
    let (a, b) = (sorted[lo], sorted[hi]);

    if lo == hi || w == 0.0 || a == b {
        return Some(a);
    }
    if a.is_infinite() && b.is_infinite() {
        // -inf below, +inf above: take the nearer neighbour.
        return Some(if w < 0.5 { a } else { b });
    }
    if b.is_infinite() {
        return Some(b);
    }
    if a.is_infinite() {
        return Some(a);
    }
    Some(a + (b - a) * w)
}

/// All seven levels of an ascending sample.
pub fn band_sorted(sorted: &[f64]) -> Option<QuantileBand> {
    let mut values = [0.0; 7];
    for level in QuantileLevel::ALL {
        values[level.index()] = quantile_sorted(sorted, level.fraction())?;
    }
    Some(QuantileBand { values })
}

/// Arithmetic mean; `None` for an empty sample.
pub fn mean(sample: &[f64]) -> Option<f64> {
    if sample.is_empty() {
        return None;
    }
    Some(sample.iter().sum::<f64>() / sample.len() as f64)
}
