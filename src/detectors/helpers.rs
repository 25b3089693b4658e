//! Shared leaf primitives for chart pattern detection
//!
//! Every detector is built from the three functions here: peak/trough
//! extraction with separation and prominence constraints, support/resistance
//! estimation from extremum sets, and ordinary least-squares trend fitting.
//! All three fail fast on malformed input and never substitute defaults.

use std::cmp::Ordering;

use crate::{PatternError, Result};

// ============================================================
// DEFAULT PARAMETERS
// ============================================================

/// Separation used by the coarsest extremum scan.
pub const DEFAULT_SEPARATION: usize = 10;
/// Separation every shape detector passes for its per-window scans.
pub const SHAPE_SEPARATION: usize = 5;
/// Minimum prominence as a fraction of the window's maximum close.
pub const DEFAULT_PROMINENCE_FRACTION: f64 = 0.02;
/// Calendar context added around a shape pattern's boundary extrema.
pub const SHAPE_DATE_CONTEXT: usize = 5;

// ============================================================
// EXTREMUM EXTRACTION
// ============================================================

/// Find peak and trough indices in `values`.
///
/// A position qualifies as a peak when it is a local maximum, survives the
/// separation filter (no kept higher maximum strictly closer than
/// `separation`), and its prominence is at least
/// `prominence_fraction * max(values)`. Troughs are found by negating the
/// series and reapplying the peak rule; the prominence threshold uses the
/// maximum of the original series in both passes.
///
/// Both index sequences are strictly increasing; either may be empty.
/// Series edges never qualify. Equal-height plateaus yield their midpoint.
///
/// # Errors
///
/// `InvalidInput` for an empty series, non-finite samples, a zero
/// separation, or a negative/non-finite prominence fraction.
pub fn find_extrema(
    values: &[f64],
    separation: usize,
    prominence_fraction: f64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if values.is_empty() {
        return Err(PatternError::InvalidInput(
            "series must contain at least one sample",
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(PatternError::InvalidInput(
            "series contains non-finite samples",
        ));
    }
    if separation == 0 {
        return Err(PatternError::InvalidInput("separation must be at least 1"));
    }
    if !prominence_fraction.is_finite() || prominence_fraction < 0.0 {
        return Err(PatternError::InvalidInput(
            "prominence fraction must be finite and non-negative",
        ));
    }

    let series_max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let threshold = prominence_fraction * series_max;

    let peaks = select_extrema(values, separation, threshold);
    let negated: Vec<f64> = values.iter().map(|v| -v).collect();
    let troughs = select_extrema(&negated, separation, threshold);

    Ok((peaks, troughs))
}

fn select_extrema(values: &[f64], separation: usize, min_prominence: f64) -> Vec<usize> {
    let mut candidates = local_maxima(values);
    filter_by_separation(&mut candidates, values, separation);
    candidates.retain(|&p| prominence(values, p) >= min_prominence);
    candidates
}

/// Interior local maxima; a flat top contributes its floor-midpoint.
fn local_maxima(values: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if values.len() < 3 {
        return peaks;
    }
    let last = values.len() - 1;
    let mut i = 1;
    while i < last {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead < last && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Keep the highest candidate of any cluster closer than `separation`,
/// processing candidates from highest value down. Candidates exactly
/// `separation` apart both survive.
fn filter_by_separation(peaks: &mut Vec<usize>, values: &[f64], separation: usize) {
    if peaks.len() < 2 {
        return;
    }
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| {
        values[peaks[a]]
            .partial_cmp(&values[peaks[b]])
            .unwrap_or(Ordering::Equal)
    });

    let mut keep = vec![true; peaks.len()];
    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < separation {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < separation {
            keep[k] = false;
            k += 1;
        }
    }

    let mut idx = 0;
    peaks.retain(|_| {
        let kept = keep[idx];
        idx += 1;
        kept
    });
}

/// Height of a peak above the lowest point separating it from a strictly
/// higher sample on each side (or the series edge).
fn prominence(values: &[f64], peak: usize) -> f64 {
    let height = values[peak];

    let mut left_min = height;
    let mut i = peak as isize;
    while i >= 0 && values[i as usize] <= height {
        left_min = left_min.min(values[i as usize]);
        i -= 1;
    }

    let mut right_min = height;
    let mut i = peak;
    while i < values.len() && values[i] <= height {
        right_min = right_min.min(values[i]);
        i += 1;
    }

    height - left_min.max(right_min)
}

// ============================================================
// SUPPORT / RESISTANCE
// ============================================================

/// Support and resistance levels from extremum sets over the close column.
///
/// Resistance is the mean close at the peak indices, support the mean close
/// at the trough indices; `None` for an empty index set. Deliberately
/// unweighted with no outlier rejection: the detectors gate false positives
/// at the shape level instead.
///
/// Indices must be in range for `close`; callers pass the output of
/// [`find_extrema`] over the same slice.
pub fn support_resistance(
    close: &[f64],
    peaks: &[usize],
    troughs: &[usize],
) -> (Option<f64>, Option<f64>) {
    (mean_at(close, troughs), mean_at(close, peaks))
}

fn mean_at(values: &[f64], indices: &[usize]) -> Option<f64> {
    if indices.is_empty() {
        return None;
    }
    let sum: f64 = indices.iter().map(|&i| values[i]).sum();
    Some(sum / indices.len() as f64)
}

/// Arithmetic mean of a non-empty slice.
pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

// ============================================================
// LINEAR TREND
// ============================================================

/// An ordinary least-squares line fitted against the 0-based sample index.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    /// The line evaluated at every sample index.
    pub fitted: Vec<f64>,
}

impl TrendLine {
    /// Value of the fitted line at the final sample.
    #[inline]
    pub fn end_value(&self) -> f64 {
        self.fitted.last().copied().unwrap_or(self.intercept)
    }
}

/// Fit a least-squares line to `values` against their 0-based index.
///
/// # Errors
///
/// `InsufficientData` below 2 samples, `InvalidInput` on non-finite ones.
pub fn linear_trend(values: &[f64]) -> Result<TrendLine> {
    if values.len() < 2 {
        return Err(PatternError::InsufficientData {
            need: 2,
            got: values.len(),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(PatternError::InvalidInput(
            "series contains non-finite samples",
        ));
    }

    let n = values.len() as f64;
    let x_mean = (values.len() - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    let fitted = (0..values.len())
        .map(|i| intercept + slope * i as f64)
        .collect();

    Ok(TrendLine {
        slope,
        intercept,
        fitted,
    })
}

// ============================================================
// TESTS
// ============================================================
