//! Peak/trough shape detectors
//!
//! Cup with handle, head & shoulders, and the double/triple top/bottom
//! family. Each slides its fixed window one bar at a time, re-extracting
//! peaks and troughs from the window's close column and testing the
//! pattern's geometry against fixed tolerances. Windows are recomputed
//! independently and overlapping matches are reported as-is, so one
//! formation can surface repeatedly as the window slides across it.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::helpers::{
    find_extrema, support_resistance, DEFAULT_PROMINENCE_FRACTION, SHAPE_DATE_CONTEXT,
    SHAPE_SEPARATION,
};
use crate::{
    params::{get_period, get_ratio, ParamMeta, ParameterizedDetector},
    MatchDetail, PatternDetector, PatternKind, PatternMatch, Period, PriceSeries, Ratio, Result,
};

impl_with_defaults!(
    CupWithHandleDetector,
    HeadAndShouldersDetector,
    DoubleTopDetector,
    DoubleBottomDetector,
    TripleTopDetector,
    TripleBottomDetector,
);

/// Calendar bounds for a shape pattern: its boundary extrema widened by the
/// standard context, clamped to the window.
fn context_dates(dates: &[NaiveDate], first: usize, last: usize) -> (NaiveDate, NaiveDate) {
    let start = first.saturating_sub(SHAPE_DATE_CONTEXT);
    let end = (last + SHAPE_DATE_CONTEXT).min(dates.len() - 1);
    (dates[start], dates[end])
}

// ============================================================
// CUP WITH HANDLE
// ============================================================

/// Cup with Handle: two rim peaks of similar height, a deep rounded trough
/// between them, then a short dip-and-recovery handle after the second rim.
#[derive(Debug, Clone)]
pub struct CupWithHandleDetector {
    pub window: usize,
    /// Maximum relative gap between the two rim peaks.
    pub rim_tolerance: f64,
    /// The cup trough must sit below this fraction of the lower rim.
    pub depth_fraction: f64,
    pub separation: usize,
    pub prominence_fraction: f64,
}

impl Default for CupWithHandleDetector {
    fn default() -> Self {
        Self {
            window: 120,
            rim_tolerance: 0.05,
            depth_fraction: 0.90,
            separation: SHAPE_SEPARATION,
            prominence_fraction: DEFAULT_PROMINENCE_FRACTION,
        }
    }
}

impl PatternDetector for CupWithHandleDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::CupWithHandle
    }

    fn window(&self) -> usize {
        self.window
    }

    fn scan(&self, series: &PriceSeries) -> Result<Vec<PatternMatch>> {
        let mut out = Vec::new();
        let n = series.len();
        if n < self.window {
            return Ok(out);
        }
        let close_col = series.require_close()?;

        for start in 0..n - self.window {
            let end = start + self.window;
            let close = &close_col[start..end];
            let (peaks, troughs) = find_extrema(close, self.separation, self.prominence_fraction)?;
            if peaks.len() < 2 || troughs.is_empty() {
                continue;
            }

            let first_rim = close[peaks[0]];
            let last_idx = peaks[peaks.len() - 1];
            let last_rim = close[last_idx];
            if (first_rim - last_rim).abs() / first_rim >= self.rim_tolerance {
                continue;
            }

            let bottom = close[troughs[troughs.len() / 2]];
            if bottom >= self.depth_fraction * first_rim.min(last_rim) {
                continue;
            }

            // handle: at least 10 bars after the second rim, dipping by bar 5
            // and recovering above the dip into the window end
            if last_idx >= self.window - 10 {
                continue;
            }
            let handle = &close[last_idx..];
            if !(handle[0] > handle[5] && handle[5] < handle[handle.len() - 1]) {
                continue;
            }

            let (support, resistance) = support_resistance(close, &peaks, &troughs);
            out.push(PatternMatch {
                ticker: series.ticker.clone(),
                kind: PatternKind::CupWithHandle,
                start_date: series.dates[start],
                end_date: series.dates[end - 1],
                support,
                resistance,
                window_start: start,
                window_end: end,
                detail: MatchDetail::Extrema { peaks, troughs },
            });
        }

        Ok(out)
    }

    fn validate_config(&self) -> Result<()> {
        Period::new(self.window)?;
        Period::new(self.separation)?;
        Ratio::new(self.rim_tolerance)?;
        Ratio::new(self.depth_fraction)?;
        Ratio::new(self.prominence_fraction)?;
        Ok(())
    }
}

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

/// Head and Shoulders: three consecutive peaks with the middle one clearly
/// above both flanks and the flanks at similar heights.
#[derive(Debug, Clone)]
pub struct HeadAndShouldersDetector {
    pub window: usize,
    /// The head must exceed each shoulder by this fraction.
    pub head_margin: f64,
    /// Maximum relative gap between the two shoulders.
    pub shoulder_tolerance: f64,
    pub separation: usize,
    pub prominence_fraction: f64,
}

impl Default for HeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            window: 120,
            head_margin: 0.05,
            shoulder_tolerance: 0.10,
            separation: SHAPE_SEPARATION,
            prominence_fraction: DEFAULT_PROMINENCE_FRACTION,
        }
    }
}

impl PatternDetector for HeadAndShouldersDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::HeadAndShoulders
    }

    fn window(&self) -> usize {
        self.window
    }

    fn scan(&self, series: &PriceSeries) -> Result<Vec<PatternMatch>> {
        let mut out = Vec::new();
        let n = series.len();
        if n < self.window {
            return Ok(out);
        }
        let close_col = series.require_close()?;

        for start in 0..n - self.window {
            let end = start + self.window;
            let close = &close_col[start..end];
            let dates = &series.dates[start..end];
            let (peaks, troughs) = find_extrema(close, self.separation, self.prominence_fraction)?;
            if peaks.len() < 3 || troughs.len() < 2 {
                continue;
            }

            for p in 0..peaks.len() - 2 {
                let left = close[peaks[p]];
                let head = close[peaks[p + 1]];
                let right = close[peaks[p + 2]];

                if !(head > left * (1.0 + self.head_margin)
                    && head > right * (1.0 + self.head_margin))
                {
                    continue;
                }
                if (left - right).abs() / left >= self.shoulder_tolerance {
                    continue;
                }

                // support here is the neckline through the window's troughs
                let (support, resistance) = support_resistance(close, &peaks, &troughs);
                let (start_date, end_date) = context_dates(dates, peaks[p], peaks[p + 2]);
                out.push(PatternMatch {
                    ticker: series.ticker.clone(),
                    kind: PatternKind::HeadAndShoulders,
                    start_date,
                    end_date,
                    support,
                    resistance,
                    window_start: start,
                    window_end: end,
                    detail: MatchDetail::Extrema {
                        peaks: vec![peaks[p], peaks[p + 1], peaks[p + 2]],
                        troughs: troughs.clone(),
                    },
                });
            }
        }

        Ok(out)
    }

    fn validate_config(&self) -> Result<()> {
        Period::new(self.window)?;
        Period::new(self.separation)?;
        Ratio::new(self.head_margin)?;
        Ratio::new(self.shoulder_tolerance)?;
        Ratio::new(self.prominence_fraction)?;
        Ok(())
    }
}

// ============================================================
// DOUBLE TOP / DOUBLE BOTTOM
// ============================================================

/// Double Top: a consecutive peak pair at similar heights with at least one
/// trough strictly between them.
#[derive(Debug, Clone)]
pub struct DoubleTopDetector {
    pub window: usize,
    /// Maximum relative gap between the paired peaks.
    pub tolerance: f64,
    pub separation: usize,
    pub prominence_fraction: f64,
}

impl Default for DoubleTopDetector {
    fn default() -> Self {
        Self {
            window: 60,
            tolerance: 0.03,
            separation: SHAPE_SEPARATION,
            prominence_fraction: DEFAULT_PROMINENCE_FRACTION,
        }
    }
}

impl PatternDetector for DoubleTopDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::DoubleTop
    }

    fn window(&self) -> usize {
        self.window
    }

    fn scan(&self, series: &PriceSeries) -> Result<Vec<PatternMatch>> {
        let mut out = Vec::new();
        let n = series.len();
        if n < self.window {
            return Ok(out);
        }
        let close_col = series.require_close()?;

        for start in 0..n - self.window {
            let end = start + self.window;
            let close = &close_col[start..end];
            let dates = &series.dates[start..end];
            let (peaks, troughs) = find_extrema(close, self.separation, self.prominence_fraction)?;
            if peaks.len() < 2 || troughs.is_empty() {
                continue;
            }

            for p in 0..peaks.len() - 1 {
                let first = close[peaks[p]];
                let second = close[peaks[p + 1]];
                if (first - second).abs() / first >= self.tolerance {
                    continue;
                }

                let between: Vec<usize> = troughs
                    .iter()
                    .copied()
                    .filter(|&t| t > peaks[p] && t < peaks[p + 1])
                    .collect();
                if between.is_empty() {
                    continue;
                }

                let pair = vec![peaks[p], peaks[p + 1]];
                let (support, resistance) = support_resistance(close, &pair, &between);
                let (start_date, end_date) = context_dates(dates, peaks[p], peaks[p + 1]);
                out.push(PatternMatch {
                    ticker: series.ticker.clone(),
                    kind: PatternKind::DoubleTop,
                    start_date,
                    end_date,
                    support,
                    resistance,
                    window_start: start,
                    window_end: end,
                    detail: MatchDetail::Extrema {
                        peaks: pair,
                        troughs: between,
                    },
                });
            }
        }

        Ok(out)
    }

    fn validate_config(&self) -> Result<()> {
        Period::new(self.window)?;
        Period::new(self.separation)?;
        Ratio::new(self.tolerance)?;
        Ratio::new(self.prominence_fraction)?;
        Ok(())
    }
}

/// Double Bottom: the mirror of [`DoubleTopDetector`] on troughs.
#[derive(Debug, Clone)]
pub struct DoubleBottomDetector {
    pub window: usize,
    /// Maximum relative gap between the paired troughs.
    pub tolerance: f64,
    pub separation: usize,
    pub prominence_fraction: f64,
}

impl Default for DoubleBottomDetector {
    fn default() -> Self {
        Self {
            window: 60,
            tolerance: 0.03,
            separation: SHAPE_SEPARATION,
            prominence_fraction: DEFAULT_PROMINENCE_FRACTION,
        }
    }
}

impl PatternDetector for DoubleBottomDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::DoubleBottom
    }

    fn window(&self) -> usize {
        self.window
    }

    fn scan(&self, series: &PriceSeries) -> Result<Vec<PatternMatch>> {
        let mut out = Vec::new();
        let n = series.len();
        if n < self.window {
            return Ok(out);
        }
        let close_col = series.require_close()?;

        for start in 0..n - self.window {
            let end = start + self.window;
            let close = &close_col[start..end];
            let dates = &series.dates[start..end];
            let (peaks, troughs) = find_extrema(close, self.separation, self.prominence_fraction)?;
            if peaks.is_empty() || troughs.len() < 2 {
                continue;
            }

            for t in 0..troughs.len() - 1 {
                let first = close[troughs[t]];
                let second = close[troughs[t + 1]];
                if (first - second).abs() / first >= self.tolerance {
                    continue;
                }

                let between: Vec<usize> = peaks
                    .iter()
                    .copied()
                    .filter(|&p| p > troughs[t] && p < troughs[t + 1])
                    .collect();
                if between.is_empty() {
                    continue;
                }

                let pair = vec![troughs[t], troughs[t + 1]];
                let (support, resistance) = support_resistance(close, &between, &pair);
                let (start_date, end_date) = context_dates(dates, troughs[t], troughs[t + 1]);
                out.push(PatternMatch {
                    ticker: series.ticker.clone(),
                    kind: PatternKind::DoubleBottom,
                    start_date,
                    end_date,
                    support,
                    resistance,
                    window_start: start,
                    window_end: end,
                    detail: MatchDetail::Extrema {
                        peaks: between,
                        troughs: pair,
                    },
                });
            }
        }

        Ok(out)
    }

    fn validate_config(&self) -> Result<()> {
        Period::new(self.window)?;
        Period::new(self.separation)?;
        Ratio::new(self.tolerance)?;
        Ratio::new(self.prominence_fraction)?;
        Ok(())
    }
}

// ============================================================
// TRIPLE TOP / TRIPLE BOTTOM
// ============================================================

/// Triple Top: three consecutive peaks each within a tolerance of the
/// triple's mean, with at least one trough between the first and third.
#[derive(Debug, Clone)]
pub struct TripleTopDetector {
    pub window: usize,
    /// Maximum relative deviation of each peak from the triple's mean.
    pub tolerance: f64,
    pub separation: usize,
    pub prominence_fraction: f64,
}

impl Default for TripleTopDetector {
    fn default() -> Self {
        Self {
            window: 90,
            tolerance: 0.05,
            separation: SHAPE_SEPARATION,
            prominence_fraction: DEFAULT_PROMINENCE_FRACTION,
        }
    }
}

impl PatternDetector for TripleTopDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::TripleTop
    }

    fn window(&self) -> usize {
        self.window
    }

    fn scan(&self, series: &PriceSeries) -> Result<Vec<PatternMatch>> {
        let mut out = Vec::new();
        let n = series.len();
        if n < self.window {
            return Ok(out);
        }
        let close_col = series.require_close()?;

        for start in 0..n - self.window {
            let end = start + self.window;
            let close = &close_col[start..end];
            let dates = &series.dates[start..end];
            let (peaks, troughs) = find_extrema(close, self.separation, self.prominence_fraction)?;
            if peaks.len() < 3 || troughs.len() < 2 {
                continue;
            }

            for p in 0..peaks.len() - 2 {
                let triple = [close[peaks[p]], close[peaks[p + 1]], close[peaks[p + 2]]];
                let avg = (triple[0] + triple[1] + triple[2]) / 3.0;
                if !triple.iter().all(|v| (v - avg).abs() / avg < self.tolerance) {
                    continue;
                }

                let between: Vec<usize> = troughs
                    .iter()
                    .copied()
                    .filter(|&t| t > peaks[p] && t < peaks[p + 2])
                    .collect();
                if between.is_empty() {
                    continue;
                }

                let tops = vec![peaks[p], peaks[p + 1], peaks[p + 2]];
                let (support, resistance) = support_resistance(close, &tops, &between);
                let (start_date, end_date) = context_dates(dates, peaks[p], peaks[p + 2]);
                out.push(PatternMatch {
                    ticker: series.ticker.clone(),
                    kind: PatternKind::TripleTop,
                    start_date,
                    end_date,
                    support,
                    resistance,
                    window_start: start,
                    window_end: end,
                    detail: MatchDetail::Extrema {
                        peaks: tops,
                        troughs: between,
                    },
                });
            }
        }

        Ok(out)
    }

    fn validate_config(&self) -> Result<()> {
        Period::new(self.window)?;
        Period::new(self.separation)?;
        Ratio::new(self.tolerance)?;
        Ratio::new(self.prominence_fraction)?;
        Ok(())
    }
}

/// Triple Bottom: the mirror of [`TripleTopDetector`] on troughs.
#[derive(Debug, Clone)]
pub struct TripleBottomDetector {
    pub window: usize,
    /// Maximum relative deviation of each trough from the triple's mean.
    pub tolerance: f64,
    pub separation: usize,
    pub prominence_fraction: f64,
}

impl Default for TripleBottomDetector {
    fn default() -> Self {
        Self {
            window: 90,
            tolerance: 0.05,
            separation: SHAPE_SEPARATION,
            prominence_fraction: DEFAULT_PROMINENCE_FRACTION,
        }
    }
}

impl PatternDetector for TripleBottomDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::TripleBottom
    }

    fn window(&self) -> usize {
        self.window
    }

    fn scan(&self, series: &PriceSeries) -> Result<Vec<PatternMatch>> {
        let mut out = Vec::new();
        let n = series.len();
        if n < self.window {
            return Ok(out);
        }
        let close_col = series.require_close()?;

        for start in 0..n - self.window {
            let end = start + self.window;
            let close = &close_col[start..end];
            let dates = &series.dates[start..end];
            let (peaks, troughs) = find_extrema(close, self.separation, self.prominence_fraction)?;
            if peaks.len() < 2 || troughs.len() < 3 {
                continue;
            }

            for t in 0..troughs.len() - 2 {
                let triple = [
                    close[troughs[t]],
                    close[troughs[t + 1]],
                    close[troughs[t + 2]],
                ];
                let avg = (triple[0] + triple[1] + triple[2]) / 3.0;
                if !triple.iter().all(|v| (v - avg).abs() / avg < self.tolerance) {
                    continue;
                }

                let between: Vec<usize> = peaks
                    .iter()
                    .copied()
                    .filter(|&p| p > troughs[t] && p < troughs[t + 2])
                    .collect();
                if between.is_empty() {
                    continue;
                }

                let bottoms = vec![troughs[t], troughs[t + 1], troughs[t + 2]];
                let (support, resistance) = support_resistance(close, &between, &bottoms);
                let (start_date, end_date) = context_dates(dates, troughs[t], troughs[t + 2]);
                out.push(PatternMatch {
                    ticker: series.ticker.clone(),
                    kind: PatternKind::TripleBottom,
                    start_date,
                    end_date,
                    support,
                    resistance,
                    window_start: start,
                    window_end: end,
                    detail: MatchDetail::Extrema {
                        peaks: between,
                        troughs: bottoms,
                    },
                });
            }
        }

        Ok(out)
    }

    fn validate_config(&self) -> Result<()> {
        Period::new(self.window)?;
        Period::new(self.separation)?;
        Ratio::new(self.tolerance)?;
        Ratio::new(self.prominence_fraction)?;
        Ok(())
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static DOUBLE_TOP_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "tolerance",
        0.03,
        (0.01, 0.08, 0.01),
        "Maximum relative gap between the paired peaks",
    ),
    ParamMeta::period(
        "window",
        60.0,
        (40.0, 120.0, 10.0),
        "Sliding window length in bars",
    ),
];

static DOUBLE_BOTTOM_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "tolerance",
        0.03,
        (0.01, 0.08, 0.01),
        "Maximum relative gap between the paired troughs",
    ),
    ParamMeta::period(
        "window",
        60.0,
        (40.0, 120.0, 10.0),
        "Sliding window length in bars",
    ),
];

static TRIPLE_TOP_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "tolerance",
        0.05,
        (0.02, 0.10, 0.01),
        "Maximum relative deviation of each peak from the triple's mean",
    ),
    ParamMeta::period(
        "window",
        90.0,
        (60.0, 150.0, 10.0),
        "Sliding window length in bars",
    ),
];

impl ParameterizedDetector for DoubleTopDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_TOP_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            tolerance: get_ratio(params, "tolerance", 0.03)?.get(),
            window: get_period(params, "window", 60)?.get(),
            ..Self::default()
        })
    }

    fn pattern_key() -> &'static str {
        "double_top"
    }
}

impl ParameterizedDetector for DoubleBottomDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_BOTTOM_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            tolerance: get_ratio(params, "tolerance", 0.03)?.get(),
            window: get_period(params, "window", 60)?.get(),
            ..Self::default()
        })
    }

    fn pattern_key() -> &'static str {
        "double_bottom"
    }
}

impl ParameterizedDetector for TripleTopDetector {
    fn param_meta() -> &'static [ParamMeta] {
        TRIPLE_TOP_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            tolerance: get_ratio(params, "tolerance", 0.05)?.get(),
            window: get_period(params, "window", 90)?.get(),
            ..Self::default()
        })
    }

    fn pattern_key() -> &'static str {
        "triple_top"
    }
}
