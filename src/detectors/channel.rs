//! Trend-line (channel) detectors
//!
//! Pennant, corridors, rectangles, and the ascending triangle. Each slides
//! its fixed window one bar at a time, fits least-squares lines to the
//! window's high and low columns, and classifies the pair of slopes.
//! Support/resistance come from the fitted line endpoints (or the column
//! means for the neutral rectangle). As with the shape detectors, windows
//! are recomputed independently and overlapping matches are not merged.

use std::collections::HashMap;

use super::helpers::{linear_trend, mean};
use crate::{
    params::{get_period, get_ratio, ParamMeta, ParameterizedDetector},
    MatchDetail, PatternDetector, PatternKind, PatternMatch, Period, PriceSeries, Ratio, Result,
};

impl_with_defaults!(
    PennantDetector,
    AscendingCorridorDetector,
    DescendingCorridorDetector,
    NeutralRectangleDetector,
    DivergingRectangleDetector,
    AscendingTriangleDetector,
);

/// Absolute slope (price units per bar) below which a line counts as flat,
/// and above which it counts as trending.
const SLOPE_THRESHOLD: f64 = 0.01;

// ============================================================
// PENNANT
// ============================================================

/// Pennant: a strong move over the bars before the window (the pole),
/// followed by converging highs and lows inside it.
#[derive(Debug, Clone)]
pub struct PennantDetector {
    pub window: usize,
    /// Bars examined before the window for the pole.
    pub pole_lookback: usize,
    /// Minimum pole length in bars.
    pub pole_min_bars: usize,
    /// Minimum absolute fractional move over the pole.
    pub pole_min_move: f64,
    pub slope_threshold: f64,
}

impl Default for PennantDetector {
    fn default() -> Self {
        Self {
            window: 60,
            pole_lookback: 20,
            pole_min_bars: 15,
            pole_min_move: 0.10,
            slope_threshold: SLOPE_THRESHOLD,
        }
    }
}

impl PatternDetector for PennantDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::Pennant
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
        let (high_col, low_col) = series.require_high_low()?;

        for start in 0..n - self.window {
            let pole_start = start.saturating_sub(self.pole_lookback);
            let pole = &close_col[pole_start..start];
            if pole.len() < self.pole_min_bars {
                continue;
            }
            let pole_move = (pole[pole.len() - 1] - pole[0]) / pole[0];
            if pole_move.abs() < self.pole_min_move {
                continue;
            }

            let end = start + self.window;
            let high_fit = linear_trend(&high_col[start..end])?;
            let low_fit = linear_trend(&low_col[start..end])?;

            // converging: highs falling, lows rising
            if !(high_fit.slope < -self.slope_threshold
                && low_fit.slope > self.slope_threshold)
            {
                continue;
            }

            out.push(PatternMatch {
                ticker: series.ticker.clone(),
                kind: PatternKind::Pennant,
                start_date: series.dates[pole_start],
                end_date: series.dates[end - 1],
                support: Some(low_fit.end_value()),
                resistance: Some(high_fit.end_value()),
                window_start: pole_start,
                window_end: end,
                detail: MatchDetail::Pole {
                    pole_start,
                    pennant_start: start,
                    pennant_end: end,
                },
            });
        }

        Ok(out)
    }

    fn validate_config(&self) -> Result<()> {
        Period::new(self.window)?;
        Period::new(self.pole_lookback)?;
        Period::new(self.pole_min_bars)?;
        Ratio::new(self.pole_min_move)?;
        Ok(())
    }
}

// ============================================================
// CORRIDORS
// ============================================================

/// Ascending Corridor: highs and lows both rising at similar rates.
#[derive(Debug, Clone)]
pub struct AscendingCorridorDetector {
    pub window: usize,
    pub slope_threshold: f64,
    /// Maximum relative difference between the two slopes.
    pub parallel_tolerance: f64,
}

impl Default for AscendingCorridorDetector {
    fn default() -> Self {
        Self {
            window: 60,
            slope_threshold: SLOPE_THRESHOLD,
            parallel_tolerance: 0.3,
        }
    }
}

impl PatternDetector for AscendingCorridorDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::AscendingCorridor
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
        series.require_close()?;
        let (high_col, low_col) = series.require_high_low()?;

        for start in 0..n - self.window {
            let end = start + self.window;
            let high_fit = linear_trend(&high_col[start..end])?;
            let low_fit = linear_trend(&low_col[start..end])?;

            if !(high_fit.slope > self.slope_threshold
                && low_fit.slope > self.slope_threshold
                && (high_fit.slope - low_fit.slope).abs() / high_fit.slope
                    < self.parallel_tolerance)
            {
                continue;
            }

            out.push(PatternMatch {
                ticker: series.ticker.clone(),
                kind: PatternKind::AscendingCorridor,
                start_date: series.dates[start],
                end_date: series.dates[end - 1],
                support: Some(low_fit.end_value()),
                resistance: Some(high_fit.end_value()),
                window_start: start,
                window_end: end,
                detail: MatchDetail::Channel {
                    high_slope: high_fit.slope,
                    low_slope: low_fit.slope,
                    high_line: high_fit.fitted,
                    low_line: low_fit.fitted,
                },
            });
        }

        Ok(out)
    }

    fn validate_config(&self) -> Result<()> {
        Period::new(self.window)?;
        Ratio::new(self.parallel_tolerance)?;
        Ok(())
    }
}

/// Descending Corridor: highs and lows both falling at similar rates.
#[derive(Debug, Clone)]
pub struct DescendingCorridorDetector {
    pub window: usize,
    pub slope_threshold: f64,
    /// Maximum relative difference between the two slopes.
    pub parallel_tolerance: f64,
}

impl Default for DescendingCorridorDetector {
    fn default() -> Self {
        Self {
            window: 60,
            slope_threshold: SLOPE_THRESHOLD,
            parallel_tolerance: 0.3,
        }
    }
}

impl PatternDetector for DescendingCorridorDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::DescendingCorridor
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
        series.require_close()?;
        let (high_col, low_col) = series.require_high_low()?;

        for start in 0..n - self.window {
            let end = start + self.window;
            let high_fit = linear_trend(&high_col[start..end])?;
            let low_fit = linear_trend(&low_col[start..end])?;

            if !(high_fit.slope < -self.slope_threshold
                && low_fit.slope < -self.slope_threshold
                && (high_fit.slope - low_fit.slope).abs() / high_fit.slope.abs()
                    < self.parallel_tolerance)
            {
                continue;
            }

            out.push(PatternMatch {
                ticker: series.ticker.clone(),
                kind: PatternKind::DescendingCorridor,
                start_date: series.dates[start],
                end_date: series.dates[end - 1],
                support: Some(low_fit.end_value()),
                resistance: Some(high_fit.end_value()),
                window_start: start,
                window_end: end,
                detail: MatchDetail::Channel {
                    high_slope: high_fit.slope,
                    low_slope: low_fit.slope,
                    high_line: high_fit.fitted,
                    low_line: low_fit.fitted,
                },
            });
        }

        Ok(out)
    }

    fn validate_config(&self) -> Result<()> {
        Period::new(self.window)?;
        Ratio::new(self.parallel_tolerance)?;
        Ok(())
    }
}

// ============================================================
// RECTANGLES
// ============================================================

/// Neutral Rectangle: flat highs and flat lows with a meaningful band
/// between them.
#[derive(Debug, Clone)]
pub struct NeutralRectangleDetector {
    pub window: usize,
    /// Absolute slope below which a boundary line counts as flat.
    pub flat_threshold: f64,
    /// Minimum relative gap between the mean high and mean low.
    pub min_band: f64,
}

impl Default for NeutralRectangleDetector {
    fn default() -> Self {
        Self {
            window: 60,
            flat_threshold: SLOPE_THRESHOLD,
            min_band: 0.03,
        }
    }
}

impl PatternDetector for NeutralRectangleDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::NeutralRectangle
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
        series.require_close()?;
        let (high_col, low_col) = series.require_high_low()?;

        for start in 0..n - self.window {
            let end = start + self.window;
            let highs = &high_col[start..end];
            let lows = &low_col[start..end];
            let high_fit = linear_trend(highs)?;
            let low_fit = linear_trend(lows)?;

            if !(high_fit.slope.abs() < self.flat_threshold
                && low_fit.slope.abs() < self.flat_threshold)
            {
                continue;
            }

            let resistance = mean(highs);
            let support = mean(lows);
            if (resistance - support) / support <= self.min_band {
                continue;
            }

            out.push(PatternMatch {
                ticker: series.ticker.clone(),
                kind: PatternKind::NeutralRectangle,
                start_date: series.dates[start],
                end_date: series.dates[end - 1],
                support: Some(support),
                resistance: Some(resistance),
                window_start: start,
                window_end: end,
                detail: MatchDetail::Band {
                    high_slope: high_fit.slope,
                    low_slope: low_fit.slope,
                },
            });
        }

        Ok(out)
    }

    fn validate_config(&self) -> Result<()> {
        Period::new(self.window)?;
        Ratio::new(self.min_band)?;
        Ok(())
    }
}

/// Diverging Rectangle (broadening formation): highs rising while lows
/// fall.
#[derive(Debug, Clone)]
pub struct DivergingRectangleDetector {
    pub window: usize,
    pub slope_threshold: f64,
}

impl Default for DivergingRectangleDetector {
    fn default() -> Self {
        Self {
            window: 60,
            slope_threshold: SLOPE_THRESHOLD,
        }
    }
}

impl PatternDetector for DivergingRectangleDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::DivergingRectangle
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
        series.require_close()?;
        let (high_col, low_col) = series.require_high_low()?;

        for start in 0..n - self.window {
            let end = start + self.window;
            let high_fit = linear_trend(&high_col[start..end])?;
            let low_fit = linear_trend(&low_col[start..end])?;

            if !(high_fit.slope > self.slope_threshold
                && low_fit.slope < -self.slope_threshold)
            {
                continue;
            }

            out.push(PatternMatch {
                ticker: series.ticker.clone(),
                kind: PatternKind::DivergingRectangle,
                start_date: series.dates[start],
                end_date: series.dates[end - 1],
                support: Some(low_fit.end_value()),
                resistance: Some(high_fit.end_value()),
                window_start: start,
                window_end: end,
                detail: MatchDetail::Channel {
                    high_slope: high_fit.slope,
                    low_slope: low_fit.slope,
                    high_line: high_fit.fitted,
                    low_line: low_fit.fitted,
                },
            });
        }

        Ok(out)
    }

    fn validate_config(&self) -> Result<()> {
        Period::new(self.window)?;
        Ok(())
    }
}

// ============================================================
// ASCENDING TRIANGLE
// ============================================================

/// Ascending Triangle: flat resistance with rising support converging
/// toward it.
#[derive(Debug, Clone)]
pub struct AscendingTriangleDetector {
    pub window: usize,
    /// Absolute slope below which the resistance line counts as flat.
    pub flat_threshold: f64,
    pub slope_threshold: f64,
    /// Maximum relative gap between the line endpoints (convergence).
    pub convergence_limit: f64,
}

impl Default for AscendingTriangleDetector {
    fn default() -> Self {
        Self {
            window: 60,
            flat_threshold: SLOPE_THRESHOLD,
            slope_threshold: SLOPE_THRESHOLD,
            convergence_limit: 0.10,
        }
    }
}

impl PatternDetector for AscendingTriangleDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::AscendingTriangle
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
        series.require_close()?;
        let (high_col, low_col) = series.require_high_low()?;

        for start in 0..n - self.window {
            let end = start + self.window;
            let high_fit = linear_trend(&high_col[start..end])?;
            let low_fit = linear_trend(&low_col[start..end])?;

            if !(high_fit.slope.abs() < self.flat_threshold
                && low_fit.slope > self.slope_threshold)
            {
                continue;
            }

            let resistance = high_fit.end_value();
            let support = low_fit.end_value();
            if (resistance - support) / support >= self.convergence_limit {
                continue;
            }

            out.push(PatternMatch {
                ticker: series.ticker.clone(),
                kind: PatternKind::AscendingTriangle,
                start_date: series.dates[start],
                end_date: series.dates[end - 1],
                support: Some(support),
                resistance: Some(resistance),
                window_start: start,
                window_end: end,
                detail: MatchDetail::Channel {
                    high_slope: high_fit.slope,
                    low_slope: low_fit.slope,
                    high_line: high_fit.fitted,
                    low_line: low_fit.fitted,
                },
            });
        }

        Ok(out)
    }

    fn validate_config(&self) -> Result<()> {
        Period::new(self.window)?;
        Ratio::new(self.convergence_limit)?;
        Ok(())
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static PENNANT_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "pole_min_move",
        0.10,
        (0.05, 0.25, 0.05),
        "Minimum absolute fractional move over the pole",
    ),
    ParamMeta::period(
        "pole_lookback",
        20.0,
        (10.0, 40.0, 5.0),
        "Bars examined before the window for the pole",
    ),
    ParamMeta::period(
        "window",
        60.0,
        (40.0, 120.0, 10.0),
        "Sliding window length in bars",
    ),
];

static ASCENDING_TRIANGLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "convergence_limit",
        0.10,
        (0.05, 0.20, 0.05),
        "Maximum relative gap between the line endpoints",
    ),
    ParamMeta::period(
        "window",
        60.0,
        (40.0, 120.0, 10.0),
        "Sliding window length in bars",
    ),
];

impl ParameterizedDetector for PennantDetector {
    fn param_meta() -> &'static [ParamMeta] {
        PENNANT_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            pole_min_move: get_ratio(params, "pole_min_move", 0.10)?.get(),
            pole_lookback: get_period(params, "pole_lookback", 20)?.get(),
            window: get_period(params, "window", 60)?.get(),
            ..Self::default()
        })
    }

    fn pattern_key() -> &'static str {
        "pennant"
    }
}

impl ParameterizedDetector for AscendingTriangleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        ASCENDING_TRIANGLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            convergence_limit: get_ratio(params, "convergence_limit", 0.10)?.get(),
            window: get_period(params, "window", 60)?.get(),
            ..Self::default()
        })
    }

    fn pattern_key() -> &'static str {
        "ascending_triangle"
    }
}
