//! # chartscan - Classical Chart Pattern Scanner
//!
//! Sliding-window detection of classical technical chart patterns (cup with
//! handle, head and shoulders, pennants, double/triple tops and bottoms,
//! corridors, rectangles, ascending triangles) over daily OHLCV equity series.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartscan::prelude::*;
//! use chrono::NaiveDate;
//!
//! // Build a series from feed columns (normally done by the data layer)
//! let n = 200usize;
//! let base = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
//! let dates: Vec<NaiveDate> = (0..n).map(|i| base + chrono::Duration::days(i as i64)).collect();
//! let close: Vec<f64> = (0..n).map(|i| 100.0 + (i as f64 * 0.4).sin() * 5.0).collect();
//! let open = close.clone();
//! let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
//! let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
//! let volume = vec![1_000u64; n];
//!
//! let series = PriceSeries::from_daily("ACME", dates, open, high, low, close, volume).unwrap();
//!
//! // Scan with all twelve built-in detectors
//! let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
//! let result = engine.scan(&series).unwrap();
//!
//! for (kind, matches) in result.iter() {
//!     println!("{}: {} match(es)", kind.key(), matches.len());
//! }
//! ```

pub mod detectors;
pub mod params;

pub mod prelude {
    pub use crate::{
        // Detectors
        detectors::*,
        // Parameters
        params::{get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        // Convenience entry points
        detect_all,
        // Parallel
        scan_parallel,
        // Engine
        BuiltinDetector,
        Confidence,
        DetectionResult,
        Direction,
        EngineBuilder,
        EngineConfig,
        MatchDetail,
        // Core traits
        PatternDetector,
        PatternEngine,
        // Errors
        PatternError,
        PatternInfo,
        PatternKind,
        PatternMatch,
        Period,
        PriceBar,
        PriceSeries,
        Ratio,
        Result,
        ScanError,
        ScanResult,
    };
}

use chrono::NaiveDate;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur during pattern detection
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("Insufficient data: need {need} rows, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized fraction in range 0.0..=1.0, used for pattern tolerances
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidInput("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Bar count (must be > 0), used for windows and separations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidInput("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// DATA MODEL
// ============================================================

/// One trading day with derived indicator fields.
///
/// The indicator fields are `None` until enough history exists: 19 prior
/// bars for `ma20`, 49 for `ma50`, one prior bar for `daily_return`, and 20
/// returns for `volatility`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub ma20: Option<f64>,
    pub ma50: Option<f64>,
    pub daily_return: Option<f64>,
    pub volatility: Option<f64>,
}

/// Daily price history for one ticker, stored column-wise as delivered by
/// the data feed (`Date`, `Price_Open`, `Price_High`, `Price_Low`,
/// `Price_Close`, `Price_Volume`, `MA20`, `MA50`, `Daily_Return`,
/// `Volatility`, `Ticker`).
///
/// A column the feed did not deliver is an empty `Vec`. The detection
/// engine only ever checks for the close column; trend-line detectors
/// additionally require the high/low columns. The series is immutable
/// input: detectors read sub-windows by position and never mutate it.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceSeries {
    pub ticker: String,
    pub dates: Vec<NaiveDate>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<u64>,
    pub ma20: Vec<Option<f64>>,
    pub ma50: Vec<Option<f64>>,
    pub daily_return: Vec<Option<f64>>,
    pub volatility: Vec<Option<f64>>,
}

impl PriceSeries {
    /// Minimum row count required of a freshly ingested series.
    pub const MIN_ROWS: usize = 30;

    /// Build a series from raw feed columns, validating the rows and
    /// computing the derived indicator columns (MA20, MA50, daily return,
    /// 20-period return volatility).
    pub fn from_daily(
        ticker: impl Into<String>,
        dates: Vec<NaiveDate>,
        open: Vec<f64>,
        high: Vec<f64>,
        low: Vec<f64>,
        close: Vec<f64>,
        volume: Vec<u64>,
    ) -> Result<Self> {
        let n = dates.len();
        if open.len() != n
            || high.len() != n
            || low.len() != n
            || close.len() != n
            || volume.len() != n
        {
            return Err(PatternError::InvalidInput("column lengths differ"));
        }
        if n < Self::MIN_ROWS {
            return Err(PatternError::InsufficientData {
                need: Self::MIN_ROWS,
                got: n,
            });
        }
        if dates.windows(2).any(|w| w[1] <= w[0]) {
            return Err(PatternError::InvalidInput("dates must be strictly ascending"));
        }
        for i in 0..n {
            let (o, h, l, c) = (open[i], high[i], low[i], close[i]);
            if !(o.is_finite() && h.is_finite() && l.is_finite() && c.is_finite()) {
                return Err(PatternError::InvalidInput("non-finite price"));
            }
            if o <= 0.0 || h <= 0.0 || l <= 0.0 || c <= 0.0 {
                return Err(PatternError::InvalidInput("non-positive price"));
            }
            if h < l {
                return Err(PatternError::InvalidInput("high below low"));
            }
        }

        let ma20 = sma(&close, 20);
        let ma50 = sma(&close, 50);
        let daily_return = pct_change(&close);
        let volatility = rolling_std(&daily_return, 20);

        Ok(Self {
            ticker: ticker.into(),
            dates,
            open,
            high,
            low,
            close,
            volume,
            ma20,
            ma50,
            daily_return,
            volatility,
        })
    }

    /// Number of rows (trading days) in the series.
    #[inline]
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Row view for renderers re-slicing a matched window.
    pub fn bar(&self, index: usize) -> Option<PriceBar> {
        Some(PriceBar {
            date: *self.dates.get(index)?,
            open: *self.open.get(index)?,
            high: *self.high.get(index)?,
            low: *self.low.get(index)?,
            close: *self.close.get(index)?,
            volume: *self.volume.get(index)?,
            ma20: self.ma20.get(index).copied().flatten(),
            ma50: self.ma50.get(index).copied().flatten(),
            daily_return: self.daily_return.get(index).copied().flatten(),
            volatility: self.volatility.get(index).copied().flatten(),
        })
    }

    /// The close column, or `MissingColumn` if the feed did not deliver it.
    pub fn require_close(&self) -> Result<&[f64]> {
        if self.close.len() != self.dates.len() {
            return Err(PatternError::MissingColumn("Price_Close"));
        }
        Ok(&self.close)
    }

    /// The high/low columns, or `MissingColumn` for whichever is absent.
    pub fn require_high_low(&self) -> Result<(&[f64], &[f64])> {
        if self.high.len() != self.dates.len() {
            return Err(PatternError::MissingColumn("Price_High"));
        }
        if self.low.len() != self.dates.len() {
            return Err(PatternError::MissingColumn("Price_Low"));
        }
        Ok((&self.high, &self.low))
    }

    /// Validate structural consistency: equal column lengths, ascending
    /// unique dates, finite prices, high/low envelope.
    pub fn validate(&self) -> Result<()> {
        let n = self.dates.len();
        if self.open.len() != n
            || self.high.len() != n
            || self.low.len() != n
            || self.close.len() != n
            || self.volume.len() != n
        {
            return Err(PatternError::InvalidInput("column lengths differ"));
        }
        if self.dates.windows(2).any(|w| w[1] <= w[0]) {
            return Err(PatternError::InvalidInput("dates must be strictly ascending"));
        }
        for i in 0..n {
            let (o, h, l, c) = (self.open[i], self.high[i], self.low[i], self.close[i]);
            if !(o.is_finite() && h.is_finite() && l.is_finite() && c.is_finite()) {
                return Err(PatternError::InvalidInput("non-finite price"));
            }
            if c <= 0.0 {
                return Err(PatternError::InvalidInput("non-positive close"));
            }
            if h < l {
                return Err(PatternError::InvalidInput("high below low"));
            }
        }
        Ok(())
    }
}

/// Simple moving average; `None` until `window` samples exist.
fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 {
        return out;
    }
    for i in (window.saturating_sub(1))..values.len() {
        let slice = &values[i + 1 - window..=i];
        out[i] = Some(slice.iter().sum::<f64>() / window as f64);
    }
    out
}

/// Fractional change from the prior sample; `None` for the first.
fn pct_change(values: &[f64]) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    for i in 1..values.len() {
        out[i] = Some((values[i] - values[i - 1]) / values[i - 1]);
    }
    out
}

/// Rolling sample standard deviation (ddof = 1) over an optional-valued
/// column; `None` wherever the trailing window is incomplete.
fn rolling_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window < 2 {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice: Vec<f64> = values[i + 1 - window..=i]
            .iter()
            .copied()
            .flatten()
            .collect();
        if slice.len() < window {
            continue;
        }
        let mean = slice.iter().sum::<f64>() / window as f64;
        let var =
            slice.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (window - 1) as f64;
        out[i] = Some(var.sqrt());
    }
    out
}

// ============================================================
// PATTERN KINDS AND METADATA REGISTRY
// ============================================================

/// Directional bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

/// Confidence grade attached to a pattern's historical success rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// The twelve chart pattern kinds, in fixed scan order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    CupWithHandle,
    HeadAndShoulders,
    Pennant,
    DoubleTop,
    DoubleBottom,
    TripleTop,
    TripleBottom,
    AscendingCorridor,
    DescendingCorridor,
    NeutralRectangle,
    DivergingRectangle,
    AscendingTriangle,
}

/// Display metadata for one pattern kind, consumed by presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PatternInfo {
    pub display_name: &'static str,
    pub description: &'static str,
    /// Historical success rate in percent, from technical analysis literature.
    pub success_rate_pct: u8,
    pub confidence: Confidence,
}

static REGISTRY: [PatternInfo; PatternKind::COUNT] = [
    PatternInfo {
        display_name: "Cup with Handle",
        description: "Bullish continuation: a rounded bottom (the cup) followed by a slight \
                      downward drift (the handle), completed when price clears the cup's \
                      resistance level.",
        success_rate_pct: 65,
        confidence: Confidence::High,
    },
    PatternInfo {
        display_name: "Head and Shoulders",
        description: "Bearish reversal of three peaks where the central head rises above both \
                      shoulders; confirmed when price breaks the neckline through the \
                      intervening troughs.",
        success_rate_pct: 75,
        confidence: Confidence::High,
    },
    PatternInfo {
        display_name: "Pennant",
        description: "Continuation pattern: a strong directional move (the pole) followed by a \
                      small converging consolidation, typically resolved in the direction of \
                      the pole.",
        success_rate_pct: 70,
        confidence: Confidence::Medium,
    },
    PatternInfo {
        display_name: "Double Top",
        description: "Bearish reversal after an uptrend: two consecutive peaks near the same \
                      level with a moderate trough between, confirmed on a break below support.",
        success_rate_pct: 65,
        confidence: Confidence::Medium,
    },
    PatternInfo {
        display_name: "Double Bottom",
        description: "Bullish reversal after a downtrend: two consecutive troughs near the \
                      same level with a moderate peak between, confirmed on a break above \
                      resistance.",
        success_rate_pct: 65,
        confidence: Confidence::Medium,
    },
    PatternInfo {
        display_name: "Triple Top",
        description: "Bearish reversal with three peaks near one level; signals that the \
                      uptrend is ending and a downtrend may follow.",
        success_rate_pct: 78,
        confidence: Confidence::High,
    },
    PatternInfo {
        display_name: "Triple Bottom",
        description: "Bullish reversal with three troughs near one level; signals that the \
                      downtrend is ending and an uptrend may follow.",
        success_rate_pct: 78,
        confidence: Confidence::High,
    },
    PatternInfo {
        display_name: "Ascending Corridor",
        description: "Price climbing between two parallel upward-sloping trendlines; the lows \
                      form support and the highs form resistance.",
        success_rate_pct: 60,
        confidence: Confidence::Medium,
    },
    PatternInfo {
        display_name: "Descending Corridor",
        description: "Price falling between two parallel downward-sloping trendlines; the \
                      highs form resistance and the lows form support.",
        success_rate_pct: 60,
        confidence: Confidence::Medium,
    },
    PatternInfo {
        display_name: "Neutral Rectangle",
        description: "Consolidation between two horizontal trendlines; equilibrium between \
                      buyers and sellers with no clear direction.",
        success_rate_pct: 55,
        confidence: Confidence::Low,
    },
    PatternInfo {
        display_name: "Diverging Rectangle",
        description: "Broadening formation between diverging trendlines; rising volatility \
                      and an undecided market rather than consolidation.",
        success_rate_pct: 50,
        confidence: Confidence::Low,
    },
    PatternInfo {
        display_name: "Ascending Triangle",
        description: "Bullish continuation with a flat resistance line and rising support; \
                      typically resolves in an upward breakout through resistance.",
        success_rate_pct: 72,
        confidence: Confidence::High,
    },
];

impl PatternKind {
    pub const COUNT: usize = 12;

    /// All kinds in the fixed scan order.
    pub const ALL: [PatternKind; PatternKind::COUNT] = [
        PatternKind::CupWithHandle,
        PatternKind::HeadAndShoulders,
        PatternKind::Pennant,
        PatternKind::DoubleTop,
        PatternKind::DoubleBottom,
        PatternKind::TripleTop,
        PatternKind::TripleBottom,
        PatternKind::AscendingCorridor,
        PatternKind::DescendingCorridor,
        PatternKind::NeutralRectangle,
        PatternKind::DivergingRectangle,
        PatternKind::AscendingTriangle,
    ];

    /// Stable snake_case key, matching the serialized form.
    pub fn key(self) -> &'static str {
        match self {
            PatternKind::CupWithHandle => "cup_with_handle",
            PatternKind::HeadAndShoulders => "head_and_shoulders",
            PatternKind::Pennant => "pennant",
            PatternKind::DoubleTop => "double_top",
            PatternKind::DoubleBottom => "double_bottom",
            PatternKind::TripleTop => "triple_top",
            PatternKind::TripleBottom => "triple_bottom",
            PatternKind::AscendingCorridor => "ascending_corridor",
            PatternKind::DescendingCorridor => "descending_corridor",
            PatternKind::NeutralRectangle => "neutral_rectangle",
            PatternKind::DivergingRectangle => "diverging_rectangle",
            PatternKind::AscendingTriangle => "ascending_triangle",
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Display metadata for this kind.
    pub fn info(self) -> &'static PatternInfo {
        &REGISTRY[self as usize]
    }

    /// Typical directional bias of the completed pattern.
    ///
    /// `None` means the pattern is bidirectional: a pennant resolves in the
    /// direction of its pole.
    pub fn typical_direction(self) -> Option<Direction> {
        match self {
            PatternKind::CupWithHandle
            | PatternKind::DoubleBottom
            | PatternKind::TripleBottom
            | PatternKind::AscendingCorridor
            | PatternKind::AscendingTriangle => Some(Direction::Bullish),
            PatternKind::HeadAndShoulders
            | PatternKind::DoubleTop
            | PatternKind::TripleTop
            | PatternKind::DescendingCorridor => Some(Direction::Bearish),
            PatternKind::NeutralRectangle | PatternKind::DivergingRectangle => {
                Some(Direction::Neutral)
            }
            PatternKind::Pennant => None,
        }
    }
}

// ============================================================
// PATTERN MATCH
// ============================================================

/// Pattern-specific auxiliary data carried by a [`PatternMatch`], with
/// enough detail for a renderer to draw the formation without
/// recomputation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum MatchDetail {
    /// Window-relative peak/trough index lists (shape patterns).
    Extrema {
        peaks: Vec<usize>,
        troughs: Vec<usize>,
    },
    /// Fitted high/low trend lines sampled at every window position.
    Channel {
        high_slope: f64,
        low_slope: f64,
        high_line: Vec<f64>,
        low_line: Vec<f64>,
    },
    /// Flat band characterized by its near-zero slopes only.
    Band { high_slope: f64, low_slope: f64 },
    /// Pole/consolidation segmentation of a pennant (absolute positions).
    Pole {
        pole_start: usize,
        pennant_start: usize,
        pennant_end: usize,
    },
}

/// One detected pattern occurrence.
///
/// `window_start`/`window_end` are absolute positions into the original
/// series (end exclusive), used to re-slice the series for display.
/// `start_date`/`end_date` are the human-displayable calendar bounds,
/// inclusive.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PatternMatch {
    pub ticker: String,
    pub kind: PatternKind,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    pub window_start: usize,
    pub window_end: usize,
    pub detail: MatchDetail,
}

// ============================================================
// DETECTION RESULT
// ============================================================

/// Matches for one scan, grouped by pattern kind.
///
/// Backed by a fixed array indexed by [`PatternKind`] discriminant, sized
/// at construction; iteration follows the fixed kind order and skips kinds
/// with no matches.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    by_kind: [Vec<PatternMatch>; PatternKind::COUNT],
}

impl Default for DetectionResult {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionResult {
    pub fn new() -> Self {
        Self {
            by_kind: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Matches recorded for one kind (possibly empty).
    #[inline]
    pub fn matches(&self, kind: PatternKind) -> &[PatternMatch] {
        &self.by_kind[kind.index()]
    }

    /// Append matches for one kind, preserving detection order.
    pub fn push_matches(&mut self, kind: PatternKind, matches: Vec<PatternMatch>) {
        self.by_kind[kind.index()].extend(matches);
    }

    /// Kinds with at least one match, in fixed order, with their matches.
    pub fn iter(&self) -> impl Iterator<Item = (PatternKind, &[PatternMatch])> + '_ {
        PatternKind::ALL
            .iter()
            .map(|&kind| (kind, self.matches(kind)))
            .filter(|(_, m)| !m.is_empty())
    }

    /// Kinds with at least one match, in fixed order.
    pub fn detected_kinds(&self) -> impl Iterator<Item = PatternKind> + '_ {
        self.iter().map(|(kind, _)| kind)
    }

    pub fn total_matches(&self) -> usize {
        self.by_kind.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.iter().all(Vec::is_empty)
    }

    /// Concatenate another result into this one, per kind, preserving
    /// order. Used by callers merging per-ticker results into a
    /// universe-wide map.
    pub fn merge(&mut self, other: DetectionResult) {
        for (dst, src) in self.by_kind.iter_mut().zip(other.by_kind) {
            dst.extend(src);
        }
    }
}

impl serde::Serialize for DetectionResult {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = s.serialize_map(Some(self.detected_kinds().count()))?;
        for (kind, matches) in self.iter() {
            map.serialize_entry(kind.key(), matches)?;
        }
        map.end()
    }
}

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

/// A sliding-window chart pattern classifier.
///
/// Implementations enumerate every window of their fixed size across the
/// series and emit zero or more matches. A series shorter than the window
/// is a benign empty result, not an error; malformed input raises.
pub trait PatternDetector: Send + Sync {
    fn kind(&self) -> PatternKind;

    /// Fixed sliding-window size in bars.
    fn window(&self) -> usize;

    fn scan(&self, series: &PriceSeries) -> Result<Vec<PatternMatch>>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn scan(&self, series: &PriceSeries) -> Result<Vec<PatternMatch>> {
                match self {
                    $(Self::$variant(d) => PatternDetector::scan(d, series)),*
                }
            }

            #[inline]
            pub fn kind(&self) -> PatternKind {
                match self {
                    $(Self::$variant(d) => PatternDetector::kind(d)),*
                }
            }

            #[inline]
            pub fn window(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::window(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

// Apply macro - all 12 chart patterns, in fixed scan order
define_builtin_detectors! {
    CupWithHandle(CupWithHandleDetector),
    HeadAndShoulders(HeadAndShouldersDetector),
    Pennant(PennantDetector),
    DoubleTop(DoubleTopDetector),
    DoubleBottom(DoubleBottomDetector),
    TripleTop(TripleTopDetector),
    TripleBottom(TripleBottomDetector),
    AscendingCorridor(AscendingCorridorDetector),
    DescendingCorridor(DescendingCorridorDetector),
    NeutralRectangle(NeutralRectangleDetector),
    DivergingRectangle(DivergingRectangleDetector),
    AscendingTriangle(AscendingTriangleDetector),
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Run structural validation on the series before scanning.
    pub validate_data: bool,
    /// Restrict the scan to these kinds only.
    pub kind_filter: Option<Vec<PatternKind>>,
}

/// Main detection engine: runs every registered detector against one
/// ticker's series and assembles the kind → matches mapping.
///
/// The engine is purely synchronous and stateless between invocations;
/// per-ticker scans are independent and safe to run concurrently (see
/// [`scan_parallel`]).
pub struct PatternEngine {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn PatternDetector>>,
    config: EngineConfig,
}

impl PatternEngine {
    /// Scan one ticker's series with every registered detector.
    ///
    /// Fails with `MissingColumn` before any detector runs if the close
    /// column is absent. Detector errors propagate uncaught; a caller
    /// processing many tickers isolates each call so one failure does not
    /// abort the batch.
    pub fn scan(&self, series: &PriceSeries) -> Result<DetectionResult> {
        series.require_close()?;
        if self.config.validate_data {
            series.validate()?;
        }

        tracing::debug!(
            ticker = %series.ticker,
            rows = series.len(),
            "scanning series for chart patterns"
        );

        let mut result = DetectionResult::new();
        for detector in &self.builtin {
            if !self.wants(detector.kind()) {
                continue;
            }
            let matches = detector.scan(series)?;
            tracing::trace!(
                kind = detector.kind().key(),
                count = matches.len(),
                "detector finished"
            );
            result.push_matches(detector.kind(), matches);
        }
        for detector in &self.custom {
            if !self.wants(detector.kind()) {
                continue;
            }
            let matches = detector.scan(series)?;
            result.push_matches(detector.kind(), matches);
        }

        tracing::debug!(
            ticker = %series.ticker,
            matches = result.total_matches(),
            "scan complete"
        );
        Ok(result)
    }

    fn wants(&self, kind: PatternKind) -> bool {
        match &self.config.kind_filter {
            Some(filter) => filter.contains(&kind),
            None => true,
        }
    }

    fn validate(&self) -> Result<()> {
        for d in &self.builtin {
            d.validate_config()?;
        }
        for d in &self.custom {
            d.validate_config()?;
        }
        Ok(())
    }
}

/// Run all twelve default detectors against one ticker's series.
pub fn detect_all(series: &PriceSeries) -> Result<DetectionResult> {
    EngineBuilder::new().with_all_defaults().build()?.scan(series)
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
pub struct EngineBuilder {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn PatternDetector>>,
    config: EngineConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate an array of `BuiltinDetector` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinDetector::$variant(Default::default())),*]
  };
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            builtin: Vec::new(),
            custom: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    /// Add all twelve builtin detectors with default configurations, in the
    /// fixed scan order.
    pub fn with_all_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            CupWithHandle,
            HeadAndShoulders,
            Pennant,
            DoubleTop,
            DoubleBottom,
            TripleTop,
            TripleBottom,
            AscendingCorridor,
            DescendingCorridor,
            NeutralRectangle,
            DivergingRectangle,
            AscendingTriangle,
        ]);
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Add a custom detector (vtable dispatch)
    pub fn add_custom<D: PatternDetector + 'static>(mut self, detector: D) -> Self {
        self.custom.push(Box::new(detector));
        self
    }

    /// Restrict the scan to specific kinds only
    pub fn only_kinds(mut self, kinds: impl IntoIterator<Item = PatternKind>) -> Self {
        self.config.kind_filter = Some(kinds.into_iter().collect());
        self
    }

    /// Enable/disable structural series validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine> {
        let engine = PatternEngine {
            builtin: self.builtin,
            custom: self.custom,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single ticker
#[derive(Debug)]
pub struct ScanResult {
    pub ticker: String,
    pub result: DetectionResult,
}

/// Error from scanning a single ticker
#[derive(Debug)]
pub struct ScanError {
    pub ticker: String,
    pub error: PatternError,
}

/// Scan many tickers concurrently, one task per ticker.
///
/// Per-ticker scans share no state and need no ordering; result order
/// follows input order. Each ticker is isolated: a failing series lands in
/// the error list without aborting the batch. Merge successes into a
/// universe-wide mapping with [`DetectionResult::merge`]:
///
/// ```ignore
/// let (results, _errors) = scan_parallel(&engine, &universe);
/// let mut global = DetectionResult::new();
/// for r in results {
///     global.merge(r.result);
/// }
/// ```
pub fn scan_parallel<'a, I>(
    engine: &PatternEngine,
    universe: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    I: IntoParallelIterator<Item = &'a PriceSeries>,
{
    let outcomes: Vec<_> = universe
        .into_par_iter()
        .map(|series| {
            engine
                .scan(series)
                .map(|result| ScanResult {
                    ticker: series.ticker.clone(),
                    result,
                })
                .map_err(|error| {
                    tracing::warn!(ticker = %series.ticker, %error, "ticker scan failed");
                    ScanError {
                        ticker: series.ticker.clone(),
                        error,
                    }
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for outcome in outcomes {
        match outcome {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
