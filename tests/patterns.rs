//! Integration tests for the chartscan detection engine.
//!
//! Each detector gets a synthetic series shaped to trigger it exactly once,
//! plus negative cases for the boundary conditions (series shorter than the
//! window, series exactly one window long, missing columns).

use chartscan::prelude::*;
use chrono::NaiveDate;

// ============================================================
// TEST HELPERS
// ============================================================

/// Linear interpolation through (index, value) vertices; the output covers
/// 0..=last_index.
fn polyline(vertices: &[(usize, f64)]) -> Vec<f64> {
    let mut out = Vec::with_capacity(vertices.last().unwrap().0 + 1);
    for pair in vertices.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        let span = (x1 - x0) as f64;
        for x in x0..x1 {
            let t = (x - x0) as f64 / span;
            out.push(y0 + (y1 - y0) * t);
        }
    }
    out.push(vertices.last().unwrap().1);
    out
}

fn make_series_hl(close: Vec<f64>, high: Vec<f64>, low: Vec<f64>) -> PriceSeries {
    let n = close.len();
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    PriceSeries {
        ticker: "TEST".into(),
        dates: (0..n)
            .map(|i| base + chrono::Duration::days(i as i64))
            .collect(),
        open: close.clone(),
        high,
        low,
        volume: vec![1_000; n],
        ma20: vec![None; n],
        ma50: vec![None; n],
        daily_return: vec![None; n],
        volatility: vec![None; n],
        close,
    }
}

fn make_series(close: Vec<f64>) -> PriceSeries {
    let high = close.iter().map(|c| c + 1.0).collect();
    let low = close.iter().map(|c| c - 1.0).collect();
    make_series_hl(close, high, low)
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

// ============================================================
// SHAPE PATTERNS
// ============================================================

#[test]
fn test_double_top_synthetic() {
    // two equal peaks at 10 and 40 (value 100) with a trough of 80 at 25,
    // 61 bars so exactly one 60-bar window is examined
    let close = polyline(&[(0, 90.0), (10, 100.0), (25, 80.0), (40, 100.0), (60, 89.0)]);
    assert_eq!(close.len(), 61);
    let series = make_series(close);

    let matches = DoubleTopDetector::with_defaults().scan(&series).unwrap();
    assert_eq!(matches.len(), 1);

    let m = &matches[0];
    assert_eq!(m.kind, PatternKind::DoubleTop);
    assert_eq!(m.window_start, 0);
    assert_eq!(m.window_end, 60);
    assert!(approx(m.support.unwrap(), 80.0));
    assert!(approx(m.resistance.unwrap(), 100.0));
    // calendar bounds: first peak minus 5 bars, second peak plus 5 bars
    assert_eq!(m.start_date, series.dates[5]);
    assert_eq!(m.end_date, series.dates[45]);
    assert_eq!(
        m.detail,
        MatchDetail::Extrema {
            peaks: vec![10, 40],
            troughs: vec![25],
        }
    );
}

#[test]
fn test_double_top_not_detected_at_exact_window_length() {
    // same shape but exactly 60 bars: no window start is examined
    let close = polyline(&[(0, 90.0), (10, 100.0), (25, 80.0), (40, 100.0), (59, 90.0)]);
    assert_eq!(close.len(), 60);
    let series = make_series(close);

    let matches = DoubleTopDetector::with_defaults().scan(&series).unwrap();
    assert!(matches.is_empty());
}

#[test]
fn test_double_top_requires_trough_between() {
    // two similar peaks but the dip between them is too shallow to register
    // as a trough (prominence below 2% of the window max)
    let close = polyline(&[(0, 90.0), (10, 100.0), (25, 99.0), (40, 100.0), (60, 89.0)]);
    let series = make_series(close);

    let matches = DoubleTopDetector::with_defaults().scan(&series).unwrap();
    assert!(matches.is_empty());
}

#[test]
fn test_double_bottom_synthetic() {
    let close = polyline(&[(0, 110.0), (10, 100.0), (25, 120.0), (40, 100.0), (60, 111.0)]);
    let series = make_series(close);

    let matches = DoubleBottomDetector::with_defaults().scan(&series).unwrap();
    assert_eq!(matches.len(), 1);

    let m = &matches[0];
    assert!(approx(m.support.unwrap(), 100.0));
    assert!(approx(m.resistance.unwrap(), 120.0));
    assert_eq!(
        m.detail,
        MatchDetail::Extrema {
            peaks: vec![25],
            troughs: vec![10, 40],
        }
    );
}

#[test]
fn test_head_and_shoulders_synthetic() {
    // shoulders at 100, head at 115, troughs at 85; one 120-bar window
    let close = polyline(&[
        (0, 92.0),
        (15, 100.0),
        (30, 85.0),
        (45, 115.0),
        (60, 85.0),
        (75, 100.0),
        (120, 90.0),
    ]);
    assert_eq!(close.len(), 121);
    let series = make_series(close);

    let matches = HeadAndShouldersDetector::with_defaults()
        .scan(&series)
        .unwrap();
    assert_eq!(matches.len(), 1);

    let m = &matches[0];
    // neckline through the two 85-troughs; resistance averages all 3 peaks
    assert!(approx(m.support.unwrap(), 85.0));
    assert!(approx(m.resistance.unwrap(), 105.0));
    assert_eq!(m.start_date, series.dates[10]);
    assert_eq!(m.end_date, series.dates[80]);
    assert_eq!(
        m.detail,
        MatchDetail::Extrema {
            peaks: vec![15, 45, 75],
            troughs: vec![30, 60],
        }
    );
}

#[test]
fn test_head_and_shoulders_rejects_equal_peaks() {
    // three equal peaks: no head, so no match (this is a triple top instead)
    let close = polyline(&[
        (0, 92.0),
        (15, 100.0),
        (30, 85.0),
        (45, 100.0),
        (60, 85.0),
        (75, 100.0),
        (120, 90.0),
    ]);
    let series = make_series(close);

    let matches = HeadAndShouldersDetector::with_defaults()
        .scan(&series)
        .unwrap();
    assert!(matches.is_empty());
}

#[test]
fn test_triple_top_synthetic() {
    let close = polyline(&[
        (0, 92.0),
        (15, 100.0),
        (30, 90.0),
        (45, 100.0),
        (60, 90.0),
        (75, 100.0),
        (90, 93.0),
    ]);
    assert_eq!(close.len(), 91);
    let series = make_series(close);

    let matches = TripleTopDetector::with_defaults().scan(&series).unwrap();
    assert_eq!(matches.len(), 1);

    let m = &matches[0];
    assert!(approx(m.support.unwrap(), 90.0));
    assert!(approx(m.resistance.unwrap(), 100.0));
    assert_eq!(
        m.detail,
        MatchDetail::Extrema {
            peaks: vec![15, 45, 75],
            troughs: vec![30, 60],
        }
    );
}

#[test]
fn test_triple_bottom_synthetic() {
    let close = polyline(&[
        (0, 108.0),
        (15, 100.0),
        (30, 110.0),
        (45, 100.0),
        (60, 110.0),
        (75, 100.0),
        (90, 107.0),
    ]);
    let series = make_series(close);

    let matches = TripleBottomDetector::with_defaults().scan(&series).unwrap();
    assert_eq!(matches.len(), 1);

    let m = &matches[0];
    assert!(approx(m.support.unwrap(), 100.0));
    assert!(approx(m.resistance.unwrap(), 110.0));
}

#[test]
fn test_cup_with_handle_synthetic() {
    // rims at 10 and 70 (value 100), cup bottom 85 at 40, then a shallow
    // handle dip to 95.5 at 75 recovering into the window end
    let close = polyline(&[
        (0, 88.0),
        (10, 100.0),
        (40, 85.0),
        (70, 100.0),
        (75, 95.5),
        (120, 97.1),
    ]);
    assert_eq!(close.len(), 121);
    let series = make_series(close);

    let matches = CupWithHandleDetector::with_defaults().scan(&series).unwrap();
    assert_eq!(matches.len(), 1);

    let m = &matches[0];
    assert!(approx(m.support.unwrap(), 85.0));
    assert!(approx(m.resistance.unwrap(), 100.0));
    assert_eq!(m.window_start, 0);
    assert_eq!(m.window_end, 120);
    // cup dates span the whole window
    assert_eq!(m.start_date, series.dates[0]);
    assert_eq!(m.end_date, series.dates[119]);
    assert_eq!(
        m.detail,
        MatchDetail::Extrema {
            peaks: vec![10, 70],
            troughs: vec![40],
        }
    );
}

#[test]
fn test_cup_without_handle_not_detected() {
    // same cup but price keeps falling after the second rim: no recovery
    let close = polyline(&[
        (0, 88.0),
        (10, 100.0),
        (40, 85.0),
        (70, 100.0),
        (120, 90.0),
    ]);
    let series = make_series(close);

    let matches = CupWithHandleDetector::with_defaults().scan(&series).unwrap();
    assert!(matches.is_empty());
}

// ============================================================
// CHANNEL PATTERNS
// ============================================================

#[test]
fn test_pennant_synthetic() {
    // 20-bar pole rising 100 -> ~110.45 (over 10%), then 60 converging bars
    let mut close: Vec<f64> = (0..20).map(|i| 100.0 + 0.55 * i as f64).collect();
    let mut high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
    let mut low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
    for j in 0..61 {
        close.push(110.0);
        high.push(113.0 - 0.05 * j as f64);
        low.push(107.0 + 0.05 * j as f64);
    }
    let series = make_series_hl(close, high, low);

    let matches = PennantDetector::with_defaults().scan(&series).unwrap();
    assert_eq!(matches.len(), 1);

    let m = &matches[0];
    assert_eq!(
        m.detail,
        MatchDetail::Pole {
            pole_start: 0,
            pennant_start: 20,
            pennant_end: 80,
        }
    );
    assert_eq!(m.window_start, 0);
    assert_eq!(m.window_end, 80);
    assert_eq!(m.start_date, series.dates[0]);
    assert_eq!(m.end_date, series.dates[79]);
    // line endpoints of the converging boundaries
    assert!(approx(m.resistance.unwrap(), 113.0 - 0.05 * 59.0));
    assert!(approx(m.support.unwrap(), 107.0 + 0.05 * 59.0));
}

#[test]
fn test_pennant_requires_pole() {
    // same consolidation but a flat run-up: no pole, no pennant
    let mut close: Vec<f64> = vec![110.0; 20];
    let mut high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
    let mut low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
    for j in 0..61 {
        close.push(110.0);
        high.push(113.0 - 0.05 * j as f64);
        low.push(107.0 + 0.05 * j as f64);
    }
    let series = make_series_hl(close, high, low);

    let matches = PennantDetector::with_defaults().scan(&series).unwrap();
    assert!(matches.is_empty());
}

#[test]
fn test_neutral_rectangle_synthetic() {
    // highs oscillating tightly around 110, lows around 100, flat close
    let n = 61usize;
    let close = vec![105.0; n];
    let high: Vec<f64> = (0..n)
        .map(|i| 110.0 + if i % 2 == 0 { 0.2 } else { -0.2 })
        .collect();
    let low: Vec<f64> = (0..n)
        .map(|i| 100.0 + if i % 2 == 0 { -0.2 } else { 0.2 })
        .collect();
    let series = make_series_hl(close, high, low);

    let matches = NeutralRectangleDetector::with_defaults()
        .scan(&series)
        .unwrap();
    assert_eq!(matches.len(), 1);

    let m = &matches[0];
    assert!(approx(m.support.unwrap(), 100.0));
    assert!(approx(m.resistance.unwrap(), 110.0));
    match &m.detail {
        MatchDetail::Band {
            high_slope,
            low_slope,
        } => {
            assert!(high_slope.abs() < 0.01);
            assert!(low_slope.abs() < 0.01);
        }
        other => panic!("expected Band detail, got {other:?}"),
    }
}

#[test]
fn test_neutral_rectangle_requires_band_width() {
    // flat but the band is under 3% of support: no match
    let n = 61usize;
    let close = vec![100.0; n];
    let high = vec![101.0; n];
    let low = vec![99.0; n];
    let series = make_series_hl(close, high, low);

    let matches = NeutralRectangleDetector::with_defaults()
        .scan(&series)
        .unwrap();
    assert!(matches.is_empty());
}

#[test]
fn test_ascending_corridor_synthetic() {
    // parallel uptrend: both boundary slopes 0.333, zero slope difference
    let close: Vec<f64> = (0..61).map(|i| 100.0 + i as f64 / 3.0).collect();
    let series = make_series(close);

    let matches = AscendingCorridorDetector::with_defaults()
        .scan(&series)
        .unwrap();
    assert_eq!(matches.len(), 1);

    let m = &matches[0];
    assert!(m.support.unwrap() < m.resistance.unwrap());
    match &m.detail {
        MatchDetail::Channel {
            high_slope,
            low_slope,
            high_line,
            low_line,
        } => {
            assert!(*high_slope > 0.01);
            assert!(*low_slope > 0.01);
            assert_eq!(high_line.len(), 60);
            assert_eq!(low_line.len(), 60);
        }
        other => panic!("expected Channel detail, got {other:?}"),
    }
}

#[test]
fn test_descending_corridor_synthetic() {
    let close: Vec<f64> = (0..61).map(|i| 130.0 - i as f64 / 3.0).collect();
    let series = make_series(close);

    let matches = DescendingCorridorDetector::with_defaults()
        .scan(&series)
        .unwrap();
    assert_eq!(matches.len(), 1);
    let m = &matches[0];
    assert!(m.support.unwrap() < m.resistance.unwrap());
}

#[test]
fn test_diverging_rectangle_synthetic() {
    let n = 61usize;
    let close = vec![100.0; n];
    let high: Vec<f64> = (0..n).map(|i| 110.0 + 0.05 * i as f64).collect();
    let low: Vec<f64> = (0..n).map(|i| 90.0 - 0.05 * i as f64).collect();
    let series = make_series_hl(close, high, low);

    let matches = DivergingRectangleDetector::with_defaults()
        .scan(&series)
        .unwrap();
    assert_eq!(matches.len(), 1);
    match &matches[0].detail {
        MatchDetail::Channel {
            high_slope,
            low_slope,
            ..
        } => {
            assert!(*high_slope > 0.01);
            assert!(*low_slope < -0.01);
        }
        other => panic!("expected Channel detail, got {other:?}"),
    }
}

#[test]
fn test_ascending_triangle_synthetic() {
    // flat resistance at 110, support rising toward it
    let n = 61usize;
    let close: Vec<f64> = (0..n).map(|i| 105.0 + 0.075 * i as f64).collect();
    let high = vec![110.0; n];
    let low: Vec<f64> = (0..n).map(|i| 100.0 + 0.15 * i as f64).collect();
    let series = make_series_hl(close, high, low);

    let matches = AscendingTriangleDetector::with_defaults()
        .scan(&series)
        .unwrap();
    assert_eq!(matches.len(), 1);

    let m = &matches[0];
    assert!(approx(m.resistance.unwrap(), 110.0));
    assert!(approx(m.support.unwrap(), 100.0 + 0.15 * 59.0));
}

#[test]
fn test_monotonic_uptrend_is_not_an_ascending_triangle() {
    // 20% climb over 60 bars with no flattening: the resistance line is not
    // flat, so the corridor fires but the triangle must not
    let close: Vec<f64> = (0..61).map(|i| 100.0 + 20.0 * i as f64 / 60.0).collect();
    let series = make_series(close);

    let triangle = AscendingTriangleDetector::with_defaults()
        .scan(&series)
        .unwrap();
    assert!(triangle.is_empty());

    let corridor = AscendingCorridorDetector::with_defaults()
        .scan(&series)
        .unwrap();
    assert!(!corridor.is_empty());
}

// ============================================================
// ENGINE BEHAVIOUR
// ============================================================

#[test]
fn test_short_series_yields_no_matches() {
    // 50 bars is below every detector window (60..120)
    let close = polyline(&[(0, 90.0), (10, 100.0), (25, 80.0), (40, 100.0), (49, 90.0)]);
    let series = make_series(close);

    let result = detect_all(&series).unwrap();
    assert!(result.is_empty());
}

#[test]
fn test_missing_close_column() {
    let mut series = make_series(vec![100.0; 80]);
    series.close = Vec::new();

    let err = detect_all(&series).unwrap_err();
    assert_eq!(err, PatternError::MissingColumn("Price_Close"));
}

#[test]
fn test_channel_detector_requires_high_low() {
    let mut series = make_series(vec![100.0; 80]);
    series.high = Vec::new();

    let err = AscendingCorridorDetector::with_defaults()
        .scan(&series)
        .unwrap_err();
    assert_eq!(err, PatternError::MissingColumn("Price_High"));
}

#[test]
fn test_detect_all_groups_by_kind() {
    let close = polyline(&[(0, 90.0), (10, 100.0), (25, 80.0), (40, 100.0), (60, 89.0)]);
    let series = make_series(close);

    let result = detect_all(&series).unwrap();
    let tops = result.matches(PatternKind::DoubleTop);
    assert_eq!(tops.len(), 1);
    assert_eq!(tops[0].ticker, "TEST");
    // every reported kind must actually carry matches
    for (_, matches) in result.iter() {
        assert!(!matches.is_empty());
    }
}

#[test]
fn test_detect_all_is_deterministic() {
    let close = polyline(&[
        (0, 92.0),
        (15, 100.0),
        (30, 85.0),
        (45, 115.0),
        (60, 85.0),
        (75, 100.0),
        (120, 90.0),
    ]);
    let series = make_series(close);

    let first = detect_all(&series).unwrap();
    let second = detect_all(&series).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_overlapping_windows_report_repeatedly() {
    // widen the double-top series so several windows cover the formation;
    // the detector is exhaustive and must not deduplicate
    let close = polyline(&[
        (0, 90.0),
        (10, 100.0),
        (25, 80.0),
        (40, 100.0),
        (70, 89.0),
    ]);
    let series = make_series(close);

    let matches = DoubleTopDetector::with_defaults().scan(&series).unwrap();
    assert!(matches.len() > 1);
    // all report the same underlying peaks, shifted with the window
    for m in &matches {
        assert!(approx(m.resistance.unwrap(), 100.0));
    }
}

#[test]
fn test_scan_parallel_merges_per_ticker() {
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

    let close = polyline(&[(0, 90.0), (10, 100.0), (25, 80.0), (40, 100.0), (60, 89.0)]);
    let mut a = make_series(close.clone());
    a.ticker = "AAA".into();
    let mut b = make_series(close);
    b.ticker = "BBB".into();

    let universe = vec![&a, &b];
    let (results, errors) = scan_parallel(&engine, universe);
    assert!(errors.is_empty());
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].ticker, "AAA");
    assert_eq!(results[1].ticker, "BBB");

    let mut global = DetectionResult::new();
    for r in results {
        global.merge(r.result);
    }
    let tops = global.matches(PatternKind::DoubleTop);
    assert_eq!(tops.len(), 2);
    assert_eq!(tops[0].ticker, "AAA");
    assert_eq!(tops[1].ticker, "BBB");
}
