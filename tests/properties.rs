//! Property tests for the detection leaves and the engine.

use chartscan::prelude::*;
use chrono::NaiveDate;
use proptest::prelude::*;

fn make_series(close: Vec<f64>) -> PriceSeries {
    let n = close.len();
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    PriceSeries {
        ticker: "PROP".into(),
        dates: (0..n)
            .map(|i| base + chrono::Duration::days(i as i64))
            .collect(),
        open: close.clone(),
        high: close.iter().map(|c| c + 1.0).collect(),
        low: close.iter().map(|c| c - 1.0).collect(),
        volume: vec![1_000; n],
        ma20: vec![None; n],
        ma50: vec![None; n],
        daily_return: vec![None; n],
        volatility: vec![None; n],
        close,
    }
}

proptest! {
    #[test]
    fn extrema_idempotent_separated_and_interior(
        values in prop::collection::vec(50.0f64..150.0, 10..200),
        separation in 1usize..12,
    ) {
        let first = find_extrema(&values, separation, 0.02).unwrap();
        let second = find_extrema(&values, separation, 0.02).unwrap();
        prop_assert_eq!(&first, &second);

        let (peaks, troughs) = first;
        prop_assert!(peaks.windows(2).all(|w| w[1] - w[0] >= separation));
        prop_assert!(troughs.windows(2).all(|w| w[1] - w[0] >= separation));
        for &p in peaks.iter().chain(troughs.iter()) {
            prop_assert!(p > 0 && p < values.len() - 1, "edges never qualify");
        }
    }

    #[test]
    fn linear_trend_fits_exact_lines(
        intercept in 1.0f64..200.0,
        slope in -2.0f64..2.0,
        len in 2usize..100,
    ) {
        let values: Vec<f64> = (0..len).map(|i| intercept + slope * i as f64).collect();
        let fit = linear_trend(&values).unwrap();
        prop_assert!((fit.slope - slope).abs() < 1e-6);
        prop_assert_eq!(fit.fitted.len(), len);
        prop_assert!((fit.end_value() - values[len - 1]).abs() < 1e-6);
    }

    #[test]
    fn detect_all_deterministic_and_bounded(
        close in prop::collection::vec(50.0f64..150.0, 30..140),
    ) {
        let series = make_series(close);
        let n = series.len();

        let first = detect_all(&series).unwrap();
        let second = detect_all(&series).unwrap();
        prop_assert_eq!(&first, &second);

        for (kind, matches) in first.iter() {
            for m in matches {
                prop_assert_eq!(m.kind, kind);
                prop_assert_eq!(m.ticker.as_str(), "PROP");
                prop_assert!(m.window_start < m.window_end);
                prop_assert!(m.window_end <= n);
                prop_assert!(m.start_date <= m.end_date);
                if let MatchDetail::Extrema { peaks, troughs } = &m.detail {
                    prop_assert!(peaks.windows(2).all(|w| w[0] < w[1]));
                    prop_assert!(troughs.windows(2).all(|w| w[0] < w[1]));
                }
            }
        }
    }

    #[test]
    fn sub_window_series_never_match(
        close in prop::collection::vec(50.0f64..150.0, 1..60),
    ) {
        let series = make_series(close);
        let result = detect_all(&series).unwrap();
        prop_assert!(result.is_empty());
    }

    #[test]
    fn from_daily_accepts_clean_feed_columns(
        close in prop::collection::vec(50.0f64..150.0, 30..100),
    ) {
        let n = close.len();
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..n)
            .map(|i| base + chrono::Duration::days(i as i64))
            .collect();
        let open = close.clone();
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();

        let series =
            PriceSeries::from_daily("PROP", dates, open, high, low, close, vec![100; n]).unwrap();
        prop_assert_eq!(series.len(), n);
        prop_assert!(series.daily_return[0].is_none());
        prop_assert!(series.ma20.iter().take(19).all(Option::is_none));

        // a freshly ingested series always scans cleanly
        prop_assert!(detect_all(&series).is_ok());
    }
}
