//! Endpoint-slope trend classification.
//!
//! `slope = (last - first) / window` over the last `window` rated rows. This
//! is a coarse heuristic, not a least-squares fit.

use agentrace_utils::types::{HistoryRow, signal_id};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trend {
    InsufficientData,
    Improving,
    Flat,
    Degrading,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub signal_id: String,
    pub agent_type: String,
    pub artifact: String,
    pub trend: Trend,
    /// `None` when there were fewer than two rated points.
    pub slope: Option<f64>,
    pub points: usize,
    pub window: usize,
}

/// Classify the last `window` rated values of `rows` (append order).
/// Rows with a null rate are skipped.
#[must_use]
pub fn classify(rows: &[HistoryRow], window: usize, band: f64) -> (Trend, Option<f64>, usize) {
    let rates: Vec<f64> = rows.iter().filter_map(|r| r.rate).collect();
    let tail = &rates[rates.len().saturating_sub(window)..];

    let (Some(first), Some(last)) = (tail.first(), tail.last()) else {
        return (Trend::InsufficientData, None, tail.len());
    };
    if tail.len() < 2 {
        return (Trend::InsufficientData, None, tail.len());
    }

    let slope = (last - first) / window as f64;
    let trend = if slope > band {
        Trend::Improving
    } else if slope < -band {
        Trend::Degrading
    } else {
        Trend::Flat
    };
    (trend, Some(slope), tail.len())
}

/// Build a report for one signal from its already-filtered rows.
#[must_use]
pub fn report(agent_type: &str, artifact: &str, rows: &[HistoryRow], window: usize, band: f64) -> TrendReport {
    let (trend, slope, points) = classify(rows, window, band);
    TrendReport {
        signal_id: signal_id(agent_type, artifact),
        agent_type: agent_type.to_string(),
        artifact: artifact.to_string(),
        trend,
        slope,
        points,
        window,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrace_utils::test_support::{base_time, history_series};
    use proptest::prelude::*;

    fn rows(rates: &[f64]) -> Vec<HistoryRow> {
        let rates: Vec<Option<f64>> = rates.iter().copied().map(Some).collect();
        history_series("implementer", "summary.md", base_time(), &rates)
    }

    fn trend_of(rates: &[f64]) -> Trend {
        classify(&rows(rates), 5, 0.05).0
    }

    #[test]
    fn test_reference_series() {
        assert_eq!(trend_of(&[0.20, 0.30, 0.45, 0.55, 0.70]), Trend::Improving);
        assert_eq!(trend_of(&[0.80, 0.70, 0.55, 0.40, 0.30]), Trend::Degrading);
        assert_eq!(trend_of(&[0.50, 0.51, 0.49, 0.50, 0.51]), Trend::Flat);
        assert_eq!(trend_of(&[0.50]), Trend::InsufficientData);
        assert_eq!(trend_of(&[]), Trend::InsufficientData);
    }

    #[test]
    fn test_only_last_window_counts() {
        // An old collapse falls outside the window.
        let (trend, slope, points) = classify(&rows(&[0.9, 0.1, 0.5, 0.5, 0.5, 0.5, 0.5]), 5, 0.05);
        assert_eq!(trend, Trend::Flat);
        assert_eq!(slope, Some(0.0));
        assert_eq!(points, 5);
    }

    #[test]
    fn test_null_rates_are_skipped() {
        let series = history_series(
            "implementer",
            "summary.md",
            base_time(),
            &[Some(0.2), None, None, Some(0.8)],
        );
        let (trend, _, points) = classify(&series, 5, 0.05);
        assert_eq!(points, 2);
        assert_eq!(trend, Trend::Improving);
    }

    #[test]
    fn test_report_carries_signal() {
        let r = report("tester", "diff.patch", &rows(&[0.1, 0.1]), 5, 0.05);
        assert_eq!(r.signal_id, "tester.diff.patch");
        assert_eq!(r.trend, Trend::Flat);
        assert_eq!(Trend::InsufficientData.as_ref(), "insufficient_data");
    }

    proptest! {
        #[test]
        fn prop_constant_series_is_flat(rate in 0.0f64..=1.0, len in 2usize..20) {
            let series = vec![rate; len];
            prop_assert_eq!(classify(&rows(&series), 5, 0.05).0, Trend::Flat);
        }

        #[test]
        fn prop_trend_matches_slope_band(rates in proptest::collection::vec(0.0f64..=1.0, 2..20)) {
            let (trend, slope, _) = classify(&rows(&rates), 5, 0.05);
            let slope = slope.unwrap();
            match trend {
                Trend::Improving => prop_assert!(slope > 0.05),
                Trend::Degrading => prop_assert!(slope < -0.05),
                Trend::Flat => prop_assert!((-0.05..=0.05).contains(&slope)),
                Trend::InsufficientData => prop_assert!(false, "two or more points"),
            }
        }
    }
}
