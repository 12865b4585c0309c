use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Which deviations from the baseline count as anomalous.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Drop,
    Rise,
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Assessment {
    pub baseline: Option<f64>,
    pub deviation_pct: Option<f64>,
    pub anomalous: bool,
}

/// Decides whether the newest point of a per-cow series is out of line with
/// its history.
pub trait AnomalyRule: Send + Sync {
    /// How far before the newest point the rule looks. Older points may be
    /// dropped by the caller.
    fn lookback(&self) -> Duration;

    /// `series` is ordered oldest first; the last point is the one assessed.
    fn assess(&self, series: &[SeriesPoint]) -> Assessment;
}

/// Flags the newest point when it differs from the mean of the earlier points
/// within `baseline_days` by more than `threshold_pct` percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingMeanDeviation {
    pub baseline_days: i64,
    pub threshold_pct: f64,
    pub direction: Direction,
}

impl Default for TrailingMeanDeviation {
    fn default() -> Self {
        Self {
            baseline_days: 30,
            threshold_pct: 5.0,
            direction: Direction::Drop,
        }
    }
}

impl AnomalyRule for TrailingMeanDeviation {
    fn lookback(&self) -> Duration {
        Duration::try_days(self.baseline_days).unwrap_or(Duration::MAX)
    }

    fn assess(&self, series: &[SeriesPoint]) -> Assessment {
        let Some((latest, prior)) = series.split_last() else {
            return Assessment::default();
        };
        let window_start = window_start(latest.timestamp, self.lookback());
        let (sum, count) = prior
            .iter()
            .filter(|point| point.timestamp >= window_start)
            .fold((0.0, 0usize), |(sum, count), point| (sum + point.value, count + 1));
        if count == 0 {
            return Assessment::default();
        }

        let baseline = sum / count as f64;
        if baseline == 0.0 {
            return Assessment {
                baseline: Some(baseline),
                ..Assessment::default()
            };
        }

        let deviation_pct = (latest.value - baseline) / baseline.abs() * 100.0;
        let anomalous = match self.direction {
            Direction::Drop => deviation_pct < -self.threshold_pct,
            Direction::Rise => deviation_pct > self.threshold_pct,
            Direction::Either => deviation_pct.abs() > self.threshold_pct,
        };
        Assessment {
            baseline: Some(baseline),
            deviation_pct: Some(deviation_pct),
            anomalous,
        }
    }
}

/// Earliest timestamp inside a `lookback` window ending at `latest`, clamped
/// to the oldest representable instant.
pub(crate) fn window_start(latest: DateTime<Utc>, lookback: Duration) -> DateTime<Utc> {
    latest
        .checked_sub_signed(lookback)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn point(day: u32, value: f64) -> SeriesPoint {
        SeriesPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap(),
            value,
        }
    }

    #[test]
    fn single_point_has_no_baseline() {
        let assessment = TrailingMeanDeviation::default().assess(&[point(1, 420.0)]);
        assert_eq!(assessment, Assessment::default());
    }

    #[test]
    fn drop_beyond_threshold_is_flagged() {
        let rule = TrailingMeanDeviation::default();
        let series = [point(1, 400.0), point(2, 400.0), point(3, 379.0)];
        let assessment = rule.assess(&series);
        assert_eq!(assessment.baseline, Some(400.0));
        assert!(assessment.anomalous);

        let mild = [point(1, 400.0), point(2, 400.0), point(3, 381.0)];
        assert!(!rule.assess(&mild).anomalous);
    }

    #[test]
    fn rise_is_ignored_unless_configured() {
        let series = [point(1, 400.0), point(2, 460.0)];
        assert!(!TrailingMeanDeviation::default().assess(&series).anomalous);

        let either = TrailingMeanDeviation {
            direction: Direction::Either,
            ..TrailingMeanDeviation::default()
        };
        assert!(either.assess(&series).anomalous);
    }

    #[test]
    fn points_outside_the_window_are_ignored() {
        let rule = TrailingMeanDeviation {
            baseline_days: 5,
            ..TrailingMeanDeviation::default()
        };
        // Only day 20 is within five days of day 22.
        let series = [point(1, 600.0), point(20, 400.0), point(22, 395.0)];
        let assessment = rule.assess(&series);
        assert_eq!(assessment.baseline, Some(400.0));
        assert!(!assessment.anomalous);
    }

    #[test]
    fn huge_lookback_uses_every_prior_point() {
        let rule = TrailingMeanDeviation {
            baseline_days: i64::MAX,
            ..TrailingMeanDeviation::default()
        };
        let series = [point(1, 400.0), point(2, 400.0), point(3, 300.0)];
        let assessment = rule.assess(&series);
        assert_eq!(assessment.baseline, Some(400.0));
        assert!(assessment.anomalous);
        assert_eq!(window_start(point(3, 0.0).timestamp, rule.lookback()), DateTime::<Utc>::MIN_UTC);
    }
}
