use crate::models::{Prediction, TrackedMetric};
use crate::stats::{linear_regression_slope, normalize_trend};
use crate::store::HourlyAverages;

pub const TREND_CONFIDENCE: f64 = 0.8;

/// Direction of one metric across hourly buckets
#[derive(Debug, Clone, PartialEq)]
pub struct Trend {
    pub metric: TrackedMetric,
    /// Raw least-squares slope, metric units per hour
    pub slope: f64,
    /// Slope squashed into [-1, 1]
    pub normalized: f64,
    pub buckets: usize,
}

impl Trend {
    pub fn to_prediction(&self, timestamp: i64, horizon_hours: u32) -> Prediction {
        Prediction {
            timestamp,
            prediction_type: self.metric.trend_type(),
            predicted_value: self.normalized,
            confidence: TREND_CONFIDENCE,
            time_horizon_hours: horizon_hours,
        }
    }
}

/// One trend per tracked metric. Fewer than two buckets carry no direction,
/// so nothing is returned for them.
pub fn analyze_trends(buckets: &[HourlyAverages]) -> Vec<Trend> {
    if buckets.len() < 2 {
        return Vec::new();
    }

    TrackedMetric::ALL
        .into_iter()
        .map(|metric| {
            let values: Vec<f64> = buckets.iter().map(|b| b.value(metric)).collect();
            let slope = linear_regression_slope(&values);
            Trend {
                metric,
                slope,
                normalized: normalize_trend(slope, metric.trend_scale()),
                buckets: buckets.len(),
            }
        })
        .collect()
}
