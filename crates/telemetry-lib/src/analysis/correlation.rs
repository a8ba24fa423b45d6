use crate::models::{MetricSample, Prediction, TrackedMetric};
use crate::stats::pearson_correlation;

pub const CORRELATION_CONFIDENCE: f64 = 0.9;

/// Metric pairs whose correlation is tracked
pub const CORRELATION_PAIRS: [(TrackedMetric, TrackedMetric); 3] = [
    (TrackedMetric::Throughput, TrackedMetric::Power),
    (TrackedMetric::Throughput, TrackedMetric::Temperature),
    (TrackedMetric::Efficiency, TrackedMetric::Temperature),
];

/// Pearson correlation for each tracked pair.
///
/// Returns nothing when fewer than `min_samples` are available. Pairs where
/// either series is constant have no defined coefficient and are skipped.
pub fn detect_correlations(
    samples: &[MetricSample],
    min_samples: usize,
    timestamp: i64,
) -> Vec<Prediction> {
    if samples.len() < min_samples.max(2) {
        return Vec::new();
    }

    CORRELATION_PAIRS
        .iter()
        .filter_map(|(a, b)| {
            let xs: Vec<f64> = samples.iter().map(|s| a.value_of(s)).collect();
            let ys: Vec<f64> = samples.iter().map(|s| b.value_of(s)).collect();
            pearson_correlation(&xs, &ys).map(|r| Prediction {
                timestamp,
                prediction_type: format!("{}_{}_correlation", a.key(), b.key()),
                predicted_value: r,
                confidence: CORRELATION_CONFIDENCE,
                time_horizon_hours: 1,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitReading;

    fn samples(count: usize) -> Vec<MetricSample> {
        (0..count)
            .map(|i| {
                let x = i as f64;
                MetricSample::from_reading(
                    "rig-1",
                    i as i64,
                    UnitReading {
                        throughput: 100.0 + x,
                        power_watts: 300.0 + 2.0 * x,
                        temperature_c: 90.0 - 0.1 * x,
                        uptime_hours: 1.0,
                    },
                    50,
                    "sha256",
                    0.2,
                )
            })
            .collect()
    }

    #[test]
    fn test_requires_minimum_samples() {
        assert!(detect_correlations(&samples(99), 100, 0).is_empty());
        assert_eq!(detect_correlations(&samples(100), 100, 0).len(), 3);
    }

    #[test]
    fn test_correlation_values_and_shape() {
        let predictions = detect_correlations(&samples(200), 100, 42);

        let tp = predictions
            .iter()
            .find(|p| p.prediction_type == "throughput_power_correlation")
            .unwrap();
        assert!((tp.predicted_value - 1.0).abs() < 1e-9);
        assert_eq!(tp.confidence, 0.9);
        assert_eq!(tp.time_horizon_hours, 1);
        assert_eq!(tp.timestamp, 42);

        let tt = predictions
            .iter()
            .find(|p| p.prediction_type == "throughput_temperature_correlation")
            .unwrap();
        assert!(tt.predicted_value < -0.99);

        assert!(predictions
            .iter()
            .all(|p| (-1.0..=1.0).contains(&p.predicted_value)));
    }

    #[test]
    fn test_constant_metric_pair_is_skipped() {
        let mut flat = samples(150);
        for s in &mut flat {
            s.temperature_c = 70.0;
        }

        let types: Vec<_> = detect_correlations(&flat, 100, 0)
            .into_iter()
            .map(|p| p.prediction_type)
            .collect();
        assert_eq!(types, vec!["throughput_power_correlation"]);
    }
}
