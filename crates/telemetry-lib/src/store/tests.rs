use super::*;
use crate::models::{KpiName, UnitReading};
use tempfile::TempDir;

fn sample(unit: &str, timestamp: i64, throughput: f64, power: f64, temp: f64) -> MetricSample {
    MetricSample::from_reading(
        unit,
        timestamp,
        UnitReading {
            throughput,
            power_watts: power,
            temperature_c: temp,
            uptime_hours: 1.0,
        },
        50,
        "sha256",
        0.20,
    )
}

fn prediction(timestamp: i64, kind: &str, value: f64, confidence: f64) -> Prediction {
    Prediction {
        timestamp,
        prediction_type: kind.to_string(),
        predicted_value: value,
        confidence,
        time_horizon_hours: 24,
    }
}

#[test]
fn test_write_tick_round_trips_samples() {
    let store = MetricsStore::open_in_memory().unwrap();
    let s = sample("rig-1", 1_000, 120.0, 320.0, 68.0);
    store.write_tick(&[s.clone()], &[], &[]).unwrap();

    let samples = store.samples_between(0, i64::MAX).unwrap();
    assert_eq!(samples, vec![s]);
}

#[test]
fn test_windowed_queries_exclude_boundary_and_older_rows() {
    let store = MetricsStore::open_in_memory().unwrap();
    store
        .write_tick(
            &[
                sample("a", 100, 10.0, 100.0, 50.0),
                sample("a", 200, 20.0, 100.0, 60.0),
                sample("a", 300, 30.0, 100.0, 70.0),
            ],
            &[],
            &[],
        )
        .unwrap();

    let samples = store.samples_between(200, i64::MAX).unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].timestamp, 300);

    let agg = store.aggregate_between(100, i64::MAX).unwrap();
    assert_eq!(agg.data_points, 2);
    assert_eq!(agg.throughput.avg, 25.0);
    assert_eq!(agg.throughput.min, 20.0);
    assert_eq!(agg.throughput.max, 30.0);
    assert_eq!(agg.temperature.max, 70.0);
}

#[test]
fn test_windowed_queries_include_until_and_exclude_later_rows() {
    let store = MetricsStore::open_in_memory().unwrap();
    store
        .write_tick(
            &[
                sample("a", 100, 10.0, 100.0, 50.0),
                sample("a", 200, 20.0, 100.0, 60.0),
                sample("a", 300, 900.0, 100.0, 70.0),
            ],
            &[
                KpiValue::new(200, KpiName::ReliabilityScore, 1.0),
                KpiValue::new(300, KpiName::ReliabilityScore, 0.0),
            ],
            &[
                Alert::new(200, AlertType::LowEfficiency, Severity::High, "now"),
                Alert::new(300, AlertType::HighTemperature, Severity::Critical, "later"),
            ],
        )
        .unwrap();
    store
        .insert_predictions(&[
            prediction(200, "power_trend", 0.1, 0.8),
            prediction(300, "power_trend", 0.9, 0.8),
        ])
        .unwrap();

    let samples = store.samples_between(0, 200).unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1].timestamp, 200);

    let agg = store.aggregate_between(0, 200).unwrap();
    assert_eq!(agg.data_points, 2);
    assert_eq!(agg.throughput.max, 20.0);

    assert_eq!(store.hourly_averages_between(0, 200).unwrap()[0].samples, 2);
    assert_eq!(store.kpi_stats_between(0, 200).unwrap()["reliability_score"].min, 1.0);

    let predictions = store.predictions_between(0, 200).unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].predicted_value, 0.1);

    let alerts = store.alert_summary_between(0, 200).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::LowEfficiency);

    let overview = store.overview_between(0, 200).unwrap();
    assert_eq!(overview.data_points, 2);
    assert_eq!(overview.last_update, Some(200));
}

#[tokio::test]
async fn test_run_blocking_uses_the_shared_store() {
    let store = std::sync::Arc::new(MetricsStore::open_in_memory().unwrap());
    store
        .run_blocking(|s| s.write_tick(&[sample("rig-1", 10, 1.0, 2.0, 3.0)], &[], &[]))
        .await
        .unwrap();

    let count = store
        .run_blocking(|s| Ok(s.samples_between(0, i64::MAX)?.len()))
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_aggregate_over_empty_window_is_zeroed() {
    let store = MetricsStore::open_in_memory().unwrap();
    let agg = store.aggregate_between(0, i64::MAX).unwrap();
    assert_eq!(agg, MetricAggregates::default());

    let overview = store.overview_between(0, i64::MAX).unwrap();
    assert_eq!(overview.data_points, 0);
    assert_eq!(overview.last_update, None);
}

#[test]
fn test_recent_samples_returns_latest_in_chronological_order() {
    let store = MetricsStore::open_in_memory().unwrap();
    let samples: Vec<_> = (0..10)
        .map(|i| sample("a", 1_000 + i, i as f64, 100.0, 60.0))
        .collect();
    store.write_tick(&samples, &[], &[]).unwrap();

    let recent = store.recent_samples(3).unwrap();
    let timestamps: Vec<_> = recent.iter().map(|s| s.timestamp).collect();
    assert_eq!(timestamps, vec![1_007, 1_008, 1_009]);
}

#[test]
fn test_hourly_averages_bucket_by_absolute_hour() {
    let store = MetricsStore::open_in_memory().unwrap();
    let base = 3600 * 100;
    store
        .write_tick(
            &[
                sample("a", base + 10, 100.0, 400.0, 60.0),
                sample("b", base + 20, 200.0, 400.0, 70.0),
                sample("a", base + 3600, 50.0, 400.0, 80.0),
            ],
            &[],
            &[],
        )
        .unwrap();

    let buckets = store.hourly_averages_between(0, i64::MAX).unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].hour_bucket, 100);
    assert_eq!(buckets[0].throughput, 150.0);
    assert_eq!(buckets[0].samples, 2);
    assert_eq!(buckets[1].value(TrackedMetric::Temperature), 80.0);
}

#[test]
fn test_prediction_confidence_is_stored_exactly() {
    let store = MetricsStore::open_in_memory().unwrap();
    store
        .insert_predictions(&[prediction(500, "power_trend", -0.25, 0.8)])
        .unwrap();

    let predictions = store.predictions_between(0, i64::MAX).unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].confidence, 0.8);
    assert_eq!(predictions[0].predicted_value, -0.25);
}

#[test]
fn test_predictions_are_newest_first() {
    let store = MetricsStore::open_in_memory().unwrap();
    store
        .insert_predictions(&[
            prediction(100, "throughput_trend", 0.1, 0.8),
            prediction(300, "throughput_trend", 0.3, 0.8),
            prediction(200, "throughput_trend", 0.2, 0.8),
        ])
        .unwrap();

    let values: Vec<_> = store
        .predictions_between(150, i64::MAX)
        .unwrap()
        .iter()
        .map(|p| p.timestamp)
        .collect();
    assert_eq!(values, vec![300, 200]);
}

#[test]
fn test_kpi_stats_and_latest_values() {
    let store = MetricsStore::open_in_memory().unwrap();
    store
        .write_tick(
            &[],
            &[
                KpiValue::new(10, KpiName::ReliabilityScore, 0.5),
                KpiValue::new(20, KpiName::ReliabilityScore, 1.0),
                KpiValue::new(20, KpiName::ThroughputPerWatt, 0.3),
            ],
            &[],
        )
        .unwrap();

    let stats = store.kpi_stats_between(0, i64::MAX).unwrap();
    assert_eq!(stats["reliability_score"].avg, 0.75);
    assert_eq!(stats["reliability_score"].min, 0.5);
    assert_eq!(stats["throughput_per_watt"].max, 0.3);

    let latest = store.latest_kpis().unwrap();
    assert_eq!(latest.len(), 2);
    let reliability = latest
        .iter()
        .find(|k| k.name == KpiName::ReliabilityScore)
        .unwrap();
    assert_eq!(reliability.value, 1.0);
    assert_eq!(reliability.target, 0.95);
}

#[test]
fn test_alert_summary_reports_count_and_worst_severity() {
    let store = MetricsStore::open_in_memory().unwrap();
    store
        .write_tick(
            &[],
            &[],
            &[
                Alert::new(10, AlertType::HighTemperature, Severity::High, "hot"),
                Alert::new(20, AlertType::HighTemperature, Severity::Critical, "hotter"),
                Alert::new(30, AlertType::LowEfficiency, Severity::Medium, "slow"),
            ],
        )
        .unwrap();

    let summary = store.alert_summary_between(0, i64::MAX).unwrap();
    assert_eq!(summary.len(), 2);
    let temp = summary
        .iter()
        .find(|s| s.alert_type == AlertType::HighTemperature)
        .unwrap();
    assert_eq!(temp.count, 2);
    assert_eq!(temp.max_severity, Severity::Critical);
}

#[test]
fn test_resolve_alert_removes_it_from_unresolved() {
    let store = MetricsStore::open_in_memory().unwrap();
    store
        .write_tick(
            &[],
            &[],
            &[
                Alert::new(10, AlertType::LowEfficiency, Severity::High, "first"),
                Alert::new(20, AlertType::HighPowerConsumption, Severity::Medium, "second"),
            ],
        )
        .unwrap();

    let unresolved = store.unresolved_alerts(10).unwrap();
    assert_eq!(unresolved.len(), 2);
    assert_eq!(unresolved[0].message, "second");

    let id = unresolved[0].id.unwrap();
    assert!(store.resolve_alert(id).unwrap());
    assert!(!store.resolve_alert(id).unwrap());

    let unresolved = store.unresolved_alerts(10).unwrap();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].message, "first");
    assert!(!unresolved[0].resolved);
}

#[test]
fn test_file_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("telemetry.db");

    {
        let store = MetricsStore::open(&path).unwrap();
        store
            .write_tick(&[sample("rig-1", 42, 1.0, 2.0, 3.0)], &[], &[])
            .unwrap();
    }

    let store = MetricsStore::open(&path).unwrap();
    let overview = store.overview_between(0, i64::MAX).unwrap();
    assert_eq!(overview.data_points, 1);
    assert_eq!(overview.last_update, Some(42));
}
