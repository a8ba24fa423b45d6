//! Periodic trend/correlation analysis loop

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{analyze_trends, detect_correlations, Trend};
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::models::Prediction;
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::pipeline::{sleep_or_shutdown, tick_interval};
use crate::store::MetricsStore;

const LOOP_NAME: &str = "analyzer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Time between ticks (default: 60 seconds)
    pub interval: Duration,
    /// Trailing window for hourly trends (default: 24 hours)
    pub window_hours: u32,
    /// Most recent samples used for correlations (default: 1000)
    pub correlation_sample_limit: usize,
    /// Minimum samples before correlations are computed (default: 100)
    pub min_correlation_samples: usize,
    /// Pause after a failed tick (default: 30 seconds)
    pub error_backoff: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            window_hours: 24,
            correlation_sample_limit: 1000,
            min_correlation_samples: 100,
            error_backoff: Duration::from_secs(30),
        }
    }
}

/// Computes hourly trends and metric correlations and stores them as predictions
pub struct TrendAnalyzer {
    store: Arc<MetricsStore>,
    config: AnalysisConfig,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: PipelineMetrics,
}

impl TrendAnalyzer {
    pub fn new(store: Arc<MetricsStore>, config: AnalysisConfig) -> Self {
        Self {
            store,
            config,
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("telemetry"),
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            window_hours = self.config.window_hours,
            "Starting trend analyzer"
        );
        self.health.register(components::ANALYZER).await;

        let mut ticker = interval(tick_interval(self.config.interval));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let result = self.tick().await;
                    self.metrics
                        .observe_tick_latency(LOOP_NAME, start.elapsed().as_secs_f64());
                    self.health
                        .record_tick(components::ANALYZER, result.as_ref().map(|_| ()))
                        .await;

                    if let Err(e) = result {
                        self.metrics.inc_tick_failures(LOOP_NAME);
                        self.logger
                            .log_tick_failed(LOOP_NAME, &e, self.config.error_backoff.as_secs());
                        if sleep_or_shutdown(self.config.error_backoff, &mut shutdown).await {
                            break;
                        }
                    }
                }
            }
        }
        info!("Shutting down trend analyzer");
    }

    pub async fn tick(&self) -> Result<usize> {
        self.tick_at(chrono::Utc::now().timestamp()).await
    }

    /// Analyze the window ending at `now`; returns the number of predictions stored
    pub async fn tick_at(&self, now: i64) -> Result<usize> {
        let config = self.config.clone();
        let (trends, predictions) = self
            .store
            .run_blocking(move |store| analyze_window(store, &config, now))
            .await?;

        if predictions.is_empty() {
            return Ok(0);
        }

        self.metrics.add_predictions_stored(LOOP_NAME, predictions.len());
        for trend in &trends {
            self.logger
                .log_trend(trend.metric.key(), trend.slope, trend.normalized, trend.buckets);
        }

        Ok(predictions.len())
    }
}

/// Trends over `(now - window, now]` plus correlations over the latest
/// samples, persisted in one batch
fn analyze_window(
    store: &MetricsStore,
    config: &AnalysisConfig,
    now: i64,
) -> Result<(Vec<Trend>, Vec<Prediction>)> {
    let since = now - i64::from(config.window_hours) * 3600;
    let buckets = store.hourly_averages_between(since, now)?;
    let trends = analyze_trends(&buckets);

    let mut predictions: Vec<_> = trends
        .iter()
        .map(|t| t.to_prediction(now, config.window_hours))
        .collect();

    let recent = store.recent_samples(config.correlation_sample_limit)?;
    let correlations = detect_correlations(&recent, config.min_correlation_samples, now);
    if correlations.is_empty() {
        debug!(
            samples = recent.len(),
            required = config.min_correlation_samples,
            "Skipping correlations"
        );
    }
    predictions.extend(correlations);

    if predictions.is_empty() {
        debug!(buckets = buckets.len(), "Not enough history for analysis");
    } else {
        store.insert_predictions(&predictions)?;
    }
    Ok((trends, predictions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricSample, UnitReading};

    const HOUR: i64 = 3600;
    const NOW: i64 = 1_000 * HOUR;

    fn seed(store: &MetricsStore, hours: i64, per_hour: i64, throughput_at: impl Fn(i64) -> f64) {
        let mut samples = Vec::new();
        for h in 0..hours {
            for i in 0..per_hour {
                let ts = NOW - (hours - h) * HOUR + 60 + i * 10;
                samples.push(MetricSample::from_reading(
                    "rig-1",
                    ts,
                    UnitReading {
                        throughput: throughput_at(h) + (i % 3) as f64,
                        power_watts: 320.0 + (i % 5) as f64,
                        temperature_c: 68.0 + (i % 2) as f64,
                        uptime_hours: 1.0,
                    },
                    50,
                    "sha256",
                    0.2,
                ));
            }
        }
        store.write_tick(&samples, &[], &[]).unwrap();
    }

    #[tokio::test]
    async fn test_tick_persists_trends_and_correlations() {
        let store = Arc::new(MetricsStore::open_in_memory().unwrap());
        seed(&store, 6, 20, |h| 150.0 - h as f64 * 5.0);

        let analyzer = TrendAnalyzer::new(store.clone(), AnalysisConfig::default());
        let written = analyzer.tick_at(NOW).await.unwrap();
        assert_eq!(written, 4 + 3);

        let predictions = store.predictions_between(0, i64::MAX).unwrap();
        let throughput = predictions
            .iter()
            .find(|p| p.prediction_type == "throughput_trend")
            .unwrap();
        assert!(throughput.predicted_value < 0.0);
        assert_eq!(throughput.confidence, 0.8);
        assert_eq!(throughput.time_horizon_hours, 24);

        assert!(predictions
            .iter()
            .any(|p| p.prediction_type == "efficiency_temperature_correlation"));
    }

    #[tokio::test]
    async fn test_short_history_skips_correlations() {
        let store = Arc::new(MetricsStore::open_in_memory().unwrap());
        seed(&store, 3, 10, |_| 120.0);

        let analyzer = TrendAnalyzer::new(store.clone(), AnalysisConfig::default());
        assert_eq!(analyzer.tick_at(NOW).await.unwrap(), 4);
        assert!(store
            .predictions_between(0, i64::MAX)
            .unwrap()
            .iter()
            .all(|p| p.prediction_type.ends_with("_trend")));
    }

    #[tokio::test]
    async fn test_empty_store_writes_nothing() {
        let store = Arc::new(MetricsStore::open_in_memory().unwrap());
        let analyzer = TrendAnalyzer::new(store.clone(), AnalysisConfig::default());

        assert_eq!(analyzer.tick_at(NOW).await.unwrap(), 0);
        assert!(store.predictions_between(0, i64::MAX).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_samples_outside_window_are_ignored() {
        let store = Arc::new(MetricsStore::open_in_memory().unwrap());
        // Steep ramp for most of the history, flat over the last two hours
        seed(&store, 48, 1, |h| if h >= 46 { 120.0 } else { h as f64 * 10.0 });
        store
            .write_tick(
                &[MetricSample::from_reading(
                    "rig-1",
                    NOW + HOUR,
                    UnitReading {
                        throughput: 10_000.0,
                        power_watts: 320.0,
                        temperature_c: 68.0,
                        uptime_hours: 1.0,
                    },
                    50,
                    "sha256",
                    0.2,
                )],
                &[],
                &[],
            )
            .unwrap();

        let config = AnalysisConfig {
            window_hours: 2,
            ..AnalysisConfig::default()
        };
        let analyzer = TrendAnalyzer::new(store.clone(), config);
        assert_eq!(analyzer.tick_at(NOW).await.unwrap(), 4);

        let trend = store
            .predictions_between(0, i64::MAX)
            .unwrap()
            .into_iter()
            .find(|p| p.prediction_type == "throughput_trend")
            .unwrap();
        assert_eq!(trend.time_horizon_hours, 2);
        assert_eq!(trend.predicted_value, 0.0);
    }

    #[tokio::test]
    async fn test_zero_interval_runs_and_stops() {
        let store = Arc::new(MetricsStore::open_in_memory().unwrap());
        let config = AnalysisConfig {
            interval: Duration::ZERO,
            ..AnalysisConfig::default()
        };
        let health = HealthRegistry::new();
        let analyzer = TrendAnalyzer::new(store, config).with_health(health.clone());

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(analyzer.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("analyzer did not stop")
            .unwrap();
        assert!(health.health().await.components.contains_key(components::ANALYZER));
    }
}
