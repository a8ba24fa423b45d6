//! Prediction scheduling loop
//!
//! Pulls the trailing window from the store every interval and persists one
//! forecast per tracked metric. Ticks with too little history are skipped.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{ForecastModel, Forecaster, MIN_HISTORY, RECENT_VALUES};
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::models::{Prediction, TrackedMetric};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::pipeline::{sleep_or_shutdown, tick_interval};
use crate::store::MetricsStore;

const LOOP_NAME: &str = "predictor";

pub const FORECAST_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Time between ticks (default: 5 minutes)
    pub interval: Duration,
    /// Trailing history window (default: 24 hours)
    pub window_hours: u32,
    /// Samples required before forecasting (default: 100)
    pub min_samples: usize,
    /// Trailing values used by the forecaster (default: 10)
    pub recent_values: usize,
    /// Forecast horizon (default: 24 hours)
    pub horizon_hours: u32,
    pub model: ForecastModel,
    /// Pause after a failed tick (default: 60 seconds)
    pub error_backoff: Duration,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            window_hours: 24,
            min_samples: MIN_HISTORY,
            recent_values: RECENT_VALUES,
            horizon_hours: 24,
            model: ForecastModel::default(),
            error_backoff: Duration::from_secs(60),
        }
    }
}

pub struct PredictionScheduler {
    store: Arc<MetricsStore>,
    forecaster: Arc<dyn Forecaster>,
    config: PredictionConfig,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: PipelineMetrics,
}

impl PredictionScheduler {
    /// Scheduler using the forecaster selected by `config.model`
    pub fn new(store: Arc<MetricsStore>, config: PredictionConfig) -> Self {
        let forecaster = config.model.build(config.min_samples, config.recent_values);
        Self {
            store,
            forecaster,
            config,
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("telemetry"),
            metrics: PipelineMetrics::new(),
        }
    }

    /// Replace the configured model with a custom forecaster
    pub fn with_forecaster(mut self, forecaster: Arc<dyn Forecaster>) -> Self {
        self.forecaster = forecaster;
        self
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
            model = self.forecaster.name(),
            horizon_hours = self.config.horizon_hours,
            "Starting prediction scheduler"
        );
        self.health.register(components::PREDICTOR).await;

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
                        .record_tick(components::PREDICTOR, result.as_ref().map(|_| ()))
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
        info!("Shutting down prediction scheduler");
    }

    pub async fn tick(&self) -> Result<usize> {
        self.tick_at(chrono::Utc::now().timestamp()).await
    }

    /// Forecast from the window ending at `now`; returns the number stored
    pub async fn tick_at(&self, now: i64) -> Result<usize> {
        let since = now - i64::from(self.config.window_hours) * 3600;
        let samples = self
            .store
            .run_blocking(move |store| store.samples_between(since, now))
            .await?;

        if samples.len() < self.config.min_samples {
            debug!(
                samples = samples.len(),
                required = self.config.min_samples,
                "Insufficient history, skipping forecasts"
            );
            return Ok(0);
        }

        let horizon = self.config.horizon_hours;
        let predictions: Vec<Prediction> = TrackedMetric::ALL
            .into_iter()
            .map(|metric| {
                let history: Vec<f64> = samples.iter().map(|s| metric.value_of(s)).collect();
                Prediction {
                    timestamp: now,
                    prediction_type: metric.prediction_type(horizon),
                    predicted_value: self.forecaster.forecast(&history, metric, horizon),
                    confidence: FORECAST_CONFIDENCE,
                    time_horizon_hours: horizon,
                }
            })
            .collect();

        let predictions = self
            .store
            .run_blocking(move |store| {
                store.insert_predictions(&predictions)?;
                Ok(predictions)
            })
            .await?;
        self.metrics.add_predictions_stored(LOOP_NAME, predictions.len());
        for p in &predictions {
            self.logger.log_forecast(
                &p.prediction_type,
                p.predicted_value,
                self.forecaster.name(),
                samples.len(),
            );
        }

        Ok(predictions.len())
    }
}
