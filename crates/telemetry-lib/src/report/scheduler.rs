//! Scheduled report generation

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::{PerformanceReport, ReportGenerator};
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::pipeline::tick_interval;

const LOOP_NAME: &str = "reporter";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportScheduleConfig {
    /// Time between reports (default: 24 hours)
    pub interval: Duration,
    /// Window covered by each report (default: 24 hours)
    pub window_hours: i64,
    /// Reports kept in memory (default: 30)
    pub retained_reports: usize,
}

impl Default for ReportScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            window_hours: 24,
            retained_reports: 30,
        }
    }
}

/// Destination for scheduled reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, report: &PerformanceReport) -> AnyResult<()>;
}

/// Sink that logs a one-line summary of each report
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    async fn deliver(&self, report: &PerformanceReport) -> AnyResult<()> {
        let meta = &report.report_metadata;
        info!(
            period_hours = meta.period_hours,
            data_points = meta.data_points,
            avg_efficiency = report.aggregated_metrics.efficiency.avg,
            alert_types = report.alert_summary.len(),
            recommendations = report.recommendations.len(),
            "Scheduled performance report"
        );
        Ok(())
    }
}

/// Generates a report every interval and hands it to a sink
pub struct ReportScheduler {
    generator: ReportGenerator,
    sink: Arc<dyn ReportSink>,
    config: ReportScheduleConfig,
    recent: RwLock<VecDeque<PerformanceReport>>,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: PipelineMetrics,
}

impl ReportScheduler {
    pub fn new(generator: ReportGenerator, config: ReportScheduleConfig) -> Self {
        Self {
            generator,
            sink: Arc::new(LogSink),
            recent: RwLock::new(VecDeque::with_capacity(config.retained_reports.min(64))),
            config,
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("telemetry"),
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
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

    /// Run until `shutdown` fires. The first report is produced one full
    /// interval after start.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            window_hours = self.config.window_hours,
            "Starting report scheduler"
        );
        self.health.register(components::REPORTER).await;

        let period = tick_interval(self.config.interval);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

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
                        .record_tick(components::REPORTER, result.as_ref().map(|_| ()))
                        .await;
                    if let Err(e) = result {
                        self.metrics.inc_tick_failures(LOOP_NAME);
                        self.logger.log_tick_failed(LOOP_NAME, &e, 0);
                    }
                }
            }
        }
        info!("Shutting down report scheduler");
    }

    /// Generate, retain and deliver one report
    pub async fn tick(&self) -> Result<PerformanceReport> {
        let report = self.generator.generate(self.config.window_hours).await?;
        self.retain(report.clone()).await;

        if let Err(e) = self.sink.deliver(&report).await {
            warn!(error = %e, "Failed to deliver scheduled report");
        }
        Ok(report)
    }

    async fn retain(&self, report: PerformanceReport) {
        let mut recent = self.recent.write().await;
        while recent.len() >= self.config.retained_reports.max(1) {
            recent.pop_front();
        }
        recent.push_back(report);
    }

    /// Retained reports, newest first
    pub async fn recent_reports(&self) -> Vec<PerformanceReport> {
        self.recent.read().await.iter().rev().cloned().collect()
    }
}
