//! Pipeline supervisor
//!
//! Owns the shared store, buffer and registry, spawns the collector,
//! analyzer, predictor and (optionally) report loops, and stops them
//! cooperatively through a broadcast channel.

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::alerting::{AlertMode, AlertThresholds, LogNotifier, Notifier};
use crate::analysis::{AnalysisConfig, TrendAnalyzer};
use crate::buffer::RealtimeBuffer;
use crate::collector::{CollectionConfig, CollectionLoopBuilder};
use crate::dashboard::TelemetryDashboard;
use crate::health::{components, HealthRegistry};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::predictor::{PredictionConfig, PredictionScheduler};
use crate::report::{
    LogSink, RecommendationRules, ReportGenerator, ReportScheduleConfig, ReportScheduler,
    ReportSink,
};
use crate::source::{SnapshotSource, UnitRegistry};
use crate::store::MetricsStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sleep for `duration` unless shutdown fires first. Returns true on shutdown.
pub(crate) async fn sleep_or_shutdown(
    duration: Duration,
    shutdown: &mut broadcast::Receiver<()>,
) -> bool {
    tokio::select! {
        _ = shutdown.recv() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// Shortest period a loop will tick at; `tokio::time::interval` rejects zero
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

pub(crate) fn tick_interval(configured: Duration) -> Duration {
    configured.max(MIN_TICK_INTERVAL)
}

/// Configuration for every pipeline loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub collection: CollectionConfig,
    pub thresholds: AlertThresholds,
    pub alert_mode: AlertMode,
    pub analysis: AnalysisConfig,
    pub prediction: PredictionConfig,
    /// Scheduled reports; `None` disables the report loop
    pub reports: Option<ReportScheduleConfig>,
    pub recommendations: RecommendationRules,
    /// Bound on joining each loop at shutdown (default: 5 seconds)
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collection: CollectionConfig::default(),
            thresholds: AlertThresholds::default(),
            alert_mode: AlertMode::default(),
            analysis: AnalysisConfig::default(),
            prediction: PredictionConfig::default(),
            reports: Some(ReportScheduleConfig::default()),
            recommendations: RecommendationRules::default(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<MetricsStore>,
    buffer: Arc<RealtimeBuffer>,
    registry: Arc<UnitRegistry>,
    source: Arc<SnapshotSource>,
    notifier: Arc<dyn Notifier>,
    reports: ReportGenerator,
    reporter: Option<Arc<ReportScheduler>>,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: PipelineMetrics,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Spawn every loop. Fails if the pipeline is already running.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        if !self.handles.is_empty() {
            bail!("Pipeline already started");
        }

        let collector = CollectionLoopBuilder::new()
            .source(self.source.clone())
            .registry(self.registry.clone())
            .store(self.store.clone())
            .buffer(self.buffer.clone())
            .notifier(self.notifier.clone())
            .thresholds(self.config.thresholds.clone())
            .alert_mode(self.config.alert_mode)
            .config(self.config.collection.clone())
            .health(self.health.clone())
            .logger(self.logger.clone())
            .build()?;

        let analyzer = TrendAnalyzer::new(self.store.clone(), self.config.analysis.clone())
            .with_health(self.health.clone())
            .with_logger(self.logger.clone());

        let predictor =
            PredictionScheduler::new(self.store.clone(), self.config.prediction.clone())
                .with_health(self.health.clone())
                .with_logger(self.logger.clone());

        self.health.register(components::STORE).await;

        self.handles.push((
            components::COLLECTOR,
            tokio::spawn(collector.run(self.shutdown_tx.subscribe())),
        ));
        self.handles.push((
            components::ANALYZER,
            tokio::spawn(analyzer.run(self.shutdown_tx.subscribe())),
        ));
        self.handles.push((
            components::PREDICTOR,
            tokio::spawn(predictor.run(self.shutdown_tx.subscribe())),
        ));
        if let Some(reporter) = &self.reporter {
            self.handles.push((
                components::REPORTER,
                tokio::spawn(reporter.clone().run(self.shutdown_tx.subscribe())),
            ));
        }

        self.metrics.set_units_monitored(self.registry.len());
        self.logger.log_startup(VERSION, self.registry.len());
        self.health.set_ready(true).await;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Read-only view over the shared buffer and store
    pub fn dashboard(&self) -> TelemetryDashboard {
        TelemetryDashboard::new(self.store.clone(), self.buffer.clone())
            .with_report_generator(self.reports.clone())
    }

    /// Scheduled report loop, when enabled
    pub fn report_scheduler(&self) -> Option<Arc<ReportScheduler>> {
        self.reporter.clone()
    }

    pub fn store(&self) -> Arc<MetricsStore> {
        self.store.clone()
    }

    pub fn registry(&self) -> Arc<UnitRegistry> {
        self.registry.clone()
    }

    pub fn health(&self) -> HealthRegistry {
        self.health.clone()
    }

    /// Signal every loop to stop and join each within `shutdown_timeout`.
    /// A loop that misses the deadline is aborted.
    pub async fn shutdown(mut self, reason: &str) {
        self.logger.log_shutdown(reason);
        self.health.set_ready(false).await;

        // No receivers just means nothing was started.
        let _ = self.shutdown_tx.send(());

        for (name, mut handle) in self.handles.drain(..) {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut handle).await {
                Ok(Ok(())) => info!(task = name, "Pipeline task stopped"),
                Ok(Err(e)) => warn!(task = name, error = %e, "Pipeline task ended abnormally"),
                Err(_) => {
                    warn!(
                        task = name,
                        timeout_secs = self.config.shutdown_timeout.as_secs_f64(),
                        "Pipeline task did not stop in time, aborting"
                    );
                    handle.abort();
                }
            }
        }
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    store: Option<Arc<MetricsStore>>,
    source: Option<SnapshotSource>,
    registry: Option<Arc<UnitRegistry>>,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn ReportSink>,
    health: HealthRegistry,
    node_name: String,
    config: PipelineConfig,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            source: None,
            registry: None,
            notifier: Arc::new(LogNotifier),
            sink: Arc::new(LogSink),
            health: HealthRegistry::new(),
            node_name: "telemetry".to_string(),
            config: PipelineConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Unit and collaborator adapter; its timeout is taken from the config
    pub fn source(mut self, source: SnapshotSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn registry(mut self, registry: Arc<UnitRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> anyhow::Result<Pipeline> {
        let store = self.store.ok_or_else(|| anyhow!("Metrics store is required"))?;
        let source = self.source.ok_or_else(|| anyhow!("Snapshot source is required"))?;
        let logger = StructuredLogger::new(self.node_name);

        let source = Arc::new(
            source
                .with_timeout(self.config.collection.collaborator_timeout)
                .with_logger(logger.clone()),
        );
        let buffer = Arc::new(RealtimeBuffer::new(self.config.collection.buffer_capacity));
        let reports = ReportGenerator::new(store.clone())
            .with_rules(self.config.recommendations.clone())
            .with_logger(logger.clone());

        let reporter = self.config.reports.clone().map(|schedule| {
            Arc::new(
                ReportScheduler::new(reports.clone(), schedule)
                    .with_sink(self.sink.clone())
                    .with_health(self.health.clone())
                    .with_logger(logger.clone()),
            )
        });

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Pipeline {
            config: self.config,
            store,
            buffer,
            registry: self.registry.unwrap_or_default(),
            source,
            notifier: self.notifier,
            reports,
            reporter,
            health: self.health,
            logger,
            metrics: PipelineMetrics::new(),
            shutdown_tx,
            handles: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitConfig;
    use crate::source::SimulatedUnitSource;

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.collection.interval = Duration::from_millis(10);
        config.shutdown_timeout = Duration::from_secs(2);
        config
    }

    fn pipeline(config: PipelineConfig) -> Pipeline {
        let registry = Arc::new(UnitRegistry::from_units([
            UnitConfig::new("rig-1"),
            UnitConfig::new("rig-2"),
        ]));
        Pipeline::builder()
            .store(Arc::new(MetricsStore::open_in_memory().unwrap()))
            .source(SnapshotSource::new(Arc::new(SimulatedUnitSource::new())))
            .registry(registry)
            .config(config)
            .build()
            .unwrap()
    }

    #[test]
    fn test_tick_interval_is_never_zero() {
        assert_eq!(tick_interval(Duration::ZERO), MIN_TICK_INTERVAL);
        assert_eq!(tick_interval(Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sleep_or_shutdown() {
        let (tx, mut rx) = broadcast::channel(1);
        assert!(!sleep_or_shutdown(Duration::from_millis(1), &mut rx).await);

        tx.send(()).unwrap();
        assert!(sleep_or_shutdown(Duration::from_secs(60), &mut rx).await);
    }

    #[test]
    fn test_builder_requires_store_and_source() {
        let err = Pipeline::builder()
            .source(SnapshotSource::new(Arc::new(SimulatedUnitSource::new())))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("store"));

        let err = Pipeline::builder()
            .store(Arc::new(MetricsStore::open_in_memory().unwrap()))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("source"));
    }

    #[tokio::test]
    async fn test_start_collects_and_shutdown_joins() {
        let mut pipeline = pipeline(fast_config());
        let health = pipeline.health();
        let store = pipeline.store();

        pipeline.start().await.unwrap();
        assert!(pipeline.is_running());
        assert!(health.readiness().await.ready);

        tokio::time::sleep(Duration::from_millis(100)).await;

        let state = pipeline.dashboard().get_dashboard_state().await.unwrap();
        let current = state.current.expect("collector produced no snapshot");
        assert_eq!(current.system.total_units, 2);
        assert!(state.buffered_snapshots >= 1);
        assert!(!store.recent_samples(10).unwrap().is_empty());

        tokio::time::timeout(Duration::from_secs(5), pipeline.shutdown("test"))
            .await
            .expect("shutdown exceeded its bound");
        assert!(!health.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut pipeline = pipeline(fast_config());
        pipeline.start().await.unwrap();
        assert!(pipeline.start().await.is_err());
        pipeline.shutdown("test").await;
    }

    #[tokio::test]
    async fn test_reports_can_be_disabled() {
        let config = PipelineConfig {
            reports: None,
            ..fast_config()
        };
        let mut pipeline = pipeline(config);
        assert!(pipeline.report_scheduler().is_none());

        pipeline.start().await.unwrap();
        assert_eq!(pipeline.handles.len(), 3);
        pipeline.shutdown("test").await;
    }

    #[tokio::test]
    async fn test_shutdown_without_start() {
        let pipeline = pipeline(fast_config());
        pipeline.shutdown("never started").await;
    }

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.alert_mode, AlertMode::Continuous);
        assert!(config.reports.is_some());
    }
}
