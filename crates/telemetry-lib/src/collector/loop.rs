//! Collection loop and its builder

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alerting::{
    self, forward_alerts, AlertGate, AlertMode, AlertThresholds, LogNotifier, Notifier,
};
use crate::buffer::RealtimeBuffer;
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::kpi;
use crate::models::{AggregatedSnapshot, MetricSample, UnitReading};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::pipeline::{sleep_or_shutdown, tick_interval};
use crate::source::{SnapshotSource, UnitRegistry};
use crate::store::MetricsStore;

const LOOP_NAME: &str = "collector";

/// Configuration for the collection loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Time between ticks (default: 5 seconds)
    pub interval: Duration,
    /// Snapshots kept in the real-time buffer (default: 1000)
    pub buffer_capacity: usize,
    /// Bound on each unit read and collaborator call (default: 2 seconds)
    pub collaborator_timeout: Duration,
    /// Pause after a failed tick (default: 5 seconds)
    pub error_backoff: Duration,
    /// Price used for `derived_cost_per_hour` (default: 0.20 per kWh)
    pub energy_price_per_kwh: f64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            buffer_capacity: crate::buffer::DEFAULT_CAPACITY,
            collaborator_timeout: crate::source::DEFAULT_COLLABORATOR_TIMEOUT,
            error_backoff: Duration::from_secs(5),
            energy_price_per_kwh: 0.20,
        }
    }
}

/// Outcome of one successful tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub timestamp: i64,
    pub units: usize,
    pub active_units: usize,
    pub alerts_raised: usize,
    pub kpis_below_target: usize,
}

/// Periodically samples every registered unit
pub struct CollectionLoop {
    source: Arc<SnapshotSource>,
    registry: Arc<UnitRegistry>,
    store: Arc<MetricsStore>,
    buffer: Arc<RealtimeBuffer>,
    thresholds: AlertThresholds,
    gate: AlertGate,
    notifier: Arc<dyn Notifier>,
    config: CollectionConfig,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: PipelineMetrics,
}

impl CollectionLoop {
    /// Run until `shutdown` fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            units = self.registry.len(),
            alert_mode = ?self.gate.mode(),
            "Starting collection loop"
        );
        self.health.register(components::COLLECTOR).await;

        let mut ticker = interval(tick_interval(self.config.interval));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Shutting down collection loop");
                    break;
                }
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let result = self.tick().await;
                    self.metrics
                        .observe_tick_latency(LOOP_NAME, start.elapsed().as_secs_f64());
                    self.health
                        .record_tick(components::COLLECTOR, result.as_ref().map(|_| ()))
                        .await;

                    if let Err(e) = result {
                        self.metrics.inc_tick_failures(LOOP_NAME);
                        self.logger
                            .log_tick_failed(LOOP_NAME, &e, self.config.error_backoff.as_secs());
                        if sleep_or_shutdown(self.config.error_backoff, &mut shutdown).await {
                            info!("Shutting down collection loop");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Run one collection tick at the current time
    pub async fn tick(&self) -> Result<TickSummary> {
        self.tick_at(chrono::Utc::now().timestamp()).await
    }

    /// Run one collection tick stamped with `timestamp`
    pub async fn tick_at(&self, timestamp: i64) -> Result<TickSummary> {
        let snapshot = self.build_snapshot(timestamp).await;

        let decision = self.gate.decide(alerting::evaluate(&snapshot, &self.thresholds));
        let kpis = kpi::evaluate(&snapshot);

        let written = self
            .store
            .run_blocking(move |store| {
                store.write_tick(&snapshot.samples, &kpis, &decision.alerts)?;
                Ok((snapshot, kpis, decision))
            })
            .await;
        self.health
            .record_tick(components::STORE, written.as_ref().map(|_| ()))
            .await;
        let (snapshot, kpis, decision) = written?;
        self.gate.commit(&decision);

        self.metrics.add_samples_stored(snapshot.samples.len());
        self.metrics.add_kpis_stored(kpis.len());
        self.metrics.set_units_monitored(snapshot.system.total_units);

        let summary = TickSummary {
            timestamp,
            units: snapshot.system.total_units,
            active_units: snapshot.system.active_units,
            alerts_raised: decision.alerts.len(),
            kpis_below_target: kpis.iter().filter(|k| !k.meets_target()).count(),
        };

        let buffered = self.buffer.push(snapshot).await;
        self.metrics.set_buffered_snapshots(buffered);

        for kpi in kpis.iter().filter(|k| !k.meets_target()) {
            self.logger.log_kpi_below_target(kpi);
        }
        for alert in &decision.alerts {
            self.logger.log_alert(alert);
            self.metrics.inc_alerts_raised(alert.severity);
        }
        forward_alerts(
            self.notifier.as_ref(),
            &decision.alerts,
            self.config.collaborator_timeout,
        )
        .await;

        debug!(
            units = summary.units,
            active = summary.active_units,
            alerts = summary.alerts_raised,
            "Collection tick complete"
        );
        Ok(summary)
    }

    /// Read all units and collaborators into one aggregated snapshot.
    ///
    /// Units are read concurrently, so one tick takes at most one
    /// collaborator timeout regardless of fleet size.
    pub async fn build_snapshot(&self, timestamp: i64) -> AggregatedSnapshot {
        let units = self.registry.list();
        let reads: Vec<_> = units
            .iter()
            .map(|unit| {
                let source = Arc::clone(&self.source);
                let unit = unit.clone();
                tokio::spawn(async move { source.read_unit(&unit).await })
            })
            .collect();
        let collaborators = self.source.collaborator_summaries().await;

        let mut samples = Vec::with_capacity(units.len());
        for (unit, read) in units.iter().zip(reads) {
            let reading = read.await.unwrap_or_else(|e| {
                warn!(unit_id = %unit.unit_id, error = %e, "Unit read task failed");
                UnitReading::default()
            });
            samples.push(MetricSample::from_reading(
                &unit.unit_id,
                timestamp,
                reading,
                collaborators.optimization.level,
                &collaborators.algorithm.current_algorithm,
                self.config.energy_price_per_kwh,
            ));
        }

        AggregatedSnapshot::from_samples(timestamp, samples, collaborators)
    }
}

/// Builder for the collection loop
pub struct CollectionLoopBuilder {
    source: Option<Arc<SnapshotSource>>,
    registry: Option<Arc<UnitRegistry>>,
    store: Option<Arc<MetricsStore>>,
    buffer: Option<Arc<RealtimeBuffer>>,
    notifier: Arc<dyn Notifier>,
    thresholds: AlertThresholds,
    alert_mode: AlertMode,
    config: CollectionConfig,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionLoopBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            registry: None,
            store: None,
            buffer: None,
            notifier: Arc::new(LogNotifier),
            thresholds: AlertThresholds::default(),
            alert_mode: AlertMode::default(),
            config: CollectionConfig::default(),
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("telemetry"),
        }
    }

    pub fn source(mut self, source: Arc<SnapshotSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn registry(mut self, registry: Arc<UnitRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share an existing buffer; otherwise one is created from the config
    pub fn buffer(mut self, buffer: Arc<RealtimeBuffer>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn thresholds(mut self, thresholds: AlertThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn alert_mode(mut self, mode: AlertMode) -> Self {
        self.alert_mode = mode;
        self
    }

    pub fn config(mut self, config: CollectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> anyhow::Result<CollectionLoop> {
        let source = self.source.ok_or_else(|| anyhow!("Snapshot source is required"))?;
        let store = self.store.ok_or_else(|| anyhow!("Metrics store is required"))?;
        let registry = self.registry.unwrap_or_default();
        let buffer = self
            .buffer
            .unwrap_or_else(|| Arc::new(RealtimeBuffer::new(self.config.buffer_capacity)));

        Ok(CollectionLoop {
            source,
            registry,
            store,
            buffer,
            thresholds: self.thresholds,
            gate: AlertGate::new(self.alert_mode),
            notifier: self.notifier,
            config: self.config,
            health: self.health,
            logger: self.logger,
            metrics: PipelineMetrics::new(),
        })
    }
}
