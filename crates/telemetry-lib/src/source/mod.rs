//! Input adapters: unit readings and collaborator summaries
//!
//! Every call out of the pipeline goes through [`SnapshotSource`], which
//! bounds it with a timeout and validates the result. Failures, timeouts and
//! malformed data all collapse to neutral defaults so a single misbehaving
//! collaborator never stops a collection tick.

mod registry;
mod simulated;

pub use registry::UnitRegistry;
pub use simulated::{SimulatedUnitSource, StaticCollaborator};

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{
    AlgorithmSummary, CollaboratorSummaries, EnergySummary, MaintenanceSummary,
    OptimizationSummary, ThermalSummary, UnitConfig, UnitReading,
};
use crate::observability::{PipelineMetrics, StructuredLogger};

/// Default bound on any single collaborator call
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(2);

/// Produces raw readings for monitored units
#[async_trait]
pub trait UnitSource: Send + Sync {
    async fn read_unit(&self, unit: &UnitConfig) -> Result<UnitReading>;
}

/// Read-only view onto another subsystem's state
#[async_trait]
pub trait Collaborator<S: Send>: Send + Sync {
    async fn summary(&self) -> Result<S>;
}

/// A collaborator summary that can be checked at the adapter boundary
pub trait Summary: Default + Send + Sync + 'static {
    /// Collaborator name used in logs and metric labels
    const KIND: &'static str;

    fn validate(&self) -> Result<()>;
}

fn ensure_finite(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        bail!("{field} is not a finite number");
    }
    Ok(())
}

impl Summary for OptimizationSummary {
    const KIND: &'static str = "optimization";

    fn validate(&self) -> Result<()> {
        if self.level > 100 {
            bail!("optimization level {} exceeds 100", self.level);
        }
        ensure_finite("efficiency_gain", self.efficiency_gain)
    }
}

impl Summary for EnergySummary {
    const KIND: &'static str = "energy";

    fn validate(&self) -> Result<()> {
        ensure_finite("efficiency_score", self.efficiency_score)?;
        ensure_finite("power_savings_potential_watts", self.power_savings_potential_watts)?;
        ensure_finite("cost_savings_potential_hourly", self.cost_savings_potential_hourly)?;
        if !(0.0..=1.0).contains(&self.efficiency_score) {
            bail!("efficiency score {} outside 0..=1", self.efficiency_score);
        }
        Ok(())
    }
}

impl Summary for ThermalSummary {
    const KIND: &'static str = "thermal";

    fn validate(&self) -> Result<()> {
        ensure_finite("efficiency_gains", self.efficiency_gains)
    }
}

impl Summary for AlgorithmSummary {
    const KIND: &'static str = "algorithm";

    fn validate(&self) -> Result<()> {
        if self.current_algorithm.trim().is_empty() {
            bail!("current algorithm is empty");
        }
        ensure_finite("profit_improvement", self.profit_improvement)
    }
}

impl Summary for MaintenanceSummary {
    const KIND: &'static str = "maintenance";

    fn validate(&self) -> Result<()> {
        if self.units_at_risk > self.units_monitored {
            bail!(
                "{} units at risk but only {} monitored",
                self.units_at_risk,
                self.units_monitored
            );
        }
        Ok(())
    }
}

fn validate_reading(reading: &UnitReading) -> Result<()> {
    ensure_finite("throughput", reading.throughput)?;
    ensure_finite("power_watts", reading.power_watts)?;
    ensure_finite("temperature_c", reading.temperature_c)?;
    ensure_finite("uptime_hours", reading.uptime_hours)?;
    if reading.throughput < 0.0 || reading.power_watts < 0.0 {
        bail!("negative throughput or power");
    }
    Ok(())
}

/// Fault-tolerant front for the unit source and every collaborator
pub struct SnapshotSource {
    units: Arc<dyn UnitSource>,
    optimization: Option<Arc<dyn Collaborator<OptimizationSummary>>>,
    energy: Option<Arc<dyn Collaborator<EnergySummary>>>,
    thermal: Option<Arc<dyn Collaborator<ThermalSummary>>>,
    algorithm: Option<Arc<dyn Collaborator<AlgorithmSummary>>>,
    maintenance: Option<Arc<dyn Collaborator<MaintenanceSummary>>>,
    timeout: Duration,
    logger: StructuredLogger,
    metrics: PipelineMetrics,
}

impl SnapshotSource {
    /// Source with no collaborators; their summaries fall back to defaults
    pub fn new(units: Arc<dyn UnitSource>) -> Self {
        Self {
            units,
            optimization: None,
            energy: None,
            thermal: None,
            algorithm: None,
            maintenance: None,
            timeout: DEFAULT_COLLABORATOR_TIMEOUT,
            logger: StructuredLogger::new("telemetry"),
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_optimization(mut self, c: Arc<dyn Collaborator<OptimizationSummary>>) -> Self {
        self.optimization = Some(c);
        self
    }

    pub fn with_energy(mut self, c: Arc<dyn Collaborator<EnergySummary>>) -> Self {
        self.energy = Some(c);
        self
    }

    pub fn with_thermal(mut self, c: Arc<dyn Collaborator<ThermalSummary>>) -> Self {
        self.thermal = Some(c);
        self
    }

    pub fn with_algorithm(mut self, c: Arc<dyn Collaborator<AlgorithmSummary>>) -> Self {
        self.algorithm = Some(c);
        self
    }

    pub fn with_maintenance(mut self, c: Arc<dyn Collaborator<MaintenanceSummary>>) -> Self {
        self.maintenance = Some(c);
        self
    }

    /// Read one unit; a failed, slow or invalid read yields an all-zero reading
    pub async fn read_unit(&self, unit: &UnitConfig) -> UnitReading {
        let outcome = match tokio::time::timeout(self.timeout, self.units.read_unit(unit)).await {
            Ok(Ok(reading)) => validate_reading(&reading).map(|_| reading),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow::anyhow!("timed out after {:?}", self.timeout)),
        };

        match outcome {
            Ok(reading) => reading,
            Err(e) => {
                let reason = format!("unit {}: {e:#}", unit.unit_id);
                self.logger.log_collaborator_unavailable("unit_source", &reason);
                self.metrics.inc_collaborator_failures("unit_source");
                UnitReading::default()
            }
        }
    }

    /// Fetch every collaborator summary concurrently
    pub async fn collaborator_summaries(&self) -> CollaboratorSummaries {
        let (optimization, energy, thermal, algorithm, maintenance) = tokio::join!(
            self.fetch(self.optimization.as_ref()),
            self.fetch(self.energy.as_ref()),
            self.fetch(self.thermal.as_ref()),
            self.fetch(self.algorithm.as_ref()),
            self.fetch(self.maintenance.as_ref()),
        );

        CollaboratorSummaries {
            optimization,
            energy,
            thermal,
            algorithm,
            maintenance,
        }
    }

    async fn fetch<S: Summary>(&self, collaborator: Option<&Arc<dyn Collaborator<S>>>) -> S {
        let Some(collaborator) = collaborator else {
            return S::default();
        };

        let outcome = match tokio::time::timeout(self.timeout, collaborator.summary()).await {
            Ok(Ok(summary)) => summary.validate().map(|_| summary),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow::anyhow!("timed out after {:?}", self.timeout)),
        };

        match outcome {
            Ok(summary) => summary,
            Err(e) => {
                self.logger.log_collaborator_unavailable(S::KIND, &format!("{e:#}"));
                self.metrics.inc_collaborator_failures(S::KIND);
                S::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingCollaborator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl<S: Send + 'static> Collaborator<S> for FailingCollaborator {
        async fn summary(&self) -> Result<S> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            bail!("collaborator offline")
        }
    }

    struct SlowCollaborator;

    #[async_trait]
    impl Collaborator<ThermalSummary> for SlowCollaborator {
        async fn summary(&self) -> Result<ThermalSummary> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ThermalSummary {
                optimization_count: 99,
                efficiency_gains: 1.0,
            })
        }
    }

    struct BrokenUnits;

    #[async_trait]
    impl UnitSource for BrokenUnits {
        async fn read_unit(&self, unit: &UnitConfig) -> Result<UnitReading> {
            if unit.unit_id == "nan" {
                return Ok(UnitReading {
                    throughput: f64::NAN,
                    ..UnitReading::default()
                });
            }
            bail!("unit unreachable")
        }
    }

    fn simulated() -> Arc<dyn UnitSource> {
        Arc::new(SimulatedUnitSource::new())
    }

    #[tokio::test]
    async fn test_missing_collaborators_use_neutral_defaults() {
        let source = SnapshotSource::new(simulated());
        let summaries = source.collaborator_summaries().await;

        assert_eq!(summaries, CollaboratorSummaries::default());
        assert_eq!(summaries.optimization.level, 50);
        assert_eq!(summaries.energy.efficiency_score, 0.8);
        assert_eq!(summaries.algorithm.current_algorithm, "unknown");
    }

    #[tokio::test]
    async fn test_failing_collaborator_is_replaced_by_default() {
        let failing = Arc::new(FailingCollaborator {
            calls: AtomicUsize::new(0),
        });
        let source = SnapshotSource::new(simulated()).with_energy(failing.clone());

        let summaries = source.collaborator_summaries().await;
        assert_eq!(summaries.energy, EnergySummary::default());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_summary_is_rejected() {
        let bogus = OptimizationSummary {
            level: 180,
            ..OptimizationSummary::default()
        };
        let source = SnapshotSource::new(simulated())
            .with_optimization(Arc::new(StaticCollaborator::new(bogus)));

        let summaries = source.collaborator_summaries().await;
        assert_eq!(summaries.optimization.level, 50);
    }

    #[tokio::test]
    async fn test_valid_summary_passes_through() {
        let algorithm = AlgorithmSummary {
            current_algorithm: "scrypt".to_string(),
            switch_count: 3,
            profit_improvement: 0.12,
        };
        let source = SnapshotSource::new(simulated())
            .with_algorithm(Arc::new(StaticCollaborator::new(algorithm.clone())));

        assert_eq!(source.collaborator_summaries().await.algorithm, algorithm);
    }

    #[tokio::test]
    async fn test_slow_collaborator_times_out() {
        let source = SnapshotSource::new(simulated())
            .with_timeout(Duration::from_millis(100))
            .with_thermal(Arc::new(SlowCollaborator));

        let summaries = source.collaborator_summaries().await;
        assert_eq!(summaries.thermal, ThermalSummary::default());
    }

    #[tokio::test]
    async fn test_failed_unit_read_yields_zero_reading() {
        let source = SnapshotSource::new(Arc::new(BrokenUnits));

        let reading = source.read_unit(&UnitConfig::new("rig-1")).await;
        assert_eq!(reading, UnitReading::default());

        let reading = source.read_unit(&UnitConfig::new("nan")).await;
        assert_eq!(reading.throughput, 0.0);
    }
}
