//! Core data models for the telemetry pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Returned when a persisted or user-supplied name does not match a known variant
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Configuration of one monitored unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub unit_id: String,
    /// Nominal throughput used by the simulated source (work/sec)
    pub nominal_throughput: f64,
    /// Nominal power draw used by the simulated source
    pub nominal_power_watts: f64,
    /// Nominal temperature used by the simulated source
    pub nominal_temperature_c: f64,
}

impl UnitConfig {
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            nominal_throughput: 120.0,
            nominal_power_watts: 320.0,
            nominal_temperature_c: 68.0,
        }
    }
}

/// Raw reading for one unit as returned by a unit source
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitReading {
    pub throughput: f64,
    pub power_watts: f64,
    pub temperature_c: f64,
    pub uptime_hours: f64,
}

/// One unit's reading at one instant, as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub unit_id: String,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    pub throughput: f64,
    pub power_watts: f64,
    pub temperature_c: f64,
    /// throughput / power
    pub efficiency: f64,
    /// 0-100
    pub optimization_level: u8,
    pub algorithm_id: String,
    pub uptime_hours: f64,
    pub derived_cost_per_hour: f64,
}

impl MetricSample {
    /// Build a sample from a raw reading, deriving efficiency and hourly cost
    pub fn from_reading(
        unit_id: &str,
        timestamp: i64,
        reading: UnitReading,
        optimization_level: u8,
        algorithm_id: &str,
        energy_price_per_kwh: f64,
    ) -> Self {
        let efficiency = if reading.power_watts > 0.0 {
            reading.throughput / reading.power_watts
        } else {
            0.0
        };

        Self {
            unit_id: unit_id.to_string(),
            timestamp,
            throughput: reading.throughput,
            power_watts: reading.power_watts,
            temperature_c: reading.temperature_c,
            efficiency,
            optimization_level,
            algorithm_id: algorithm_id.to_string(),
            uptime_hours: reading.uptime_hours,
            derived_cost_per_hour: reading.power_watts * energy_price_per_kwh / 1000.0,
        }
    }

    /// A unit counts as active while it produces work
    pub fn is_active(&self) -> bool {
        self.throughput > 0.0
    }
}

/// Summary reported by the optimization collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSummary {
    /// Average optimization level, 0-100
    pub level: u8,
    pub optimization_count: u64,
    pub efficiency_gain: f64,
}

impl Default for OptimizationSummary {
    fn default() -> Self {
        Self {
            level: 50,
            optimization_count: 0,
            efficiency_gain: 0.0,
        }
    }
}

/// Summary reported by the energy collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySummary {
    pub efficiency_score: f64,
    pub power_savings_potential_watts: f64,
    pub cost_savings_potential_hourly: f64,
}

impl Default for EnergySummary {
    fn default() -> Self {
        Self {
            efficiency_score: 0.8,
            power_savings_potential_watts: 0.0,
            cost_savings_potential_hourly: 0.0,
        }
    }
}

/// Summary reported by the thermal collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermalSummary {
    pub optimization_count: u64,
    pub efficiency_gains: f64,
}

/// Summary reported by the algorithm collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmSummary {
    pub current_algorithm: String,
    pub switch_count: u64,
    pub profit_improvement: f64,
}

impl Default for AlgorithmSummary {
    fn default() -> Self {
        Self {
            current_algorithm: "unknown".to_string(),
            switch_count: 0,
            profit_improvement: 0.0,
        }
    }
}

/// Summary reported by the maintenance-risk collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceSummary {
    pub units_monitored: u64,
    pub data_points: u64,
    pub units_at_risk: u64,
}

/// Pass-through summaries from every collaborator for one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorSummaries {
    pub optimization: OptimizationSummary,
    pub energy: EnergySummary,
    pub thermal: ThermalSummary,
    pub algorithm: AlgorithmSummary,
    pub maintenance: MaintenanceSummary,
}

/// Fleet-wide aggregates for one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub total_throughput: f64,
    pub avg_throughput: f64,
    pub total_power_watts: f64,
    pub avg_temperature_c: f64,
    pub avg_efficiency: f64,
    pub total_units: usize,
    pub active_units: usize,
}

/// One aggregated reading across all units and collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSnapshot {
    pub timestamp: i64,
    pub system: SystemMetrics,
    pub collaborators: CollaboratorSummaries,
    pub samples: Vec<MetricSample>,
}

impl AggregatedSnapshot {
    /// Aggregate per-unit samples into one snapshot.
    ///
    /// Inactive units count towards `total_units` only; averages cover
    /// active units and are zero when none are active.
    pub fn from_samples(
        timestamp: i64,
        samples: Vec<MetricSample>,
        collaborators: CollaboratorSummaries,
    ) -> Self {
        let total_units = samples.len();
        let total_throughput: f64 = samples.iter().map(|s| s.throughput).sum();
        let total_power_watts: f64 = samples.iter().map(|s| s.power_watts).sum();

        let active: Vec<&MetricSample> = samples.iter().filter(|s| s.is_active()).collect();
        let active_units = active.len();

        let (avg_throughput, avg_temperature_c, avg_efficiency) = if active.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let n = active_units as f64;
            (
                active.iter().map(|s| s.throughput).sum::<f64>() / n,
                active.iter().map(|s| s.temperature_c).sum::<f64>() / n,
                active.iter().map(|s| s.efficiency).sum::<f64>() / n,
            )
        };

        Self {
            timestamp,
            system: SystemMetrics {
                total_throughput,
                avg_throughput,
                total_power_watts,
                avg_temperature_c,
                avg_efficiency,
                total_units,
                active_units,
            },
            collaborators,
            samples,
        }
    }

    pub fn optimization_level(&self) -> u8 {
        self.collaborators.optimization.level
    }
}

/// Recognized KPI names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiName {
    ThroughputPerWatt,
    PowerEfficiencyScore,
    ThermalEfficiencyScore,
    OptimizationLevelScore,
    ReliabilityScore,
}

impl KpiName {
    pub const ALL: [KpiName; 5] = [
        KpiName::ThroughputPerWatt,
        KpiName::PowerEfficiencyScore,
        KpiName::ThermalEfficiencyScore,
        KpiName::OptimizationLevelScore,
        KpiName::ReliabilityScore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KpiName::ThroughputPerWatt => "throughput_per_watt",
            KpiName::PowerEfficiencyScore => "power_efficiency_score",
            KpiName::ThermalEfficiencyScore => "thermal_efficiency_score",
            KpiName::OptimizationLevelScore => "optimization_level_score",
            KpiName::ReliabilityScore => "reliability_score",
        }
    }

    pub fn unit_of_measure(&self) -> &'static str {
        match self {
            KpiName::ThroughputPerWatt => "work/s per W",
            KpiName::OptimizationLevelScore => "level",
            _ => "score",
        }
    }

    pub fn target(&self) -> f64 {
        match self {
            KpiName::ThroughputPerWatt => 0.40,
            KpiName::PowerEfficiencyScore => 0.85,
            KpiName::ThermalEfficiencyScore => 0.80,
            KpiName::OptimizationLevelScore => 0.80,
            KpiName::ReliabilityScore => 0.95,
        }
    }
}

impl fmt::Display for KpiName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KpiName {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KpiName::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("kpi", s))
    }
}

/// Derived score for one tick, compared against a static target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiValue {
    pub timestamp: i64,
    pub name: KpiName,
    pub value: f64,
    pub unit: String,
    pub target: f64,
}

impl KpiValue {
    pub fn new(timestamp: i64, name: KpiName, value: f64) -> Self {
        Self {
            timestamp,
            name,
            value,
            unit: name.unit_of_measure().to_string(),
            target: name.target(),
        }
    }

    pub fn meets_target(&self) -> bool {
        self.value >= self.target
    }
}

/// Alert severity, ordered MEDIUM < HIGH < CRITICAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(UnknownVariant::new("severity", other)),
        }
    }
}

/// Alert type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertType {
    LowEfficiency,
    HighTemperature,
    HighPowerConsumption,
    LowOptimizationLevel,
}

impl AlertType {
    pub const ALL: [AlertType; 4] = [
        AlertType::LowEfficiency,
        AlertType::HighTemperature,
        AlertType::HighPowerConsumption,
        AlertType::LowOptimizationLevel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::LowEfficiency => "low-efficiency",
            AlertType::HighTemperature => "high-temperature",
            AlertType::HighPowerConsumption => "high-power-consumption",
            AlertType::LowOptimizationLevel => "low-optimization-level",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("alert type", s))
    }
}

/// Threshold breach raised for one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Row id, present once the alert has been read back from the store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub timestamp: i64,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub resolved: bool,
}

impl Alert {
    pub fn new(
        timestamp: i64,
        alert_type: AlertType,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            timestamp,
            alert_type,
            severity,
            message: message.into(),
            resolved: false,
        }
    }
}

/// Trend, forecast or correlation fact produced by the background loops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub timestamp: i64,
    pub prediction_type: String,
    pub predicted_value: f64,
    /// 0.0-1.0
    pub confidence: f64,
    pub time_horizon_hours: u32,
}

/// Metrics tracked by the analyzer and predictor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedMetric {
    Throughput,
    Power,
    Temperature,
    Efficiency,
}

impl TrackedMetric {
    pub const ALL: [TrackedMetric; 4] = [
        TrackedMetric::Throughput,
        TrackedMetric::Power,
        TrackedMetric::Temperature,
        TrackedMetric::Efficiency,
    ];

    /// Key used in prediction type names
    pub fn key(&self) -> &'static str {
        match self {
            TrackedMetric::Throughput => "throughput",
            TrackedMetric::Power => "power",
            TrackedMetric::Temperature => "temperature",
            TrackedMetric::Efficiency => "efficiency",
        }
    }

    pub fn value_of(&self, sample: &MetricSample) -> f64 {
        match self {
            TrackedMetric::Throughput => sample.throughput,
            TrackedMetric::Power => sample.power_watts,
            TrackedMetric::Temperature => sample.temperature_c,
            TrackedMetric::Efficiency => sample.efficiency,
        }
    }

    /// Slope magnitude (per step) that maps to tanh(1) after normalization
    pub fn trend_scale(&self) -> f64 {
        match self {
            TrackedMetric::Throughput | TrackedMetric::Power => 100.0,
            TrackedMetric::Temperature => 10.0,
            TrackedMetric::Efficiency => 0.1,
        }
    }

    /// Forecast drift per horizon hour at a fully saturated trend
    pub fn forecast_step(&self) -> f64 {
        self.trend_scale() / 10.0
    }

    pub fn trend_type(&self) -> String {
        format!("{}_trend", self.key())
    }

    pub fn prediction_type(&self, horizon_hours: u32) -> String {
        format!("{}_prediction_{}h", self.key(), horizon_hours)
    }
}

impl fmt::Display for TrackedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
