//! KPI derivation from aggregated snapshots

use crate::models::{AggregatedSnapshot, KpiName, KpiValue};

/// Temperature at which thermal efficiency reaches zero
pub const THERMAL_CEILING_C: f64 = 80.0;

/// Compute every KPI for `snapshot`, in [`KpiName::ALL`] order
pub fn evaluate(snapshot: &AggregatedSnapshot) -> Vec<KpiValue> {
    KpiName::ALL
        .into_iter()
        .map(|name| KpiValue::new(snapshot.timestamp, name, kpi_value(snapshot, name)))
        .collect()
}

fn kpi_value(snapshot: &AggregatedSnapshot, name: KpiName) -> f64 {
    let system = &snapshot.system;
    match name {
        KpiName::ThroughputPerWatt => system.total_throughput / system.total_power_watts.max(1.0),
        KpiName::PowerEfficiencyScore => snapshot.collaborators.energy.efficiency_score,
        KpiName::ThermalEfficiencyScore => 1.0 - system.avg_temperature_c / THERMAL_CEILING_C,
        KpiName::OptimizationLevelScore => f64::from(snapshot.optimization_level()) / 100.0,
        KpiName::ReliabilityScore => {
            system.active_units as f64 / system.total_units.max(1) as f64
        }
    }
}
