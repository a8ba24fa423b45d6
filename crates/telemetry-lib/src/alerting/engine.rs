use serde::{Deserialize, Serialize};

use crate::models::{AggregatedSnapshot, Alert, AlertType, Severity};

/// Alert thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Raise low-efficiency below this average efficiency
    pub min_efficiency: f64,
    /// Raise high-temperature above this average temperature
    pub max_temperature_c: f64,
    /// Raise high-power-consumption above this fleet-wide draw
    pub max_total_power_watts: f64,
    /// Raise low-optimization-level below this level (0-100)
    pub min_optimization_level: u8,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            min_efficiency: 0.30,
            max_temperature_c: 75.0,
            max_total_power_watts: 4000.0,
            min_optimization_level: 30,
        }
    }
}

/// Every alert condition breached by `snapshot`. Comparisons are strict.
///
/// The efficiency and temperature rules read per-unit averages and are
/// skipped while no unit is active.
pub fn evaluate(snapshot: &AggregatedSnapshot, thresholds: &AlertThresholds) -> Vec<Alert> {
    let system = &snapshot.system;
    let ts = snapshot.timestamp;
    let has_active = system.active_units > 0;
    let mut alerts = Vec::new();

    if has_active && system.avg_efficiency < thresholds.min_efficiency {
        alerts.push(Alert::new(
            ts,
            AlertType::LowEfficiency,
            Severity::High,
            format!(
                "System efficiency {:.3} below threshold {:.3}",
                system.avg_efficiency, thresholds.min_efficiency
            ),
        ));
    }

    if has_active && system.avg_temperature_c > thresholds.max_temperature_c {
        alerts.push(Alert::new(
            ts,
            AlertType::HighTemperature,
            Severity::Critical,
            format!(
                "Average temperature {:.1}°C above threshold {:.1}°C",
                system.avg_temperature_c, thresholds.max_temperature_c
            ),
        ));
    }

    if system.total_power_watts > thresholds.max_total_power_watts {
        alerts.push(Alert::new(
            ts,
            AlertType::HighPowerConsumption,
            Severity::Medium,
            format!(
                "Total power draw {:.0}W above threshold {:.0}W",
                system.total_power_watts, thresholds.max_total_power_watts
            ),
        ));
    }

    let level = snapshot.optimization_level();
    if level < thresholds.min_optimization_level {
        alerts.push(Alert::new(
            ts,
            AlertType::LowOptimizationLevel,
            Severity::Medium,
            format!(
                "Optimization level {} below threshold {}",
                level, thresholds.min_optimization_level
            ),
        ));
    }

    alerts
}
