//! Observability infrastructure for the telemetry pipeline
//!
//! Provides:
//! - Prometheus metrics (tick latency, rows written, alerts, collaborator failures)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

use crate::models::{Alert, KpiValue, Severity};

/// Default histogram buckets for tick latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    tick_latency_seconds: HistogramVec,
    tick_failures: IntCounterVec,
    samples_stored: IntCounter,
    kpis_stored: IntCounter,
    alerts_raised: IntCounterVec,
    predictions_stored: IntCounterVec,
    collaborator_failures: IntCounterVec,
    buffered_snapshots: IntGauge,
    units_monitored: IntGauge,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram_vec!(
                "telemetry_tick_latency_seconds",
                "Time spent in one tick of a pipeline loop",
                &["loop"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            tick_failures: register_int_counter_vec!(
                "telemetry_tick_failures_total",
                "Ticks that failed and were skipped",
                &["loop"]
            )
            .expect("Failed to register tick_failures"),

            samples_stored: register_int_counter!(
                "telemetry_samples_stored_total",
                "Per-unit metric samples persisted"
            )
            .expect("Failed to register samples_stored"),

            kpis_stored: register_int_counter!(
                "telemetry_kpi_values_stored_total",
                "KPI values persisted"
            )
            .expect("Failed to register kpis_stored"),

            alerts_raised: register_int_counter_vec!(
                "telemetry_alerts_raised_total",
                "Alerts persisted, by severity",
                &["severity"]
            )
            .expect("Failed to register alerts_raised"),

            predictions_stored: register_int_counter_vec!(
                "telemetry_predictions_stored_total",
                "Predictions persisted, by producing loop",
                &["loop"]
            )
            .expect("Failed to register predictions_stored"),

            collaborator_failures: register_int_counter_vec!(
                "telemetry_collaborator_failures_total",
                "Collaborator calls that failed, timed out or returned invalid data",
                &["collaborator"]
            )
            .expect("Failed to register collaborator_failures"),

            buffered_snapshots: register_int_gauge!(
                "telemetry_buffered_snapshots",
                "Snapshots currently held in the real-time buffer"
            )
            .expect("Failed to register buffered_snapshots"),

            units_monitored: register_int_gauge!(
                "telemetry_units_monitored",
                "Units included in the latest collection tick"
            )
            .expect("Failed to register units_monitored"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying collectors.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, loop_name: &str, duration_secs: f64) {
        self.inner()
            .tick_latency_seconds
            .with_label_values(&[loop_name])
            .observe(duration_secs);
    }

    pub fn inc_tick_failures(&self, loop_name: &str) {
        self.inner()
            .tick_failures
            .with_label_values(&[loop_name])
            .inc();
    }

    pub fn add_samples_stored(&self, count: usize) {
        self.inner().samples_stored.inc_by(count as u64);
    }

    pub fn add_kpis_stored(&self, count: usize) {
        self.inner().kpis_stored.inc_by(count as u64);
    }

    pub fn inc_alerts_raised(&self, severity: Severity) {
        self.inner()
            .alerts_raised
            .with_label_values(&[severity.as_str()])
            .inc();
    }

    pub fn add_predictions_stored(&self, loop_name: &str, count: usize) {
        self.inner()
            .predictions_stored
            .with_label_values(&[loop_name])
            .inc_by(count as u64);
    }

    pub fn inc_collaborator_failures(&self, collaborator: &str) {
        self.inner()
            .collaborator_failures
            .with_label_values(&[collaborator])
            .inc();
    }

    pub fn set_buffered_snapshots(&self, count: usize) {
        self.inner().buffered_snapshots.set(count as i64);
    }

    pub fn set_units_monitored(&self, count: usize) {
        self.inner().units_monitored.set(count as i64);
    }
}

/// Structured logger for pipeline events
///
/// Every record carries an `event` field so downstream log processors can
/// filter on it without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn log_startup(&self, version: &str, units: usize) {
        info!(
            event = "pipeline_started",
            node = %self.node_name,
            version = %version,
            units = units,
            "Telemetry pipeline started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "pipeline_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Telemetry pipeline shutting down"
        );
    }

    pub fn log_alert(&self, alert: &Alert) {
        match alert.severity {
            Severity::Critical | Severity::High => {
                warn!(
                    event = "alert_raised",
                    node = %self.node_name,
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    timestamp = alert.timestamp,
                    details = %alert.message,
                    "Alert raised"
                );
            }
            Severity::Medium => {
                info!(
                    event = "alert_raised",
                    node = %self.node_name,
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    timestamp = alert.timestamp,
                    details = %alert.message,
                    "Alert raised"
                );
            }
        }
    }

    pub fn log_kpi_below_target(&self, kpi: &KpiValue) {
        debug!(
            event = "kpi_below_target",
            node = %self.node_name,
            kpi = %kpi.name,
            value = kpi.value,
            target = kpi.target,
            "KPI below target"
        );
    }

    pub fn log_trend(&self, metric: &str, slope: f64, normalized: f64, buckets: usize) {
        info!(
            event = "trend_detected",
            node = %self.node_name,
            metric = %metric,
            slope = slope,
            normalized = normalized,
            hourly_buckets = buckets,
            "Trend computed"
        );
    }

    pub fn log_forecast(&self, prediction_type: &str, value: f64, model: &str, history: usize) {
        info!(
            event = "forecast_generated",
            node = %self.node_name,
            prediction_type = %prediction_type,
            predicted_value = value,
            model = %model,
            history = history,
            "Forecast generated"
        );
    }

    pub fn log_collaborator_unavailable(&self, collaborator: &str, reason: &str) {
        warn!(
            event = "collaborator_unavailable",
            node = %self.node_name,
            collaborator = %collaborator,
            reason = %reason,
            "Collaborator unavailable, substituting neutral defaults"
        );
    }

    pub fn log_report(&self, period_hours: i64, data_points: u64, recommendations: usize) {
        info!(
            event = "report_generated",
            node = %self.node_name,
            period_hours = period_hours,
            data_points = data_points,
            recommendations = recommendations,
            "Performance report generated"
        );
    }

    pub fn log_tick_failed(&self, loop_name: &str, error: &dyn std::fmt::Display, backoff_secs: u64) {
        error!(
            event = "tick_failed",
            node = %self.node_name,
            loop_name = %loop_name,
            error = %error,
            backoff_secs = backoff_secs,
            "Pipeline loop tick failed, backing off"
        );
    }
}
