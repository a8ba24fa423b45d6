//! Read-only facade over the buffer and store for external callers

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::buffer::RealtimeBuffer;
use crate::error::{PipelineError, Result};
use crate::models::{AggregatedSnapshot, Alert, KpiValue};
use crate::report::{
    render_dashboard_html, render_report, PerformanceReport, ReportFormat, ReportGenerator,
};
use crate::store::{MetricsOverview, MetricsStore};

/// Unresolved alerts shown on the dashboard
pub const DEFAULT_ALERT_LIMIT: usize = 10;

/// Trailing window for the dashboard's averages
const LAST_HOUR_SECS: i64 = 3600;

/// Everything the dashboard shows at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardState {
    pub generated_at: i64,
    pub generated_at_utc: String,
    /// Latest buffered snapshot, absent before the first tick
    pub current: Option<AggregatedSnapshot>,
    pub buffered_snapshots: usize,
    /// Latest value of each KPI
    pub kpis: Vec<KpiValue>,
    /// Most recent unresolved alerts, newest first
    pub alerts: Vec<Alert>,
    pub last_hour: MetricsOverview,
}

/// Dashboard export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Html,
}

impl FromStr for ExportFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "structured" => Ok(ExportFormat::Json),
            "html" | "rendered" => Ok(ExportFormat::Html),
            _ => Err(PipelineError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Current-state and historical views; never mutates the store
#[derive(Clone)]
pub struct TelemetryDashboard {
    store: Arc<MetricsStore>,
    buffer: Arc<RealtimeBuffer>,
    reports: ReportGenerator,
    alert_limit: usize,
}

impl TelemetryDashboard {
    pub fn new(store: Arc<MetricsStore>, buffer: Arc<RealtimeBuffer>) -> Self {
        Self {
            reports: ReportGenerator::new(store.clone()),
            store,
            buffer,
            alert_limit: DEFAULT_ALERT_LIMIT,
        }
    }

    pub fn with_report_generator(mut self, reports: ReportGenerator) -> Self {
        self.reports = reports;
        self
    }

    pub fn with_alert_limit(mut self, limit: usize) -> Self {
        self.alert_limit = limit;
        self
    }

    pub async fn get_dashboard_state(&self) -> Result<DashboardState> {
        self.dashboard_state_at(chrono::Utc::now().timestamp()).await
    }

    pub async fn dashboard_state_at(&self, now: i64) -> Result<DashboardState> {
        let current = self.buffer.latest().await;
        let buffered_snapshots = self.buffer.len().await;

        let alert_limit = self.alert_limit;
        let (kpis, alerts, last_hour) = self
            .store
            .run_blocking(move |store| {
                Ok((
                    store.latest_kpis()?,
                    store.unresolved_alerts(alert_limit)?,
                    store.overview_between(now - LAST_HOUR_SECS, now)?,
                ))
            })
            .await?;

        Ok(DashboardState {
            generated_at: now,
            generated_at_utc: chrono::DateTime::from_timestamp(now, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            current,
            buffered_snapshots,
            kpis,
            alerts,
            last_hour,
        })
    }

    pub async fn generate_report(&self, hours: i64) -> Result<PerformanceReport> {
        self.reports.generate(hours).await
    }

    /// Report over the trailing `hours`, rendered as json, html or markdown
    pub async fn render_report(&self, hours: i64, format: &str) -> Result<String> {
        let format = ReportFormat::from_str(format)?;
        render_report(&self.generate_report(hours).await?, format)
    }

    /// Current dashboard state as json or html
    pub async fn export(&self, format: &str) -> Result<String> {
        let format = ExportFormat::from_str(format)?;
        let state = self.get_dashboard_state().await?;
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&state)?),
            ExportFormat::Html => Ok(render_dashboard_html(&state)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AlertType, CollaboratorSummaries, KpiName, MetricSample, Prediction, Severity,
        UnitReading,
    };
    use tokio_test::{assert_err, assert_ok};

    fn dashboard() -> (Arc<MetricsStore>, Arc<RealtimeBuffer>, TelemetryDashboard) {
        let store = Arc::new(MetricsStore::open_in_memory().unwrap());
        let buffer = Arc::new(RealtimeBuffer::new(10));
        let dashboard = TelemetryDashboard::new(store.clone(), buffer.clone());
        (store, buffer, dashboard)
    }

    fn sample(timestamp: i64) -> MetricSample {
        MetricSample::from_reading(
            "rig-1",
            timestamp,
            UnitReading {
                throughput: 120.0,
                power_watts: 300.0,
                temperature_c: 70.0,
                uptime_hours: 4.0,
            },
            50,
            "sha256",
            0.2,
        )
    }

    #[tokio::test]
    async fn test_state_before_first_tick() {
        let (_, _, dashboard) = dashboard();
        let state = dashboard.dashboard_state_at(10_000).await.unwrap();

        assert!(state.current.is_none());
        assert!(state.kpis.is_empty());
        assert!(state.alerts.is_empty());
        assert_eq!(state.last_hour.data_points, 0);
    }

    #[tokio::test]
    async fn test_state_combines_buffer_and_store() {
        let (store, buffer, dashboard) = dashboard();
        let now = 100_000;

        let samples = vec![sample(now - 7200), sample(now - 60)];
        store
            .write_tick(
                &samples,
                &[KpiValue::new(now - 60, KpiName::ReliabilityScore, 1.0)],
                &[Alert::new(now - 60, AlertType::HighTemperature, Severity::Critical, "hot")],
            )
            .unwrap();
        buffer
            .push(AggregatedSnapshot::from_samples(
                now - 60,
                vec![samples[1].clone()],
                CollaboratorSummaries::default(),
            ))
            .await;

        let state = dashboard.dashboard_state_at(now).await.unwrap();
        assert_eq!(state.current.as_ref().unwrap().timestamp, now - 60);
        assert_eq!(state.buffered_snapshots, 1);
        assert_eq!(state.kpis.len(), 1);
        assert_eq!(state.alerts.len(), 1);
        assert_eq!(state.last_hour.data_points, 1);
        assert_eq!(state.last_hour.avg_efficiency, 0.4);
        assert_eq!(state.last_hour.last_update, Some(now - 60));
    }

    #[tokio::test]
    async fn test_alert_limit_and_resolution() {
        let (store, _, dashboard) = dashboard();
        let alerts: Vec<_> = (0..15)
            .map(|i| Alert::new(i, AlertType::LowEfficiency, Severity::High, format!("a{i}")))
            .collect();
        store.write_tick(&[], &[], &alerts).unwrap();

        let state = dashboard.dashboard_state_at(100).await.unwrap();
        assert_eq!(state.alerts.len(), DEFAULT_ALERT_LIMIT);
        assert_eq!(state.alerts[0].message, "a14");

        for alert in &state.alerts {
            store.resolve_alert(alert.id.unwrap()).unwrap();
        }
        let state = dashboard.dashboard_state_at(100).await.unwrap();
        assert_eq!(state.alerts.len(), 5);
    }

    #[tokio::test]
    async fn test_export_formats() {
        let (_, _, dashboard) = dashboard();

        let json = assert_ok!(dashboard.export("json").await);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.get("last_hour").is_some());

        let html = assert_ok!(dashboard.export("HTML").await);
        assert!(html.contains("<h1>Telemetry Dashboard</h1>"));

        let err = assert_err!(dashboard.export("xml").await);
        assert!(matches!(err, PipelineError::UnsupportedFormat(f) if f == "xml"));
    }

    #[tokio::test]
    async fn test_report_passthrough() {
        let (_, _, dashboard) = dashboard();

        assert!(matches!(
            dashboard.generate_report(0).await,
            Err(PipelineError::InvalidWindow { hours: 0 })
        ));
        let md = assert_ok!(dashboard.render_report(24, "markdown").await);
        assert!(md.contains("Performance Report (24h)"));
        assert_err!(dashboard.render_report(24, "pdf").await);
    }

    #[tokio::test]
    async fn test_report_keeps_prediction_confidence() {
        let (store, _, dashboard) = dashboard();
        let now = chrono::Utc::now().timestamp();
        store
            .insert_predictions(&[Prediction {
                timestamp: now - 60,
                prediction_type: "efficiency_trend".to_string(),
                predicted_value: 0.01,
                confidence: 0.8,
                time_horizon_hours: 24,
            }])
            .unwrap();

        let report = assert_ok!(dashboard.generate_report(1).await);
        assert_eq!(report.predictions.len(), 1);
        assert_eq!(report.predictions[0].confidence, 0.8);
        assert_eq!(report.predictions[0].prediction_type, "efficiency_trend");

        let json = assert_ok!(dashboard.render_report(1, "json").await);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["predictions"][0]["confidence"], 0.8);
    }
}
