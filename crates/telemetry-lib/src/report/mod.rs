//! Historical performance reports
//!
//! A report summarizes a trailing window: metric statistics, KPI ranges,
//! stored predictions, alert counts and rule-based recommendations.

mod render;
mod scheduler;

pub use render::{render_dashboard_html, render_report, ReportFormat};
pub use scheduler::{LogSink, ReportScheduleConfig, ReportScheduler, ReportSink};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::models::{KpiName, Prediction};
use crate::observability::StructuredLogger;
use crate::store::{AlertSummary, MetricAggregates, MetricsStore, StatSummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: i64,
    /// `generated_at` as RFC 3339
    pub generated_at_utc: String,
    pub period_hours: i64,
    pub data_points: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    EfficiencyWarning,
    CoolingWarning,
    PowerWarning,
    EnableOptimization,
    ReviewConfiguration,
    Nominal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub message: String,
}

impl Recommendation {
    fn new(kind: RecommendationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub report_metadata: ReportMetadata,
    pub aggregated_metrics: MetricAggregates,
    /// KPI name -> avg/min/max over the window
    pub kpi_trends: BTreeMap<String, StatSummary>,
    /// Newest first
    pub predictions: Vec<Prediction>,
    pub alert_summary: Vec<AlertSummary>,
    pub recommendations: Vec<Recommendation>,
}

impl PerformanceReport {
    pub fn has_recommendation(&self, kind: RecommendationKind) -> bool {
        self.recommendations.iter().any(|r| r.kind == kind)
    }
}

/// Thresholds for the recommendation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationRules {
    /// Average efficiency below this suggests a configuration problem
    pub min_avg_efficiency: f64,
    /// Peak temperature above this suggests more cooling
    pub max_peak_temperature_c: f64,
    /// Average per-sample power above this suggests power limits
    pub max_avg_power_watts: f64,
    /// Average optimization_level_score below this suggests enabling optimization
    pub min_optimization_score: f64,
    /// Average throughput_per_watt below this suggests reviewing configuration
    pub min_throughput_per_watt: f64,
}

impl Default for RecommendationRules {
    fn default() -> Self {
        Self {
            min_avg_efficiency: 0.35,
            max_peak_temperature_c: 75.0,
            max_avg_power_watts: 3500.0,
            min_optimization_score: 0.6,
            min_throughput_per_watt: 0.3,
        }
    }
}

/// Apply the rules to window statistics. Always returns at least one entry.
///
/// Metric rules only fire when the window holds samples; KPI rules only fire
/// for KPIs recorded in the window.
pub fn recommendations(
    aggregates: &MetricAggregates,
    kpi_trends: &BTreeMap<String, StatSummary>,
    rules: &RecommendationRules,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if aggregates.data_points > 0 {
        if aggregates.efficiency.avg < rules.min_avg_efficiency {
            out.push(Recommendation::new(
                RecommendationKind::EfficiencyWarning,
                format!(
                    "Average efficiency {:.3} is below {:.2}; check unit configuration and settings",
                    aggregates.efficiency.avg, rules.min_avg_efficiency
                ),
            ));
        }
        if aggregates.temperature.max > rules.max_peak_temperature_c {
            out.push(Recommendation::new(
                RecommendationKind::CoolingWarning,
                format!(
                    "Peak temperature reached {:.1}°C; improve cooling or airflow",
                    aggregates.temperature.max
                ),
            ));
        }
        if aggregates.power.avg > rules.max_avg_power_watts {
            out.push(Recommendation::new(
                RecommendationKind::PowerWarning,
                format!(
                    "Average power draw {:.0}W is high; consider power limits",
                    aggregates.power.avg
                ),
            ));
        }
    }

    if let Some(score) = kpi_trends.get(KpiName::OptimizationLevelScore.as_str()) {
        if score.avg < rules.min_optimization_score {
            out.push(Recommendation::new(
                RecommendationKind::EnableOptimization,
                format!(
                    "Optimization level averaged {:.0}%; enable automatic optimization",
                    score.avg * 100.0
                ),
            ));
        }
    }

    if let Some(tpw) = kpi_trends.get(KpiName::ThroughputPerWatt.as_str()) {
        if tpw.avg < rules.min_throughput_per_watt {
            out.push(Recommendation::new(
                RecommendationKind::ReviewConfiguration,
                format!(
                    "Throughput per watt averaged {:.3}; review workload and unit configuration",
                    tpw.avg
                ),
            ));
        }
    }

    if out.is_empty() {
        out.push(Recommendation::new(
            RecommendationKind::Nominal,
            "System operating within normal parameters",
        ));
    }

    out
}

/// Builds reports from the metrics store
#[derive(Clone)]
pub struct ReportGenerator {
    store: Arc<MetricsStore>,
    rules: RecommendationRules,
    logger: StructuredLogger,
}

impl ReportGenerator {
    pub fn new(store: Arc<MetricsStore>) -> Self {
        Self {
            store,
            rules: RecommendationRules::default(),
            logger: StructuredLogger::new("telemetry"),
        }
    }

    pub fn with_rules(mut self, rules: RecommendationRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Report over the trailing `hours` ending now, built on the blocking pool
    pub async fn generate(&self, hours: i64) -> Result<PerformanceReport> {
        let generator = self.clone();
        let now = chrono::Utc::now().timestamp();
        tokio::task::spawn_blocking(move || generator.generate_at(hours, now)).await?
    }

    /// Report over rows with `now - hours * 3600 < timestamp <= now`
    pub fn generate_at(&self, hours: i64, now: i64) -> Result<PerformanceReport> {
        if hours <= 0 {
            return Err(PipelineError::InvalidWindow { hours });
        }
        let since = now.saturating_sub(hours.saturating_mul(3600));

        let aggregated_metrics = self.store.aggregate_between(since, now)?;
        let kpi_trends = self.store.kpi_stats_between(since, now)?;
        let predictions = self.store.predictions_between(since, now)?;
        let alert_summary = self.store.alert_summary_between(since, now)?;
        let recommendations = recommendations(&aggregated_metrics, &kpi_trends, &self.rules);

        let report = PerformanceReport {
            report_metadata: ReportMetadata {
                generated_at: now,
                generated_at_utc: chrono::DateTime::from_timestamp(now, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
                period_hours: hours,
                data_points: aggregated_metrics.data_points,
            },
            aggregated_metrics,
            kpi_trends,
            predictions,
            alert_summary,
            recommendations,
        };

        self.logger.log_report(
            hours,
            report.report_metadata.data_points,
            report.recommendations.len(),
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alert, AlertType, KpiValue, MetricSample, Severity, UnitReading};

    const NOW: i64 = 1_700_000_000;

    fn sample(timestamp: i64, throughput: f64, power: f64, temp: f64) -> MetricSample {
        MetricSample::from_reading(
            "rig-1",
            timestamp,
            UnitReading {
                throughput,
                power_watts: power,
                temperature_c: temp,
                uptime_hours: 1.0,
            },
            50,
            "sha256",
            0.2,
        )
    }

    fn generator() -> (Arc<MetricsStore>, ReportGenerator) {
        let store = Arc::new(MetricsStore::open_in_memory().unwrap());
        (store.clone(), ReportGenerator::new(store))
    }

    #[test]
    fn test_low_efficiency_day_produces_efficiency_warning() {
        let (store, generator) = generator();
        let samples: Vec<_> = (0..24)
            .map(|h| sample(NOW - h * 3600, 100.0, 400.0, 65.0))
            .collect();
        store.write_tick(&samples, &[], &[]).unwrap();

        let report = generator.generate_at(24, NOW).unwrap();
        assert_eq!(report.aggregated_metrics.data_points, 24);
        assert_eq!(report.aggregated_metrics.efficiency.avg, 0.25);
        assert!(report.has_recommendation(RecommendationKind::EfficiencyWarning));
        assert!(!report.has_recommendation(RecommendationKind::Nominal));
    }

    #[test]
    fn test_report_only_covers_requested_window() {
        let (store, generator) = generator();
        store
            .write_tick(
                &[
                    sample(NOW - 10, 100.0, 300.0, 60.0),
                    sample(NOW - 3 * 3600, 200.0, 300.0, 80.0),
                ],
                &[
                    KpiValue::new(NOW - 10, KpiName::ReliabilityScore, 1.0),
                    KpiValue::new(NOW - 3 * 3600, KpiName::ReliabilityScore, 0.0),
                ],
                &[Alert::new(NOW - 3 * 3600, AlertType::HighTemperature, Severity::Critical, "hot")],
            )
            .unwrap();

        let report = generator.generate_at(1, NOW).unwrap();
        assert_eq!(report.aggregated_metrics.data_points, 1);
        assert_eq!(report.aggregated_metrics.throughput.max, 100.0);
        assert_eq!(report.aggregated_metrics.temperature.max, 60.0);
        assert_eq!(report.kpi_trends["reliability_score"].min, 1.0);
        assert!(report.alert_summary.is_empty());

        let wide = generator.generate_at(4, NOW).unwrap();
        assert_eq!(wide.aggregated_metrics.data_points, 2);
        assert_eq!(wide.aggregated_metrics.throughput.avg, 150.0);
        assert_eq!(wide.alert_summary.len(), 1);
        assert_eq!(wide.alert_summary[0].max_severity, Severity::Critical);
        assert!(wide.has_recommendation(RecommendationKind::CoolingWarning));
    }

    #[test]
    fn test_rows_after_now_are_excluded() {
        let (store, generator) = generator();
        store
            .write_tick(
                &[
                    sample(NOW - 60, 100.0, 300.0, 60.0),
                    sample(NOW + 3600, 900.0, 300.0, 60.0),
                ],
                &[],
                &[Alert::new(NOW + 60, AlertType::HighTemperature, Severity::Critical, "late")],
            )
            .unwrap();
        store
            .insert_predictions(&[Prediction {
                timestamp: NOW + 60,
                prediction_type: "throughput_trend".to_string(),
                predicted_value: 1.0,
                confidence: 0.8,
                time_horizon_hours: 24,
            }])
            .unwrap();

        let report = generator.generate_at(1, NOW).unwrap();
        assert_eq!(report.report_metadata.data_points, 1);
        assert_eq!(report.aggregated_metrics.throughput.avg, 100.0);
        assert_eq!(report.aggregated_metrics.throughput.max, 100.0);
        assert!(report.predictions.is_empty());
        assert!(report.alert_summary.is_empty());
    }

    #[tokio::test]
    async fn test_generate_runs_against_current_time() {
        let (store, generator) = generator();
        let now = chrono::Utc::now().timestamp();
        store
            .write_tick(&[sample(now - 30, 120.0, 300.0, 60.0)], &[], &[])
            .unwrap();

        let report = generator.generate(1).await.unwrap();
        assert_eq!(report.report_metadata.period_hours, 1);
        assert_eq!(report.aggregated_metrics.data_points, 1);
        assert!(matches!(
            generator.generate(0).await,
            Err(PipelineError::InvalidWindow { hours: 0 })
        ));
    }

    #[test]
    fn test_non_positive_window_is_rejected() {
        let (_, generator) = generator();
        assert!(matches!(
            generator.generate_at(0, NOW),
            Err(PipelineError::InvalidWindow { hours: 0 })
        ));
        assert!(matches!(
            generator.generate_at(-5, NOW),
            Err(PipelineError::InvalidWindow { hours: -5 })
        ));
    }

    #[test]
    fn test_empty_window_is_nominal() {
        let (_, generator) = generator();
        let report = generator.generate_at(24, NOW).unwrap();

        assert_eq!(report.report_metadata.data_points, 0);
        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.recommendations[0].kind, RecommendationKind::Nominal);
        assert_eq!(report.report_metadata.generated_at_utc, "2023-11-14T22:13:20+00:00");
    }

    #[test]
    fn test_kpi_rules() {
        let mut kpis = BTreeMap::new();
        kpis.insert(
            "optimization_level_score".to_string(),
            StatSummary { avg: 0.5, min: 0.4, max: 0.6 },
        );
        kpis.insert(
            "throughput_per_watt".to_string(),
            StatSummary { avg: 0.2, min: 0.1, max: 0.3 },
        );

        let recs = recommendations(&MetricAggregates::default(), &kpis, &RecommendationRules::default());
        let kinds: Vec<_> = recs.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RecommendationKind::EnableOptimization,
                RecommendationKind::ReviewConfiguration
            ]
        );
    }

    #[test]
    fn test_power_rule() {
        let aggregates = MetricAggregates {
            data_points: 10,
            power: StatSummary { avg: 3600.0, min: 3000.0, max: 4000.0 },
            efficiency: StatSummary { avg: 0.5, min: 0.5, max: 0.5 },
            ..MetricAggregates::default()
        };
        let recs = recommendations(&aggregates, &BTreeMap::new(), &RecommendationRules::default());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationKind::PowerWarning);
    }
}
