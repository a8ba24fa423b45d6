//! Durable time-series storage for samples, KPIs, predictions and alerts
//!
//! Backed by SQLite. All timestamps are unix seconds; every windowed query
//! selects rows with `since < timestamp <= until`.

#[cfg(test)]
mod tests;

use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::{
    Alert, AlertType, KpiValue, MetricSample, Prediction, Severity, TrackedMetric, UnknownVariant,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metric_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    unit_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    throughput REAL NOT NULL,
    power_watts REAL NOT NULL,
    temperature_c REAL NOT NULL,
    efficiency REAL NOT NULL,
    optimization_level INTEGER NOT NULL,
    algorithm_id TEXT NOT NULL,
    uptime_hours REAL NOT NULL,
    derived_cost_per_hour REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_samples_timestamp ON metric_samples(timestamp);
CREATE INDEX IF NOT EXISTS idx_samples_unit_time ON metric_samples(unit_id, timestamp);

CREATE TABLE IF NOT EXISTS kpi_values (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    name TEXT NOT NULL,
    value REAL NOT NULL,
    unit TEXT NOT NULL,
    target REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_kpi_name_time ON kpi_values(name, timestamp);

CREATE TABLE IF NOT EXISTS predictions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    prediction_type TEXT NOT NULL,
    predicted_value REAL NOT NULL,
    confidence REAL NOT NULL,
    time_horizon_hours INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_predictions_timestamp ON predictions(timestamp);

CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    alert_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    resolved INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON alerts(timestamp);
CREATE INDEX IF NOT EXISTS idx_alerts_resolved ON alerts(resolved, timestamp);
"#;

const SAMPLE_COLUMNS: &str = "unit_id, timestamp, throughput, power_watts, temperature_c, \
     efficiency, optimization_level, algorithm_id, uptime_hours, derived_cost_per_hour";

/// Average, minimum and maximum of one metric over a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl StatSummary {
    fn from_row(row: &Row<'_>, first: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            avg: row.get::<_, Option<f64>>(first)?.unwrap_or(0.0),
            min: row.get::<_, Option<f64>>(first + 1)?.unwrap_or(0.0),
            max: row.get::<_, Option<f64>>(first + 2)?.unwrap_or(0.0),
        })
    }
}

/// Per-metric statistics over all samples in a window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAggregates {
    pub data_points: u64,
    pub throughput: StatSummary,
    pub power: StatSummary,
    pub temperature: StatSummary,
    pub efficiency: StatSummary,
}

/// Sample averages for one absolute hour (`timestamp / 3600`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAverages {
    pub hour_bucket: i64,
    pub throughput: f64,
    pub power_watts: f64,
    pub temperature_c: f64,
    pub efficiency: f64,
    pub samples: u64,
}

impl HourlyAverages {
    pub fn value(&self, metric: TrackedMetric) -> f64 {
        match metric {
            TrackedMetric::Throughput => self.throughput,
            TrackedMetric::Power => self.power_watts,
            TrackedMetric::Temperature => self.temperature_c,
            TrackedMetric::Efficiency => self.efficiency,
        }
    }
}

/// Alert count and worst severity for one alert type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub alert_type: AlertType,
    pub count: u64,
    pub max_severity: Severity,
}

/// Averages over a recent window, as shown on the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsOverview {
    pub avg_throughput: f64,
    pub avg_power_watts: f64,
    pub avg_temperature_c: f64,
    pub avg_efficiency: f64,
    pub data_points: u64,
    pub last_update: Option<i64>,
}

/// SQLite-backed metrics store.
///
/// The connection sits behind a mutex so the store can be shared between the
/// collector, the background loops and the read model.
pub struct MetricsStore {
    conn: Mutex<Connection>,
}

impl MetricsStore {
    /// Open or create a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::init(conn)?;
        info!(path = %path.as_ref().display(), "Opened metrics store");
        Ok(store)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| PipelineError::LockPoisoned)
    }

    /// Run `f` against the store on the blocking thread pool.
    ///
    /// SQLite calls block, so async callers go through here instead of
    /// touching the connection on a runtime worker.
    pub async fn run_blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&MetricsStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&store)).await?
    }

    #[cfg(test)]
    pub(crate) fn drop_table(&self, table: &str) -> Result<()> {
        self.conn()?.execute_batch(&format!("DROP TABLE {table};"))?;
        Ok(())
    }

    /// Persist everything produced by one collection tick atomically
    pub fn write_tick(
        &self,
        samples: &[MetricSample],
        kpis: &[KpiValue],
        alerts: &[Alert],
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO metric_samples ({SAMPLE_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ))?;
            for s in samples {
                stmt.execute(params![
                    s.unit_id,
                    s.timestamp,
                    s.throughput,
                    s.power_watts,
                    s.temperature_c,
                    s.efficiency,
                    s.optimization_level,
                    s.algorithm_id,
                    s.uptime_hours,
                    s.derived_cost_per_hour,
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO kpi_values (timestamp, name, value, unit, target)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for k in kpis {
                stmt.execute(params![k.timestamp, k.name.as_str(), k.value, k.unit, k.target])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO alerts (timestamp, alert_type, severity, message, resolved)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for a in alerts {
                stmt.execute(params![
                    a.timestamp,
                    a.alert_type.as_str(),
                    a.severity.as_str(),
                    a.message,
                    a.resolved,
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            samples = samples.len(),
            kpis = kpis.len(),
            alerts = alerts.len(),
            "Persisted collection tick"
        );
        Ok(())
    }

    /// Persist a batch of predictions atomically
    pub fn insert_predictions(&self, predictions: &[Prediction]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO predictions
                 (timestamp, prediction_type, predicted_value, confidence, time_horizon_hours)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for p in predictions {
                stmt.execute(params![
                    p.timestamp,
                    p.prediction_type,
                    p.predicted_value,
                    p.confidence,
                    p.time_horizon_hours,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Samples in `(since, until]`, oldest first
    pub fn samples_between(&self, since: i64, until: i64) -> Result<Vec<MetricSample>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM metric_samples
             WHERE timestamp > ?1 AND timestamp <= ?2 ORDER BY timestamp ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![since, until], sample_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The most recent `limit` samples, oldest first
    pub fn recent_samples(&self, limit: usize) -> Result<Vec<MetricSample>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM metric_samples
             ORDER BY timestamp DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], sample_from_row)?;
        let mut samples = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        samples.reverse();
        Ok(samples)
    }

    /// Per-metric avg/min/max over samples in `(since, until]`
    pub fn aggregate_between(&self, since: i64, until: i64) -> Result<MetricAggregates> {
        let conn = self.conn()?;
        let aggregates = conn.query_row(
            "SELECT COUNT(*),
                    AVG(throughput), MIN(throughput), MAX(throughput),
                    AVG(power_watts), MIN(power_watts), MAX(power_watts),
                    AVG(temperature_c), MIN(temperature_c), MAX(temperature_c),
                    AVG(efficiency), MIN(efficiency), MAX(efficiency)
             FROM metric_samples WHERE timestamp > ?1 AND timestamp <= ?2",
            params![since, until],
            |row| {
                Ok(MetricAggregates {
                    data_points: row.get::<_, i64>(0)? as u64,
                    throughput: StatSummary::from_row(row, 1)?,
                    power: StatSummary::from_row(row, 4)?,
                    temperature: StatSummary::from_row(row, 7)?,
                    efficiency: StatSummary::from_row(row, 10)?,
                })
            },
        )?;
        Ok(aggregates)
    }

    /// Sample averages in `(since, until]` grouped by absolute hour, ascending
    pub fn hourly_averages_between(&self, since: i64, until: i64) -> Result<Vec<HourlyAverages>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp / 3600 AS bucket,
                    AVG(throughput), AVG(power_watts), AVG(temperature_c), AVG(efficiency),
                    COUNT(*)
             FROM metric_samples WHERE timestamp > ?1 AND timestamp <= ?2
             GROUP BY bucket ORDER BY bucket ASC",
        )?;
        let rows = stmt.query_map(params![since, until], |row| {
            Ok(HourlyAverages {
                hour_bucket: row.get(0)?,
                throughput: row.get(1)?,
                power_watts: row.get(2)?,
                temperature_c: row.get(3)?,
                efficiency: row.get(4)?,
                samples: row.get::<_, i64>(5)? as u64,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// avg/min/max for every KPI name recorded in `(since, until]`
    pub fn kpi_stats_between(
        &self,
        since: i64,
        until: i64,
    ) -> Result<BTreeMap<String, StatSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, AVG(value), MIN(value), MAX(value)
             FROM kpi_values WHERE timestamp > ?1 AND timestamp <= ?2 GROUP BY name",
        )?;
        let rows = stmt.query_map(params![since, until], |row| {
            Ok((row.get::<_, String>(0)?, StatSummary::from_row(row, 1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?)
    }

    /// Most recent value of every KPI, ordered by name
    pub fn latest_kpis(&self) -> Result<Vec<KpiValue>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT k.timestamp, k.name, k.value, k.unit, k.target
             FROM kpi_values k
             JOIN (SELECT name, MAX(id) AS id FROM kpi_values GROUP BY name) latest
               ON k.id = latest.id
             ORDER BY k.name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(KpiValue {
                timestamp: row.get(0)?,
                name: parse_column(row, 1)?,
                value: row.get(2)?,
                unit: row.get(3)?,
                target: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Predictions recorded in `(since, until]`, newest first
    pub fn predictions_between(&self, since: i64, until: i64) -> Result<Vec<Prediction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, prediction_type, predicted_value, confidence, time_horizon_hours
             FROM predictions WHERE timestamp > ?1 AND timestamp <= ?2
             ORDER BY timestamp DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![since, until], |row| {
            Ok(Prediction {
                timestamp: row.get(0)?,
                prediction_type: row.get(1)?,
                predicted_value: row.get(2)?,
                confidence: row.get(3)?,
                time_horizon_hours: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Alerts raised in `(since, until]`, grouped by type with their worst severity
    pub fn alert_summary_between(&self, since: i64, until: i64) -> Result<Vec<AlertSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT alert_type, severity, COUNT(*)
             FROM alerts WHERE timestamp > ?1 AND timestamp <= ?2
             GROUP BY alert_type, severity",
        )?;
        let rows = stmt.query_map(params![since, until], |row| {
            Ok((
                parse_column::<AlertType>(row, 0)?,
                parse_column::<Severity>(row, 1)?,
                row.get::<_, i64>(2)? as u64,
            ))
        })?;

        let mut grouped: BTreeMap<AlertType, (u64, Severity)> = BTreeMap::new();
        for row in rows {
            let (alert_type, severity, count) = row?;
            let entry = grouped.entry(alert_type).or_insert((0, severity));
            entry.0 += count;
            entry.1 = entry.1.max(severity);
        }

        Ok(grouped
            .into_iter()
            .map(|(alert_type, (count, max_severity))| AlertSummary {
                alert_type,
                count,
                max_severity,
            })
            .collect())
    }

    /// Up to `limit` unresolved alerts, newest first
    pub fn unresolved_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, alert_type, severity, message, resolved
             FROM alerts WHERE resolved = 0
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], alert_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Mark an alert resolved. Returns false if it was missing or already resolved.
    pub fn resolve_alert(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE alerts SET resolved = 1 WHERE id = ?1 AND resolved = 0",
            params![id],
        )?;
        Ok(changed > 0)
    }

    /// Averages and latest sample time over samples in `(since, until]`
    pub fn overview_between(&self, since: i64, until: i64) -> Result<MetricsOverview> {
        let conn = self.conn()?;
        let overview = conn.query_row(
            "SELECT AVG(throughput), AVG(power_watts), AVG(temperature_c), AVG(efficiency),
                    COUNT(*), MAX(timestamp)
             FROM metric_samples WHERE timestamp > ?1 AND timestamp <= ?2",
            params![since, until],
            |row| {
                Ok(MetricsOverview {
                    avg_throughput: row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                    avg_power_watts: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                    avg_temperature_c: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    avg_efficiency: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    data_points: row.get::<_, i64>(4)? as u64,
                    last_update: row.get(5)?,
                })
            },
        )?;
        Ok(overview)
    }
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<MetricSample> {
    Ok(MetricSample {
        unit_id: row.get(0)?,
        timestamp: row.get(1)?,
        throughput: row.get(2)?,
        power_watts: row.get(3)?,
        temperature_c: row.get(4)?,
        efficiency: row.get(5)?,
        optimization_level: row.get(6)?,
        algorithm_id: row.get(7)?,
        uptime_hours: row.get(8)?,
        derived_cost_per_hour: row.get(9)?,
    })
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: Some(row.get(0)?),
        timestamp: row.get(1)?,
        alert_type: parse_column(row, 2)?,
        severity: parse_column(row, 3)?,
        message: row.get(4)?,
        resolved: row.get(5)?,
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
