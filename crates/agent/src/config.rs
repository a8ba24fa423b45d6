//! Agent configuration

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use telemetry_lib::alerting::AlertMode;
use telemetry_lib::pipeline::PipelineConfig;
use telemetry_lib::report::ReportScheduleConfig;

/// Optional config file, looked up in the working directory
const CONFIG_FILE: &str = "telemetry-agent";

/// Environment variable prefix, e.g. `TELEMETRY_API_PORT`
const ENV_PREFIX: &str = "TELEMETRY";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name attached to every structured log record
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Monitored units (`TELEMETRY_UNIT_IDS=rig-1,rig-2`)
    #[serde(default = "default_unit_ids")]
    pub unit_ids: Vec<String>,

    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,

    #[serde(default = "default_prediction_interval")]
    pub prediction_interval_secs: u64,

    /// Scheduled report interval; 0 disables scheduled reports
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    #[serde(default)]
    pub alert_mode: AlertMode,

    #[serde(default = "default_energy_price")]
    pub energy_price_per_kwh: f64,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_database_path() -> PathBuf {
    PathBuf::from("telemetry.db")
}

fn default_unit_ids() -> Vec<String> {
    vec!["unit-1".to_string(), "unit-2".to_string(), "unit-3".to_string()]
}

fn default_collection_interval() -> u64 {
    5
}

fn default_analysis_interval() -> u64 {
    60
}

fn default_prediction_interval() -> u64 {
    300
}

fn default_report_interval() -> u64 {
    24 * 60 * 60
}

fn default_energy_price() -> f64 {
    0.20
}

fn default_shutdown_timeout() -> u64 {
    5
}

impl AgentConfig {
    /// Load configuration from the optional config file, then the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("unit_ids"),
            )
            .build()?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        Ok(config.try_deserialize()?)
    }

    /// Pipeline settings derived from the agent settings
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut pipeline = PipelineConfig::default();
        pipeline.collection.interval = Duration::from_secs(self.collection_interval_secs.max(1));
        pipeline.collection.energy_price_per_kwh = self.energy_price_per_kwh;
        pipeline.analysis.interval = Duration::from_secs(self.analysis_interval_secs.max(1));
        pipeline.prediction.interval = Duration::from_secs(self.prediction_interval_secs.max(1));
        pipeline.alert_mode = self.alert_mode;
        pipeline.shutdown_timeout = Duration::from_secs(self.shutdown_timeout_secs);
        pipeline.reports = (self.report_interval_secs > 0).then(|| ReportScheduleConfig {
            interval: Duration::from_secs(self.report_interval_secs),
            ..ReportScheduleConfig::default()
        });
        pipeline
    }
}
