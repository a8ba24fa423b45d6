//! Telemetry and analytics pipeline library
//!
//! This crate provides the core functionality for:
//! - Periodic collection of per-unit readings and collaborator summaries
//! - Threshold alerting and KPI evaluation
//! - Trend, correlation and forecast analysis over stored history
//! - Historical reports and a read-only dashboard facade
//! - Health checks and observability

pub mod alerting;
pub mod analysis;
pub mod buffer;
pub mod collector;
pub mod dashboard;
pub mod error;
pub mod health;
pub mod kpi;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod predictor;
pub mod report;
pub mod source;
pub mod stats;
pub mod store;

pub use dashboard::{DashboardState, TelemetryDashboard};
pub use error::{PipelineError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineConfig};
pub use store::MetricsStore;
