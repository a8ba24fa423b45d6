use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::TrackedMetric;
use crate::stats::{linear_regression_slope, mean, normalize_trend};

/// Shortest history a forecaster will extrapolate from
pub const MIN_HISTORY: usize = 100;

/// Trailing values used to estimate level and drift
pub const RECENT_VALUES: usize = 10;

pub trait Forecaster: Send + Sync {
    /// Value of `metric` expected `horizon_hours` after the last entry of
    /// `history` (oldest first). Short histories return the last value
    /// unchanged, and an empty history returns 0.
    fn forecast(&self, history: &[f64], metric: TrackedMetric, horizon_hours: u32) -> f64;

    fn name(&self) -> &'static str;
}

/// Bounded per-hour drift estimated from the tail of `history`
fn drift(recent: &[f64], metric: TrackedMetric, horizon_hours: u32) -> f64 {
    let trend = normalize_trend(linear_regression_slope(recent), metric.trend_scale());
    trend * f64::from(horizon_hours) * metric.forecast_step()
}

fn tail(history: &[f64], n: usize) -> &[f64] {
    &history[history.len().saturating_sub(n)..]
}

/// Mean of the recent values plus drift
#[derive(Debug, Clone)]
pub struct MeanDriftForecaster {
    pub min_history: usize,
    pub recent_values: usize,
}

impl Default for MeanDriftForecaster {
    fn default() -> Self {
        Self {
            min_history: MIN_HISTORY,
            recent_values: RECENT_VALUES,
        }
    }
}

impl Forecaster for MeanDriftForecaster {
    fn forecast(&self, history: &[f64], metric: TrackedMetric, horizon_hours: u32) -> f64 {
        let Some(&last) = history.last() else {
            return 0.0;
        };
        if history.len() < self.min_history {
            return last;
        }
        let recent = tail(history, self.recent_values);
        mean(recent) + drift(recent, metric, horizon_hours)
    }

    fn name(&self) -> &'static str {
        "mean_drift"
    }
}

/// Last observed value plus drift.
///
/// A strictly increasing history never forecasts below its last value, which
/// the mean-anchored model cannot guarantee.
#[derive(Debug, Clone)]
pub struct AnchoredDriftForecaster {
    pub min_history: usize,
    pub recent_values: usize,
}

impl Default for AnchoredDriftForecaster {
    fn default() -> Self {
        Self {
            min_history: MIN_HISTORY,
            recent_values: RECENT_VALUES,
        }
    }
}

impl Forecaster for AnchoredDriftForecaster {
    fn forecast(&self, history: &[f64], metric: TrackedMetric, horizon_hours: u32) -> f64 {
        let Some(&last) = history.last() else {
            return 0.0;
        };
        if history.len() < self.min_history {
            return last;
        }
        let recent = tail(history, self.recent_values);
        last + drift(recent, metric, horizon_hours)
    }

    fn name(&self) -> &'static str {
        "anchored_drift"
    }
}

/// Selectable forecast model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastModel {
    MeanDrift,
    #[default]
    AnchoredDrift,
}

impl ForecastModel {
    pub fn build(&self, min_history: usize, recent_values: usize) -> Arc<dyn Forecaster> {
        match self {
            ForecastModel::MeanDrift => Arc::new(MeanDriftForecaster {
                min_history,
                recent_values,
            }),
            ForecastModel::AnchoredDrift => Arc::new(AnchoredDriftForecaster {
                min_history,
                recent_values,
            }),
        }
    }
}
