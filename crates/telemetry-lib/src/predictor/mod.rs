//! Short-horizon forecasting
//!
//! A [`Forecaster`] turns a metric history into a single value `horizon`
//! hours ahead. The scheduler runs it periodically for every tracked metric
//! and stores the results as predictions.

mod forecast;
mod scheduler;

pub use forecast::{
    AnchoredDriftForecaster, ForecastModel, Forecaster, MeanDriftForecaster, MIN_HISTORY,
    RECENT_VALUES,
};
pub use scheduler::{PredictionConfig, PredictionScheduler, FORECAST_CONFIDENCE};
