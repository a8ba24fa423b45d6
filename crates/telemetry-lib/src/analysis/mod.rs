//! Trend and correlation analysis over stored samples

mod analyzer;
mod correlation;
mod trend;

pub use analyzer::{AnalysisConfig, TrendAnalyzer};
pub use correlation::{detect_correlations, CORRELATION_CONFIDENCE, CORRELATION_PAIRS};
pub use trend::{analyze_trends, Trend, TREND_CONFIDENCE};
