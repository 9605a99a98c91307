//! Pipeline configuration and well-known column names

use std::time::Duration;

/// Revenue-like numeric column used by stats, forecasting and segmentation
pub const REVENUE_COLUMN: &str = "Estimated Revenue";
/// 0/1 conversion flag
pub const CONVERTED_COLUMN: &str = "Converted";
/// Date the lead was created
pub const DATE_COLUMN: &str = "Lead Date";
/// Derived elapsed-days column written by the forecaster
pub const DAYS_COLUMN: &str = "Days";
/// Derived segment label column written by the segmenter
pub const SEGMENT_COLUMN: &str = "Segment";

/// Static report link appended by the binary
pub const DEFAULT_DASHBOARD_URL: &str = "https://powerbi.com/report/generated_dashboard";

/// Tunables for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of future days projected by the forecaster
    pub forecast_horizon: usize,
    /// Trees in the random forest
    pub n_estimators: usize,
    /// Number of K-Means clusters
    pub n_segments: usize,
    /// Seed for K-Means initialization
    pub segment_seed: u64,
    /// Maximum iterations for K-Means
    pub max_iters: u64,
    /// Tolerance for K-Means convergence
    pub tolerance: f64,
    /// Upper bound on a single model fit
    pub fit_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            forecast_horizon: 30,
            n_estimators: 100,
            n_segments: 3,
            segment_seed: 42,
            max_iters: 300,
            tolerance: 1e-4,
            fit_timeout: Duration::from_secs(30),
        }
    }
}
