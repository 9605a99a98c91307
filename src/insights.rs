//! Insight aggregation: preprocessing, forecasting and segmentation of one table

use crate::config::{PipelineConfig, CONVERTED_COLUMN, REVENUE_COLUMN};
use crate::error::PipelineError;
use crate::forecast::Forecaster;
use crate::preprocess::{FittedScaler, Preprocessor};
use crate::segment::{SegmentCounts, Segmenter};
use crate::table::Table;
use serde::Serialize;
use tracing::{debug, info, info_span};

/// Business insights derived from one lead table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightsRecord {
    #[serde(rename = "Total Leads")]
    pub total_leads: usize,
    #[serde(rename = "Average Revenue per Lead")]
    pub average_revenue: Option<f64>,
    #[serde(rename = "Conversion Rate")]
    pub conversion_rate: Option<f64>,
    #[serde(rename = "Revenue Forecast")]
    pub revenue_forecast: Option<f64>,
    #[serde(rename = "Customer Segments")]
    pub customer_segments: Option<SegmentCounts>,
}

/// Runs the stages over a table owned by the caller
///
/// Holds configuration only, so one aggregator can serve concurrent runs
/// as long as each run has its own table.
#[derive(Debug, Clone, Default)]
pub struct InsightAggregator {
    preprocessor: Preprocessor,
    forecaster: Forecaster,
    segmenter: Segmenter,
}

impl InsightAggregator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            preprocessor: Preprocessor,
            forecaster: Forecaster::from_config(config),
            segmenter: Segmenter::from_config(config),
        }
    }

    /// Build the insights record
    ///
    /// Only preprocessing failures abort the run. A missing column or a
    /// failed model fit leaves the corresponding field empty. The table is
    /// left standardized, sorted by date when a forecast ran, and with the
    /// derived `Days` and `Segment` columns.
    pub fn run(&self, table: &mut Table) -> Result<InsightsRecord, PipelineError> {
        let span = info_span!("insights", rows = table.height());
        let _enter = span.enter();

        let scaler = self.preprocessor.run(table)?;
        debug!("Preprocessed columns: {:?}", scaler.columns().collect::<Vec<_>>());

        let total_leads = table.height();
        let average_revenue = column_mean(&scaler, REVENUE_COLUMN);
        let conversion_rate = column_mean(&scaler, CONVERTED_COLUMN);
        let revenue_forecast = self.forecaster.forecast(table, &scaler);
        let customer_segments = self.segmenter.segment(table);

        let record = InsightsRecord {
            total_leads,
            average_revenue,
            conversion_rate,
            revenue_forecast,
            customer_segments,
        };
        info!("Generated insights for {} leads", record.total_leads);
        Ok(record)
    }
}

/// Mean of a numeric column after imputation, in original units
fn column_mean(scaler: &FittedScaler, column: &str) -> Option<f64> {
    scaler.stats(column).map(|stats| stats.mean)
}
