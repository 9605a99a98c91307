//! Short-horizon revenue forecast with a random forest over elapsed days

use crate::config::{PipelineConfig, DATE_COLUMN, DAYS_COLUMN, REVENUE_COLUMN};
use crate::error::PipelineError;
use crate::guard::run_with_timeout;
use crate::preprocess::FittedScaler;
use crate::table::{Column, ColumnData, Table};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::time::Duration;
use tracing::{debug, info, warn};

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%b %d, %Y",
];

/// Projects mean revenue over the days following the last observed lead
#[derive(Debug, Clone)]
pub struct Forecaster {
    /// Number of future days averaged into the forecast
    pub horizon: usize,
    /// Trees in the forest
    pub n_estimators: usize,
    pub timeout: Duration,
}

impl Default for Forecaster {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl Forecaster {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            horizon: config.forecast_horizon,
            n_estimators: config.n_estimators,
            timeout: config.fit_timeout,
        }
    }

    /// Forecast mean revenue, in the revenue column's original units
    ///
    /// Parses the date column, sorts the table by date and adds a `Days`
    /// column with whole days elapsed since the earliest lead. Returns `None`
    /// when the revenue or date column is absent, or when fitting fails.
    pub fn forecast(&self, table: &mut Table, scaler: &FittedScaler) -> Option<f64> {
        if !table.has_column(REVENUE_COLUMN) || !table.has_column(DATE_COLUMN) {
            debug!(
                "Skipping forecast: needs '{}' and '{}'",
                REVENUE_COLUMN, DATE_COLUMN
            );
            return None;
        }

        match self.try_forecast(table, scaler) {
            Ok(value) => {
                info!("Revenue forecast over {} days: {:.4}", self.horizon, value);
                Some(value)
            }
            Err(e) => {
                warn!("Revenue forecast unavailable: {}", e);
                None
            }
        }
    }

    fn try_forecast(&self, table: &mut Table, scaler: &FittedScaler) -> Result<f64, PipelineError> {
        let dates = parse_date_column(table)?;
        let revenue = table.complete_numeric(REVENUE_COLUMN).ok_or_else(|| {
            PipelineError::model(format!("'{}' is not a complete numeric column", REVENUE_COLUMN))
        })?;

        let mut order: Vec<usize> = (0..dates.len()).collect();
        order.sort_by_key(|&i| dates[i]);
        table.reorder_rows(&order);
        let dates: Vec<NaiveDateTime> = order.iter().map(|&i| dates[i]).collect();
        let revenue: Vec<f64> = order.iter().map(|&i| revenue[i]).collect();
        table.set_column(Column::new(
            DATE_COLUMN,
            ColumnData::Date(dates.iter().copied().map(Some).collect()),
        ))?;

        let days = elapsed_days(&dates);
        table.set_column(Column::numeric(
            DAYS_COLUMN,
            days.iter().map(|&d| Some(d as f64)).collect(),
        ))?;

        let horizon = self.horizon;
        let n_estimators = self.n_estimators;
        let prediction = run_with_timeout("forecast", self.timeout, move || {
            fit_and_project(&days, &revenue, n_estimators, horizon)
        })?;

        // The revenue column was standardized by the preprocessor
        Ok(match scaler.stats(REVENUE_COLUMN) {
            Some(stats) => stats.inverse(prediction),
            None => prediction,
        })
    }
}

/// Fit the forest on (days, revenue) and average its predictions for the
/// `horizon` days after the last observation
fn fit_and_project(
    days: &[i64],
    revenue: &[f64],
    n_estimators: usize,
    horizon: usize,
) -> Result<f64, PipelineError> {
    let last_day = days
        .iter()
        .copied()
        .max()
        .ok_or_else(|| PipelineError::model("no observations to fit"))?;
    if horizon == 0 {
        return Err(PipelineError::model("forecast horizon must be positive"));
    }

    let x = DenseMatrix::from_2d_vec(&days.iter().map(|&d| vec![d as f64]).collect());
    let y = revenue.to_vec();

    let params = RandomForestRegressorParameters::default()
        .with_n_trees(n_estimators)
        .with_m(1)
        .with_seed(rand::random());
    let model: RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>> =
        RandomForestRegressor::fit(&x, &y, params).map_err(PipelineError::model)?;

    let future = DenseMatrix::from_2d_vec(
        &(1..=horizon as i64)
            .map(|step| vec![(last_day + step) as f64])
            .collect(),
    );
    let predictions = model.predict(&future).map_err(PipelineError::model)?;

    Ok(predictions.iter().sum::<f64>() / predictions.len() as f64)
}

/// Whole days since the earliest date
fn elapsed_days(dates: &[NaiveDateTime]) -> Vec<i64> {
    match dates.iter().min() {
        Some(&first) => dates.iter().map(|&d| (d - first).num_days()).collect(),
        None => Vec::new(),
    }
}

fn parse_date_column(table: &Table) -> Result<Vec<NaiveDateTime>, PipelineError> {
    let column = table
        .column(DATE_COLUMN)
        .ok_or_else(|| PipelineError::model(format!("missing '{}'", DATE_COLUMN)))?;

    let missing = || PipelineError::model(format!("'{}' has missing values", DATE_COLUMN));

    match &column.data {
        ColumnData::Date(values) => values.iter().map(|v| v.ok_or_else(missing)).collect(),
        ColumnData::Text(values) => values
            .iter()
            .map(|v| {
                let raw = v.as_deref().ok_or_else(missing)?;
                parse_datetime(raw).ok_or_else(|| {
                    PipelineError::model(format!("cannot parse '{}' as a date", raw))
                })
            })
            .collect(),
        ColumnData::Numeric(_) => Err(PipelineError::model(format!(
            "'{}' is numeric, expected dates",
            DATE_COLUMN
        ))),
    }
}

/// Parse a date or date-time in one of the common spreadsheet formats
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(dt);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::Preprocessor;

    fn leads(revenue: &[f64], dates: &[&str]) -> Table {
        Table::from_columns(vec![
            Column::numeric(REVENUE_COLUMN, revenue.iter().map(|&r| Some(r)).collect()),
            Column::text(DATE_COLUMN, dates.iter().map(|d| Some(d.to_string())).collect()),
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        for raw in ["2024-03-05", "2024/03/05", "03/05/2024", "2024-03-05T00:00:00Z", "2024-03-05 00:00:00"] {
            assert_eq!(parse_datetime(raw), Some(expected), "{}", raw);
        }
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn test_elapsed_days() {
        let dates: Vec<NaiveDateTime> = ["2024-01-10", "2024-01-01", "2024-01-03T18:00:00"]
            .iter()
            .map(|d| parse_datetime(d).unwrap())
            .collect();
        assert_eq!(elapsed_days(&dates), vec![9, 0, 2]);
    }

    #[test]
    fn test_forecast_sorts_and_adds_days() {
        let mut table = leads(&[300.0, 100.0, 200.0], &["2024-01-09", "2024-01-01", "2024-01-05"]);
        let scaler = Preprocessor.run(&mut table).unwrap();

        let forecast = Forecaster::default().forecast(&mut table, &scaler);
        let value = forecast.expect("forecast should be available");

        assert!(value.is_finite());
        assert!((100.0..=300.0).contains(&value), "forecast {} out of range", value);
        assert_eq!(
            table.numeric(DAYS_COLUMN).unwrap(),
            &[Some(0.0), Some(4.0), Some(8.0)]
        );
        // Rows follow the dates: revenue is now increasing
        let revenue = table.complete_numeric(REVENUE_COLUMN).unwrap();
        assert!(revenue.windows(2).all(|w| w[0] < w[1]));
        assert!(matches!(
            table.column(DATE_COLUMN).unwrap().data,
            ColumnData::Date(_)
        ));
    }

    #[test]
    fn test_forecast_is_stable_for_flat_revenue() {
        let mut table = leads(&[50.0; 4], &["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"]);
        let scaler = Preprocessor.run(&mut table).unwrap();

        let value = Forecaster::default().forecast(&mut table, &scaler).unwrap();
        assert!((value - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_forecast_needs_date_column() {
        let mut table = Table::from_columns(vec![Column::numeric(
            REVENUE_COLUMN,
            vec![Some(1.0), Some(2.0)],
        )])
        .unwrap();
        let scaler = Preprocessor.run(&mut table).unwrap();

        assert_eq!(Forecaster::default().forecast(&mut table, &scaler), None);
        assert!(!table.has_column(DAYS_COLUMN));
    }

    #[test]
    fn test_unparseable_date_yields_none() {
        let mut table = leads(&[1.0, 2.0], &["2024-01-01", "not a date"]);
        let scaler = Preprocessor.run(&mut table).unwrap();
        assert_eq!(Forecaster::default().forecast(&mut table, &scaler), None);
    }
}
