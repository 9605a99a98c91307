//! Mean imputation and standard scaling of numeric columns

use crate::error::PipelineError;
use crate::table::Table;
use linfa::traits::{Fit, Transformer};
use linfa::Dataset;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{Array1, Array2};
use tracing::{debug, warn};

/// Offset and spread of one column as fitted by the standard scaler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub mean: f64,
    pub std: f64,
}

impl ColumnStats {
    /// Divisor used for scaling; constant columns keep unit scale
    pub fn scale(&self) -> f64 {
        if self.std > 0.0 {
            self.std
        } else {
            1.0
        }
    }

    /// Map a standardized value back to original units
    pub fn inverse(&self, z: f64) -> f64 {
        z * self.scale() + self.mean
    }
}

/// Statistics fitted by the preprocessor, one entry per scaled column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FittedScaler {
    stats: Vec<(String, ColumnStats)>,
}

impl FittedScaler {
    pub fn stats(&self, column: &str) -> Option<ColumnStats> {
        self.stats
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, stats)| *stats)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.stats.iter().map(|(name, _)| name.as_str())
    }
}

/// Fills gaps in numeric columns and rescales them to zero mean, unit variance
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor;

impl Preprocessor {
    /// Impute and standardize every numeric column in place
    ///
    /// Columns whose values are all missing are left untouched and are not
    /// scaled. Non-numeric columns are never modified.
    pub fn run(&self, table: &mut Table) -> Result<FittedScaler, PipelineError> {
        let n_rows = table.height();
        if n_rows == 0 {
            return Err(PipelineError::InsufficientData(
                "table has no rows".to_string(),
            ));
        }

        let mut names = Vec::new();
        let mut populated: Vec<Vec<f64>> = Vec::new();

        for (name, values) in table.numeric_columns_mut() {
            let present: Vec<f64> = values.iter().flatten().copied().collect();
            if present.is_empty() {
                warn!("Column '{}' has no values; leaving it unchanged", name);
                continue;
            }

            let missing = n_rows - present.len();
            if missing > 0 {
                let mean = present.iter().sum::<f64>() / present.len() as f64;
                debug!("Imputing {} missing values in '{}' with {:.4}", missing, name, mean);
                for value in values.iter_mut().filter(|v| v.is_none()) {
                    *value = Some(mean);
                }
            }

            names.push(name.to_string());
            populated.push(values.iter().flatten().copied().collect());
        }

        if names.is_empty() {
            return Ok(FittedScaler::default());
        }

        let records = Array2::from_shape_fn((n_rows, names.len()), |(row, col)| populated[col][row]);
        let dataset = Dataset::new(records.clone(), Array1::<usize>::zeros(n_rows));
        let scaler = LinearScaler::standard()
            .fit(&dataset)
            .map_err(|e| PipelineError::InsufficientData(e.to_string()))?;
        let scaled: Array2<f64> = scaler.transform(records);

        for (name, values) in table.numeric_columns_mut() {
            if let Some(col) = names.iter().position(|n| n == name) {
                for (value, z) in values.iter_mut().zip(scaled.column(col)) {
                    *value = Some(*z);
                }
            }
        }

        debug!("Standardized {} numeric columns", names.len());

        let stats = scaler
            .offsets()
            .iter()
            .zip(scaler.scales().iter())
            .map(|(&mean, &scale)| ColumnStats {
                mean,
                std: scale.recip(),
            });

        Ok(FittedScaler {
            stats: names.into_iter().zip(stats).collect(),
        })
    }
}
