//! In-memory lead table shared by the pipeline stages of one run

use crate::error::PipelineError;
use chrono::NaiveDateTime;

/// Values of a single column, tagged by inferred semantic type
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    Date(Vec<Option<NaiveDateTime>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnData::Numeric(_))
    }

    /// Permute values so that position `i` holds the old value at `order[i]`
    fn reorder(&mut self, order: &[usize]) {
        fn permute<T: Clone>(values: &mut Vec<T>, order: &[usize]) {
            *values = order.iter().map(|&i| values[i].clone()).collect();
        }
        match self {
            ColumnData::Numeric(v) => permute(v, order),
            ColumnData::Text(v) => permute(v, order),
            ColumnData::Date(v) => permute(v, order),
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnData::Numeric(values))
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self::new(name, ColumnData::Text(values))
    }
}

/// Ordered collection of named columns over a fixed row count
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// Build a table, checking that every column has the same length
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, PipelineError> {
        let n_rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        let mut table = Table {
            columns: Vec::with_capacity(columns.len()),
            n_rows,
        };
        for column in columns {
            table.set_column(column)?;
        }
        Ok(table)
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.n_rows
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Insert a column, replacing any existing column with the same name
    pub fn set_column(&mut self, column: Column) -> Result<(), PipelineError> {
        if column.data.len() != self.n_rows {
            return Err(PipelineError::ColumnLength {
                column: column.name,
                expected: self.n_rows,
                actual: column.data.len(),
            });
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Raw values of a numeric column
    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Numeric(values)) => Some(values),
            _ => None,
        }
    }

    /// Values of a numeric column, or `None` if it is absent or has gaps
    pub fn complete_numeric(&self, name: &str) -> Option<Vec<f64>> {
        self.numeric(name)?.iter().copied().collect()
    }

    pub fn numeric_columns_mut(&mut self) -> impl Iterator<Item = (&str, &mut Vec<Option<f64>>)> {
        self.columns
            .iter_mut()
            .filter_map(|Column { name, data }| match data {
                ColumnData::Numeric(values) => Some((name.as_str(), values)),
                _ => None,
            })
    }

    /// Reorder every column by the given row permutation
    pub fn reorder_rows(&mut self, order: &[usize]) {
        debug_assert_eq!(order.len(), self.n_rows);
        for column in &mut self.columns {
            column.data.reorder(order);
        }
    }
}
