//! LeadForge: lead analytics with revenue forecasting and K-Means customer segmentation
//!
//! A run loads a lead table (uploaded file or remote list), imputes and
//! standardizes its numeric columns, forecasts revenue with a random forest,
//! segments leads with K-Means and assembles the results into one
//! [`InsightsRecord`].

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod forecast;
pub mod guard;
pub mod insights;
pub mod preprocess;
pub mod segment;
pub mod table;

// Re-export public items for easier access
pub use cli::Args;
pub use config::PipelineConfig;
pub use data::{FileLoader, Loader, RemoteListLoader};
pub use error::PipelineError;
pub use forecast::Forecaster;
pub use insights::{InsightAggregator, InsightsRecord};
pub use preprocess::{FittedScaler, Preprocessor};
pub use segment::{fit_kmeans, KMeansModel, SegmentCounts, Segmenter};
pub use table::{Column, ColumnData, Table};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
