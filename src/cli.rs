//! Command-line interface definitions and argument parsing

use crate::config::{PipelineConfig, DEFAULT_DASHBOARD_URL};
use crate::data::{FileLoader, Loader, RemoteListLoader};
use crate::error::PipelineError;
use clap::Parser;
use std::time::Duration;

/// Lead analytics: revenue forecast and customer segments from a lead list
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV or spreadsheet file
    #[arg(short, long, conflicts_with = "sharepoint_url")]
    pub input: Option<String>,

    /// SharePoint site URL to read the lead list from
    #[arg(long)]
    pub sharepoint_url: Option<String>,

    /// Title of the remote list
    #[arg(long, default_value = "Leads")]
    pub list_title: String,

    /// Client id for the remote list
    #[arg(long, env = "LEADFORGE_CLIENT_ID", default_value = "")]
    pub client_id: String,

    /// Client secret for the remote list
    #[arg(long, env = "LEADFORGE_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub client_secret: String,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Give up on a model fit after this many seconds
    #[arg(long, default_value = "30")]
    pub fit_timeout_secs: u64,

    /// Dashboard link appended to the report
    #[arg(long, default_value = DEFAULT_DASHBOARD_URL)]
    pub dashboard_url: String,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Pipeline settings derived from the flags
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_iters: self.max_iters,
            tolerance: self.tolerance,
            fit_timeout: Duration::from_secs(self.fit_timeout_secs),
            ..PipelineConfig::default()
        }
    }

    /// Pick the lead source: a local file, or the remote list
    pub fn loader(&self) -> Result<Box<dyn Loader>, PipelineError> {
        if let Some(ref path) = self.input {
            return Ok(Box::new(FileLoader::open(path)?));
        }
        if let Some(ref url) = self.sharepoint_url {
            return Ok(Box::new(
                RemoteListLoader::new(url, &self.client_id, &self.client_secret)
                    .with_list_title(&self.list_title),
            ));
        }
        Err(PipelineError::load(
            "no input provided: pass --input or --sharepoint-url",
        ))
    }
}
