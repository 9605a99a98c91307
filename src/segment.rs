//! Customer segmentation with K-Means over the revenue column

use crate::config::{PipelineConfig, REVENUE_COLUMN, SEGMENT_COLUMN};
use crate::error::PipelineError;
use crate::guard::run_with_timeout;
use crate::table::{Column, Table};
use linfa::traits::{Fit, Predict};
use linfa::Dataset;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Number of rows per segment label; labels without rows are omitted
pub type SegmentCounts = BTreeMap<usize, usize>;

/// Fitted K-Means parameters for one run
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids in standardized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl KMeansModel {
    /// Get cluster sizes, including empty clusters
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Label -> row count for labels that were assigned at least once
    pub fn segment_counts(&self) -> SegmentCounts {
        self.cluster_sizes()
            .into_iter()
            .enumerate()
            .filter(|&(_, size)| size > 0)
            .collect()
    }
}

/// Fit K-Means on a feature matrix
///
/// # Arguments
/// * `features` - One row per lead
/// * `n_clusters` - Number of clusters
/// * `seed` - Seed for centroid initialization
/// * `max_iters` - Maximum iterations for convergence
/// * `tolerance` - Convergence tolerance
pub fn fit_kmeans(
    features: &Array2<f64>,
    n_clusters: usize,
    seed: u64,
    max_iters: u64,
    tolerance: f64,
) -> Result<KMeansModel, PipelineError> {
    if n_clusters == 0 {
        return Err(PipelineError::model("number of clusters must be positive"));
    }
    if features.nrows() < n_clusters {
        return Err(PipelineError::model(format!(
            "number of rows ({}) must be at least equal to number of clusters ({})",
            features.nrows(),
            n_clusters
        )));
    }

    let n_samples = features.nrows();
    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(features.clone(), targets);

    let rng = StdRng::seed_from_u64(seed);
    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .max_n_iterations(max_iters)
        .tolerance(tolerance)
        .fit(&dataset)
        .map_err(PipelineError::model)?;

    let labels: Array1<usize> = model.predict(features);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(features, &labels, &centroids);

    Ok(KMeansModel {
        n_clusters,
        labels,
        centroids,
        inertia,
    })
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;

    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            let point = features.row(i);
            let centroid = centroids.row(cluster);
            inertia += point
                .iter()
                .zip(centroid.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>();
        }
    }

    inertia
}

/// Assigns each lead a revenue segment
#[derive(Debug, Clone)]
pub struct Segmenter {
    pub n_segments: usize,
    pub seed: u64,
    pub max_iters: u64,
    pub tolerance: f64,
    pub timeout: Duration,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl Segmenter {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            n_segments: config.n_segments,
            seed: config.segment_seed,
            max_iters: config.max_iters,
            tolerance: config.tolerance,
            timeout: config.fit_timeout,
        }
    }

    /// Cluster rows on the revenue column and add a `Segment` column
    ///
    /// Returns `None` when the revenue column is absent or incomplete, or
    /// when the model cannot be fitted.
    pub fn segment(&self, table: &mut Table) -> Option<SegmentCounts> {
        if !table.has_column(REVENUE_COLUMN) {
            debug!("Skipping segmentation: needs '{}'", REVENUE_COLUMN);
            return None;
        }

        match self.try_segment(table) {
            Ok(model) => {
                let counts = model.segment_counts();
                info!(
                    "Segmented {} leads into {:?} (inertia {:.4})",
                    model.labels.len(),
                    counts,
                    model.inertia
                );
                Some(counts)
            }
            Err(e) => {
                warn!("Customer segmentation unavailable: {}", e);
                None
            }
        }
    }

    fn try_segment(&self, table: &mut Table) -> Result<KMeansModel, PipelineError> {
        let revenue = table.complete_numeric(REVENUE_COLUMN).ok_or_else(|| {
            PipelineError::model(format!("'{}' is not a complete numeric column", REVENUE_COLUMN))
        })?;
        let features = Array2::from_shape_vec((revenue.len(), 1), revenue)
            .map_err(PipelineError::model)?;

        let (n_segments, seed, max_iters, tolerance) =
            (self.n_segments, self.seed, self.max_iters, self.tolerance);
        let model = run_with_timeout("segment", self.timeout, move || {
            fit_kmeans(&features, n_segments, seed, max_iters, tolerance)
        })?;

        table.set_column(Column::numeric(
            SEGMENT_COLUMN,
            model.labels.iter().map(|&l| Some(l as f64)).collect(),
        ))?;

        Ok(model)
    }
}
