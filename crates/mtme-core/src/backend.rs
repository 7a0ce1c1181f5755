use core::fmt;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde_json::Value;

use crate::results::{Comparison, CorrRanks, Matrix};
use crate::task::{AverageBy, CorrelationFunction, Level, PermutationTest};
use crate::Result;

/// Early-stopping parameters for permutation significance tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PermutationSigParams {
    /// Number of resamples drawn between early-stop checks
    pub block_size: u32,
    /// Stop once the p-value estimate falls below this bound
    pub early_min: f64,
    /// Stop once the p-value estimate rises above this bound
    pub early_max: f64,
}

/// Selection of scores to correlate for a single language pair.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationQuery<'query> {
    /// Scoring granularity
    pub level: Level,
    /// References used by reference-based metrics
    pub refs: &'query BTreeSet<String>,
    /// References too close to `refs` to be scored as systems
    pub close_refs: &'query BTreeSet<String>,
    /// Include human translations as systems
    pub include_human: bool,
    /// Include outlier systems
    pub use_outliers: bool,
    /// Gold score label
    pub gold: &'query str,
    /// Restrict to primary metric submissions
    pub primary_only: bool,
    /// Restrict to one domain
    pub domain: Option<&'query str>,
    /// Name metrics the way comparison tables expect
    pub spreadsheet_metric_names: bool,
}

/// Parameters for comparing metrics on one language pair.
#[derive(Debug, Clone, Copy)]
pub struct ComparisonParams<'query> {
    /// Correlation statistic
    pub corr_fcn: CorrelationFunction,
    /// Averaging mode
    pub avg_by: AverageBy,
    /// Number of resampling runs for significance
    pub k: u32,
    /// Early-stopping parameters
    pub sig: PermutationSigParams,
    /// Significance threshold
    pub pval: f64,
    /// Replace NaN scores with zeros before correlating
    pub replace_nans_with_zeros: bool,
    /// Permutation strategy
    pub perm_test: PermutationTest,
    /// Extra arguments for the correlation function, sorted by key
    pub corr_fcn_args: &'query BTreeMap<String, Value>,
}

/// Parameters for a system-level global accuracy comparison over several language pairs.
///
/// The per-language slices are parallel to the eval sets passed alongside.
#[derive(Debug, Clone, Copy)]
pub struct AccuracyQuery<'query> {
    /// References per language pair
    pub refs: &'query [BTreeSet<String>],
    /// Close references per language pair
    pub close_refs: &'query [BTreeSet<String>],
    /// Include human translations as systems
    pub include_human: bool,
    /// Include outlier systems
    pub use_outliers: bool,
    /// Gold score label per language pair
    pub golds: &'query [String],
    /// Restrict to primary metric submissions
    pub primary_only: bool,
    /// Restrict to one domain
    pub domain: Option<&'query str>,
    /// Number of resampling runs for significance
    pub k: u32,
    /// Early-stopping parameters
    pub sig: PermutationSigParams,
    /// Significance threshold
    pub pval: f64,
}

/// Statistical engine and evaluation-set store that tasks run against.
///
/// `parallel_file` is passed through untouched; backends that split permutation
/// work across processes write their partial results there.
pub trait Backend {
    /// Loaded data for one test set and language pair.
    type EvalSet;
    /// Correlation inputs extracted from an eval set.
    type Correlations;

    /// Load the eval set for a test set and language pair.
    ///
    /// # Errors
    /// Returns an error if the data cannot be found or parsed
    fn load_eval_set(
        &self,
        test_set: &str,
        lang: &str,
        read_stored_metric_scores: bool,
    ) -> Result<Self::EvalSet>;

    /// Extract the scores to correlate from an eval set.
    ///
    /// # Errors
    /// Returns an error if the requested gold scores or references are unavailable
    fn correlations(
        &self,
        eval_set: &Self::EvalSet,
        query: &CorrelationQuery<'_>,
    ) -> Result<Self::Correlations>;

    /// Correlate every metric with the gold scores and cluster them by significance.
    ///
    /// # Errors
    /// Returns an error if the comparison cannot be computed
    fn compare_metrics(
        &self,
        correlations: &Self::Correlations,
        params: &ComparisonParams<'_>,
        parallel_file: Option<&Path>,
    ) -> Result<Comparison>;

    /// Rank metrics by pairwise system accuracy pooled over several language pairs.
    ///
    /// # Errors
    /// Returns an error if the comparison cannot be computed
    fn compare_metrics_with_global_accuracy(
        &self,
        eval_sets: &[&Self::EvalSet],
        query: &AccuracyQuery<'_>,
        parallel_file: Option<&Path>,
    ) -> Result<Comparison>;
}

/// Renders a comparison as text.
pub trait ComparisonPrinter {
    /// Write the comparison table for `corr_ranks` and its significance `matrix`.
    ///
    /// With `probs`, raw pairwise p-values are included.
    ///
    /// # Errors
    /// Returns an error if writing to `out` fails
    fn print(
        &self,
        corr_ranks: &CorrRanks,
        matrix: &Matrix,
        pval: f64,
        out: &mut dyn fmt::Write,
        probs: bool,
    ) -> fmt::Result;
}
