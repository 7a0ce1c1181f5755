//! Task configuration and result aggregation for machine translation metric evaluation.
//!
//! A [`Task`] fully describes one comparison of automatic metrics against human
//! judgments. Running it through a [`Backend`] yields [`TaskResults`]: per-metric
//! correlations, significance cluster ranks and a pairwise p-value matrix.
//! [`TaskSet`] expands attribute combinations into many tasks and runs them with a
//! shared [`EvalSetCache`], and [`TaskSetResults`] merges the outcomes into a single
//! weighted average-rank summary.

/// Canonical attribute descriptors.
pub mod attributes;
/// Traits and request records for the evaluation backend.
pub mod backend;
/// Declarative task-set configuration files.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Registry of test sets, language pairs and their standard labels.
pub mod meta_info;
/// Textual comparison tables.
pub mod report;
/// Results of running a single task.
pub mod results;
/// Aggregation over the results of many tasks.
pub mod set_results;
/// Task definition, validation and execution.
pub mod task;
/// Batches of tasks and the shared eval-set cache.
pub mod task_set;

pub use attributes::Attribute;
pub use backend::{
    AccuracyQuery, Backend, ComparisonParams, ComparisonPrinter, CorrelationQuery,
    PermutationSigParams,
};
pub use config::TaskSetConfig;
pub use error::{Error, Result};
pub use meta_info::{LanguageInfo, MetaInfo};
pub use report::TablePrinter;
pub use results::{Comparison, CorrRank, CorrRanks, Matrix, MetricRef, TaskResults};
pub use set_results::TaskSetResults;
pub use task::{
    AverageBy, CorrelationFunction, Level, PermutationTest, ReferenceSettings, Task, TaskBuilder,
};
pub use task_set::{EvalSetCache, TaskSet};
