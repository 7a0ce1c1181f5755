//! Outcome of running one task: correlations, cluster ranks and pairwise significance.

use core::fmt;
use core::result::Result as CoreResult;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};

use crate::backend::ComparisonPrinter;
use crate::error::{Error, Result};
use crate::report::TablePrinter;
use crate::task::Task;

/// Stored form of a float: `null` for NaN. Infinities have no JSON form.
fn stored_float<E: ser::Error>(value: f64) -> CoreResult<Option<f64>, E> {
    if value.is_infinite() {
        return Err(E::custom(format!("cannot store infinite value {value}")));
    }
    Ok((!value.is_nan()).then_some(value))
}

/// Correlation of a metric with the gold scores and its significance cluster rank.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "(Option<f64>, u32)")]
pub struct CorrRank {
    /// Correlation value
    pub corr: f64,
    /// Cluster rank, 1 for the best tier
    pub rank: u32,
}

impl CorrRank {
    /// Create a correlation/rank pair.
    pub const fn new(corr: f64, rank: u32) -> Self {
        Self { corr, rank }
    }
}

impl From<(Option<f64>, u32)> for CorrRank {
    fn from((corr, rank): (Option<f64>, u32)) -> Self {
        Self::new(corr.unwrap_or(f64::NAN), rank)
    }
}

impl Serialize for CorrRank {
    fn serialize<S: Serializer>(&self, serializer: S) -> CoreResult<S::Ok, S::Error> {
        (stored_float(self.corr)?, self.rank).serialize(serializer)
    }
}

/// Metrics with their correlations and ranks, in descending order of correlation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrRanks {
    entries: IndexMap<String, CorrRank>,
}

impl CorrRanks {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a metric, or replace its values in place if already present.
    pub fn insert(&mut self, metric: impl Into<String>, value: CorrRank) {
        self.entries.insert(metric.into(), value);
    }

    /// Values for a metric.
    pub fn get(&self, metric: &str) -> Option<&CorrRank> {
        self.entries.get(metric)
    }

    /// Position of a metric in descending-correlation order.
    pub fn position(&self, metric: &str) -> Option<usize> {
        self.entries.get_index_of(metric)
    }

    /// Metric name and values at a position.
    pub fn at(&self, index: usize) -> Option<(&str, &CorrRank)> {
        self.entries
            .get_index(index)
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Metric names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Metrics and values in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CorrRank)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of metrics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no metrics.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Equal when the same metrics appear in the same order with the same values.
impl PartialEq for CorrRanks {
    fn eq(&self, other: &Self) -> bool {
        self.entries.as_slice() == other.entries.as_slice()
    }
}

impl<S: Into<String>> FromIterator<(S, CorrRank)> for CorrRanks {
    fn from_iter<I: IntoIterator<Item = (S, CorrRank)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(metric, value)| (metric.into(), value))
                .collect(),
        }
    }
}

/// Square matrix of pairwise significance p-values, indexed by metric position.
///
/// Cell `(row, col)` holds the p-value for `corr(row) - corr(col)`.
#[derive(Debug, Clone, Default)]
pub struct Matrix {
    size: usize,
    values: Vec<f64>,
}

impl Matrix {
    /// Build from row-major values.
    ///
    /// # Errors
    /// Returns an error if `values` does not hold `size * size` cells
    pub fn new(size: usize, values: Vec<f64>) -> Result<Self> {
        if values.len() != size * size {
            return Err(Error::InvalidConfig(format!(
                "matrix of size {size} needs {} values, got {}",
                size * size,
                values.len()
            )));
        }
        Ok(Self { size, values })
    }

    /// Build from rows.
    ///
    /// # Errors
    /// Returns an error if the rows do not form a square matrix
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let size = rows.len();
        if let Some(row) = rows.iter().find(|row| row.len() != size) {
            return Err(Error::InvalidConfig(format!(
                "matrix with {size} rows has a row of length {}",
                row.len()
            )));
        }
        Ok(Self {
            size,
            values: rows.into_iter().flatten().collect(),
        })
    }

    /// Number of rows (and columns).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Cell value.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.size && col < self.size).then(|| self.values[row * self.size + col])
    }

    /// Rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.size.max(1))
    }
}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(left, right)| left == right || (left.is_nan() && right.is_nan()))
    }
}

impl Serialize for Matrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> CoreResult<S::Ok, S::Error> {
        let rows = self
            .rows()
            .map(|row| row.iter().map(|value| stored_float(*value)).collect())
            .collect::<CoreResult<Vec<Vec<Option<f64>>>, S::Error>>()?;
        rows.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Matrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> CoreResult<Self, D::Error> {
        let rows = Vec::<Vec<Option<f64>>>::deserialize(deserializer)?;
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|value| value.unwrap_or(f64::NAN))
                    .collect()
            })
            .collect();
        Self::from_rows(rows).map_err(de::Error::custom)
    }
}

/// Output of a metric comparison: ranked metrics and their significance matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comparison {
    /// Metrics in descending order of correlation
    pub corr_ranks: CorrRanks,
    /// Pairwise p-values in the same order
    pub matrix: Matrix,
}

/// Reference to a metric by name or by position in descending-correlation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricRef<'name> {
    /// Metric name
    Name(&'name str),
    /// Position in the results
    Index(usize),
}

impl<'name> From<&'name str> for MetricRef<'name> {
    fn from(name: &'name str) -> Self {
        Self::Name(name)
    }
}

impl<'name> From<&'name String> for MetricRef<'name> {
    fn from(name: &'name String) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for MetricRef<'_> {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Results from running a [`Task`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskResults {
    name: String,
    pval: f64,
    corr_ranks: CorrRanks,
    matrix: Matrix,
}

#[derive(Serialize)]
struct StoredRef<'res>(&'res str, f64, &'res CorrRanks, &'res Matrix);

#[derive(Deserialize)]
struct Stored(String, f64, CorrRanks, Matrix);

impl TaskResults {
    /// Wrap a comparison under a task name and significance threshold.
    ///
    /// # Errors
    /// Returns an error if the matrix size differs from the number of metrics
    pub fn new(name: impl Into<String>, pval: f64, comparison: Comparison) -> Result<Self> {
        let Comparison { corr_ranks, matrix } = comparison;
        if matrix.size() != corr_ranks.len() {
            return Err(Error::MatrixSizeMismatch {
                metrics: corr_ranks.len(),
                size: matrix.size(),
            });
        }
        Ok(Self {
            name: name.into(),
            pval,
            corr_ranks,
            matrix,
        })
    }

    /// Wrap a comparison produced by running `task`.
    ///
    /// # Errors
    /// Returns an error if the matrix size differs from the number of metrics
    pub fn from_task(task: &Task, comparison: Comparison) -> Result<Self> {
        Self::new(task.name(), task.pval(), comparison)
    }

    /// Canonical name of the task that produced these results.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Significance threshold.
    pub fn pval(&self) -> f64 {
        self.pval
    }

    /// Metrics with their correlations and ranks.
    pub fn corr_ranks(&self) -> &CorrRanks {
        &self.corr_ranks
    }

    /// Pairwise significance matrix.
    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// `attr=value` pairs recovered from the name.
    pub fn attr_vals(&self) -> impl Iterator<Item = (&str, &str)> {
        self.name
            .split_whitespace()
            .filter_map(|pair| pair.split_once('='))
    }

    /// Value of one attribute recovered from the name.
    ///
    /// # Errors
    /// Returns an error if the name does not carry the attribute
    pub fn attr_val(&self, attribute: &str) -> Result<&str> {
        self.attr_vals()
            .find(|(attr, _)| *attr == attribute)
            .map(|(_, value)| value)
            .ok_or_else(|| Error::MissingAttribute {
                attribute: attribute.to_owned(),
                name: self.name.clone(),
            })
    }

    /// Metrics in descending order of correlation.
    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.corr_ranks.names()
    }

    /// Number of metrics.
    pub fn len(&self) -> usize {
        self.corr_ranks.len()
    }

    /// Whether there are no metrics.
    pub fn is_empty(&self) -> bool {
        self.corr_ranks.is_empty()
    }

    fn index_of(&self, metric: MetricRef<'_>) -> Result<usize> {
        match metric {
            MetricRef::Name(name) => self
                .corr_ranks
                .position(name)
                .ok_or_else(|| Error::UnknownMetric(name.to_owned())),
            MetricRef::Index(index) if index < self.corr_ranks.len() => Ok(index),
            MetricRef::Index(index) => Err(Error::MetricIndexOutOfRange {
                index,
                len: self.corr_ranks.len(),
            }),
        }
    }

    fn entry<'name>(&self, metric: impl Into<MetricRef<'name>>) -> Result<&CorrRank> {
        let index = self.index_of(metric.into())?;
        self.corr_ranks
            .at(index)
            .map(|(_, value)| value)
            .ok_or(Error::MetricIndexOutOfRange {
                index,
                len: self.corr_ranks.len(),
            })
    }

    /// Correlation for a metric, by name or index.
    ///
    /// # Errors
    /// Returns an error if the metric is not present
    pub fn corr<'name>(&self, metric: impl Into<MetricRef<'name>>) -> Result<f64> {
        Ok(self.entry(metric)?.corr)
    }

    /// Cluster rank for a metric, by name or index.
    ///
    /// # Errors
    /// Returns an error if the metric is not present
    pub fn rank<'name>(&self, metric: impl Into<MetricRef<'name>>) -> Result<u32> {
        Ok(self.entry(metric)?.rank)
    }

    /// Whether `corr(m1) - corr(m2)` is significant. The difference is assumed to be >= 0.
    ///
    /// # Errors
    /// Returns an error if either metric is not present
    pub fn sig<'first, 'second>(
        &self,
        m1: impl Into<MetricRef<'first>>,
        m2: impl Into<MetricRef<'second>>,
    ) -> Result<bool> {
        let row = self.index_of(m1.into())?;
        let col = self.index_of(m2.into())?;
        let p_value = self
            .matrix
            .get(row, col)
            .ok_or(Error::MetricIndexOutOfRange {
                index: row.max(col),
                len: self.matrix.size(),
            })?;
        Ok(p_value < self.pval)
    }

    /// Render with a custom printer.
    ///
    /// # Errors
    /// Returns the printer's error
    pub fn render_with(
        &self,
        printer: &dyn ComparisonPrinter,
        probs: bool,
    ) -> CoreResult<String, fmt::Error> {
        let mut out = String::new();
        printer.print(&self.corr_ranks, &self.matrix, self.pval, &mut out, probs)?;
        Ok(out)
    }

    /// Comparison table, optionally with raw significance probabilities.
    ///
    /// # Errors
    /// Returns an error if the table cannot be formatted
    pub fn table(&self, probs: bool) -> CoreResult<String, fmt::Error> {
        self.render_with(&TablePrinter, probs)
    }

    /// Write as the JSON array `[name, pval, corr_ranks, matrix]`.
    ///
    /// NaN correlations and p-values are written as `null`.
    ///
    /// # Errors
    /// Returns an error if a value is infinite, or if writing fails
    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, &self.stored())?;
        Ok(())
    }

    /// Read results written by [`TaskResults::write`].
    ///
    /// `null` cells read back as NaN. Bare `NaN` or `Infinity` literals are not
    /// JSON, so documents containing them are rejected.
    ///
    /// # Errors
    /// Returns an error if the input is not a valid results document, or if its
    /// matrix size differs from its number of metrics
    pub fn read<R: Read>(reader: R) -> Result<Self> {
        let Stored(name, pval, corr_ranks, matrix) = serde_json::from_reader(reader)?;
        Self::new(name, pval, Comparison { corr_ranks, matrix })
    }

    /// Write to a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Read from a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        Self::read(BufReader::new(File::open(path)?))
    }

    fn stored(&self) -> StoredRef<'_> {
        StoredRef(&self.name, self.pval, &self.corr_ranks, &self.matrix)
    }
}

impl Serialize for TaskResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> CoreResult<S::Ok, S::Error> {
        self.stored().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TaskResults {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> CoreResult<Self, D::Error> {
        let Stored(name, pval, corr_ranks, matrix) = Stored::deserialize(deserializer)?;
        Self::new(name, pval, Comparison { corr_ranks, matrix }).map_err(de::Error::custom)
    }
}

impl fmt::Display for TaskResults {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        TablePrinter.print(&self.corr_ranks, &self.matrix, self.pval, formatter, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TaskResults {
        let corr_ranks = [
            ("COMET", CorrRank::new(0.92, 1)),
            ("BLEURT", CorrRank::new(0.90, 1)),
            ("BLEU", CorrRank::new(0.71, 2)),
        ]
        .into_iter()
        .collect();
        let matrix = Matrix::from_rows(vec![
            vec![0.0, 0.21, 0.001],
            vec![0.0, 0.0, 0.004],
            vec![0.0, 0.0, 0.0],
        ])
        .unwrap();
        TaskResults::new(
            "lang=en-de level=sys test_set=wmt22",
            0.05,
            Comparison { corr_ranks, matrix },
        )
        .unwrap()
    }

    #[test]
    fn test_accessors_by_name_and_index() {
        let results = sample();
        assert_eq!(
            results.metrics().collect::<Vec<_>>(),
            vec!["COMET", "BLEURT", "BLEU"]
        );
        assert!((results.corr("BLEURT").unwrap() - 0.90).abs() < f64::EPSILON);
        assert!((results.corr(2usize).unwrap() - 0.71).abs() < f64::EPSILON);
        assert_eq!(results.rank("BLEU").unwrap(), 2);
        assert_eq!(results.rank(0usize).unwrap(), 1);
    }

    #[test]
    fn test_unknown_metric() {
        let results = sample();
        assert!(matches!(
            results.corr("chrF"),
            Err(Error::UnknownMetric(name)) if name == "chrF"
        ));
        assert!(matches!(
            results.rank(3usize),
            Err(Error::MetricIndexOutOfRange { index: 3, len: 3 })
        ));
        assert!(matches!(
            results.sig("COMET", "chrF"),
            Err(Error::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_sig() {
        let results = sample();
        assert!(!results.sig("COMET", "BLEURT").unwrap());
        assert!(results.sig("COMET", "BLEU").unwrap());
        assert!(results.sig(1usize, "BLEU").unwrap());
    }

    #[test]
    fn test_attr_vals() {
        let results = sample();
        assert_eq!(results.attr_val("lang").unwrap(), "en-de");
        assert_eq!(results.attr_vals().count(), 3);
        assert!(matches!(
            results.attr_val("k"),
            Err(Error::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_write_read_round_trip() {
        let results = sample();
        let mut buffer = Vec::new();
        results.write(&mut buffer).unwrap();

        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with("[\"lang=en-de level=sys test_set=wmt22\",0.05,{\"COMET\":[0.92,1]"));

        let restored = TaskResults::read(buffer.as_slice()).unwrap();
        assert_eq!(restored, results);
        assert_eq!(
            restored.metrics().collect::<Vec<_>>(),
            vec!["COMET", "BLEURT", "BLEU"]
        );
    }

    #[test]
    fn test_nan_cells_survive_round_trip() {
        let comparison = Comparison {
            corr_ranks: [("A", CorrRank::new(f64::NAN, 1))].into_iter().collect(),
            matrix: Matrix::new(1, vec![f64::NAN]).unwrap(),
        };
        let results = TaskResults::new("lang=en-de", 0.05, comparison).unwrap();
        let json = serde_json::to_string(&results).unwrap();
        assert_eq!(json, "[\"lang=en-de\",0.05,{\"A\":[null,1]},[[null]]]");

        let restored: TaskResults = serde_json::from_str(&json).unwrap();
        assert!(restored.corr("A").unwrap().is_nan());
        assert_eq!(restored.matrix(), results.matrix());
    }

    #[test]
    fn test_read_rejects_non_square_matrix() {
        let json = r#"["x", 0.05, {"A": [0.5, 1], "B": [0.4, 2]}, [[0.0, 0.1], [0.0]]]"#;
        assert!(matches!(
            TaskResults::read(json.as_bytes()),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_infinite_values_are_not_written() {
        let comparison = Comparison {
            corr_ranks: [("A", CorrRank::new(0.5, 1))].into_iter().collect(),
            matrix: Matrix::new(1, vec![f64::INFINITY]).unwrap(),
        };
        let results = TaskResults::new("lang=en-de", 0.05, comparison).unwrap();
        let mut buffer = Vec::new();
        assert!(matches!(results.write(&mut buffer), Err(Error::Json(_))));

        let comparison = Comparison {
            corr_ranks: [("A", CorrRank::new(f64::NEG_INFINITY, 1))]
                .into_iter()
                .collect(),
            matrix: Matrix::new(1, vec![0.0]).unwrap(),
        };
        let results = TaskResults::new("lang=en-de", 0.05, comparison).unwrap();
        assert!(serde_json::to_string(&results).is_err_and(|err| err.is_data()));
    }

    #[test]
    fn test_read_rejects_nan_literals() {
        let json = r#"["x", 0.05, {"A": [0.5, 1]}, [[NaN]]]"#;
        assert!(matches!(
            TaskResults::read(json.as_bytes()),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_matrix_must_match_metric_count() {
        let json = r#"["x", 0.05, {"A": [0.5, 1], "B": [0.4, 2], "C": [0.3, 3]}, [[0.0]]]"#;
        assert!(matches!(
            TaskResults::read(json.as_bytes()),
            Err(Error::MatrixSizeMismatch {
                metrics: 3,
                size: 1
            })
        ));
        assert!(matches!(serde_json::from_str::<TaskResults>(json), Err(err) if err.is_data()));

        let comparison = Comparison {
            corr_ranks: [("A", CorrRank::new(0.5, 1))].into_iter().collect(),
            matrix: Matrix::new(2, vec![0.0; 4]).unwrap(),
        };
        assert!(matches!(
            TaskResults::new("x", 0.05, comparison),
            Err(Error::MatrixSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_metrics_collapse() {
        let json = r#"["x", 0.05, {"A": [0.5, 1], "A": [0.4, 2]}, [[0.0, 0.1], [0.0, 0.0]]]"#;
        assert!(matches!(
            TaskResults::read(json.as_bytes()),
            Err(Error::MatrixSizeMismatch {
                metrics: 1,
                size: 2
            })
        ));
    }

    #[test]
    fn test_sig_threshold_is_strict() {
        let comparison = Comparison {
            corr_ranks: [("A", CorrRank::new(0.9, 1)), ("B", CorrRank::new(0.8, 1))]
                .into_iter()
                .collect(),
            matrix: Matrix::from_rows(vec![vec![0.0, 0.05], vec![0.0, 0.0]]).unwrap(),
        };
        let results = TaskResults::new("x", 0.05, comparison).unwrap();
        assert!(!results.sig("A", "B").unwrap());
    }

    #[test]
    fn test_corr_ranks_order_matters() {
        let forward: CorrRanks = [("A", CorrRank::new(0.9, 1)), ("B", CorrRank::new(0.8, 1))]
            .into_iter()
            .collect();
        let backward: CorrRanks = [("B", CorrRank::new(0.8, 1)), ("A", CorrRank::new(0.9, 1))]
            .into_iter()
            .collect();
        assert_ne!(forward, backward);
        assert_eq!(backward.position("A"), Some(1));
    }

    struct FailingPrinter;

    impl ComparisonPrinter for FailingPrinter {
        fn print(
            &self,
            _corr_ranks: &CorrRanks,
            _matrix: &Matrix,
            _pval: f64,
            out: &mut dyn fmt::Write,
            _probs: bool,
        ) -> fmt::Result {
            out.write_str("partial")?;
            Err(fmt::Error)
        }
    }

    #[test]
    fn test_render_with_reports_printer_errors() {
        let results = sample();
        assert!(matches!(
            results.render_with(&FailingPrinter, false),
            Err(fmt::Error)
        ));
        assert!(results.table(true).is_ok_and(|table| table.contains("COMET")));
    }

    #[test]
    fn test_default_is_empty() {
        let results = TaskResults::default();
        assert!(results.is_empty());
        assert_eq!(results.name(), "");
        assert_eq!(results.matrix().size(), 0);
    }
}
