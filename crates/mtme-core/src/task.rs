//! Task definition, validation and execution.
//!
//! A [`Task`] is built through [`TaskBuilder`], which checks the configuration
//! against a [`MetaInfo`] registry and fills in standard gold labels and
//! references exactly once. After that a task never changes; its canonical
//! [`name`](Task::name) identifies the configuration.

use core::fmt;
use core::slice;
use core::str::FromStr;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::attributes::Attribute;
use crate::backend::{
    AccuracyQuery, Backend, ComparisonParams, CorrelationQuery, PermutationSigParams,
};
use crate::error::{Error, Result};
use crate::meta_info::MetaInfo;
use crate::results::TaskResults;
use crate::task_set::EvalSetCache;

/// Scoring granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Level {
    /// System level
    Sys,
    /// Domain level
    Domain,
    /// Document level
    Doc,
    /// Segment level
    Seg,
}

impl Level {
    /// Identifier used in names and configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sys => "sys",
            Self::Domain => "domain",
            Self::Doc => "doc",
            Self::Seg => "seg",
        }
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "sys" => Ok(Self::Sys),
            "domain" => Ok(Self::Domain),
            "doc" => Ok(Self::Doc),
            "seg" => Ok(Self::Seg),
            other => Err(Error::invalid_value(
                Attribute::Level.as_str(),
                format!("unknown level {other}"),
            )),
        }
    }
}

impl TryFrom<String> for Level {
    type Error = Error;

    fn try_from(name: String) -> Result<Self> {
        name.parse()
    }
}

impl From<Level> for String {
    fn from(level: Level) -> Self {
        level.as_str().to_owned()
    }
}

/// How item-grouped correlations are averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AverageBy {
    /// Correlate all scores at once
    None,
    /// Average per-system correlations
    Sys,
    /// Average per-item correlations
    Item,
}

impl AverageBy {
    /// Identifier used in names and configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sys => "sys",
            Self::Item => "item",
        }
    }
}

impl FromStr for AverageBy {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "none" => Ok(Self::None),
            "sys" => Ok(Self::Sys),
            "item" => Ok(Self::Item),
            other => Err(Error::invalid_value(
                Attribute::AvgBy.as_str(),
                format!("unknown averaging mode {other}"),
            )),
        }
    }
}

/// Correlation statistic used to compare metric scores with gold scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrelationFunction {
    /// Pearson correlation
    Pearson,
    /// Kendall tau
    Kendall,
    /// Spearman rank correlation
    Spearman,
    /// Pairwise system accuracy pooled over language pairs
    Accuracy,
    /// Kendall-like tau over pairwise preferences
    KendallLike,
    /// Kendall tau variants with configurable tie handling
    KendallVariants,
    /// Kendall tau with optimized tie threshold
    KendallWithTiesOpt,
}

impl CorrelationFunction {
    /// Every recognized correlation function.
    pub const ALL: [Self; 7] = [
        Self::Pearson,
        Self::Kendall,
        Self::Spearman,
        Self::Accuracy,
        Self::KendallLike,
        Self::KendallVariants,
        Self::KendallWithTiesOpt,
    ];

    /// Identifier used in names and configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pearson => "pearson",
            Self::Kendall => "kendall",
            Self::Spearman => "spearman",
            Self::Accuracy => "accuracy",
            Self::KendallLike => "KendallLike",
            Self::KendallVariants => "KendallVariants",
            Self::KendallWithTiesOpt => "KendallWithTiesOpt",
        }
    }
}

impl FromStr for CorrelationFunction {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|fcn| fcn.as_str() == name)
            .ok_or_else(|| Error::UnknownCorrelationFunction(name.to_owned()))
    }
}

/// Permutation strategy for significance tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermutationTest {
    /// Permute metric scores
    Scores,
    /// Permute item pairs
    Pairs,
}

impl PermutationTest {
    /// Identifier used in names and configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scores => "scores",
            Self::Pairs => "pairs",
        }
    }
}

impl FromStr for PermutationTest {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "scores" => Ok(Self::Scores),
            "pairs" => Ok(Self::Pairs),
            other => Err(Error::invalid_value(
                Attribute::PermTest.as_str(),
                format!("unknown permutation test {other}"),
            )),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl fmt::Display for AverageBy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl fmt::Display for CorrelationFunction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl fmt::Display for PermutationTest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Gold labels and references, shaped by the comparison mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceSettings {
    /// Correlation over a single language pair.
    Standard {
        /// Gold score label
        gold: String,
        /// References
        refs: BTreeSet<String>,
        /// References excluded from the systems being scored
        close_refs: BTreeSet<String>,
    },
    /// System-level global accuracy over several language pairs; one entry per pair.
    Accuracy {
        /// Gold score label per language pair
        golds: Vec<String>,
        /// References per language pair
        refs: Vec<BTreeSet<String>>,
        /// Close references per language pair
        close_refs: Vec<BTreeSet<String>>,
    },
}

/// One fully specified metric evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    test_set: String,
    lang: String,
    domain: Option<String>,
    level: Level,
    human: bool,
    avg_by: AverageBy,
    corr_fcn: CorrelationFunction,
    k: u32,
    references: ReferenceSettings,
    use_outliers: bool,
    primary: bool,
    pval: f64,
    block_size: u32,
    early_min: f64,
    early_max: f64,
    replace_nans_with_zeros: bool,
    perm_test: PermutationTest,
    corr_fcn_args: BTreeMap<String, Value>,
}

fn render_set(values: &BTreeSet<String>) -> String {
    let joined: Vec<&str> = values.iter().map(String::as_str).collect();
    format!("{{{}}}", joined.join(","))
}

fn render_list(values: impl Iterator<Item = String>) -> String {
    format!("[{}]", values.collect::<Vec<_>>().join(","))
}

impl Task {
    /// Start building a task from the default configuration.
    pub fn builder() -> TaskBuilder {
        TaskBuilder::default()
    }

    /// Test set identifier.
    pub fn test_set(&self) -> &str {
        &self.test_set
    }

    /// Language field as given: one pair, or comma-joined pairs in accuracy mode.
    pub fn lang(&self) -> &str {
        &self.lang
    }

    /// Individual language pairs.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.lang.split(',')
    }

    /// Domain filter.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Scoring granularity.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Whether human outputs are compared as systems.
    pub fn human(&self) -> bool {
        self.human
    }

    /// Averaging mode.
    pub fn avg_by(&self) -> AverageBy {
        self.avg_by
    }

    /// Correlation function.
    pub fn corr_fcn(&self) -> CorrelationFunction {
        self.corr_fcn
    }

    /// Whether this is a multi-language global accuracy task.
    pub fn is_accuracy(&self) -> bool {
        matches!(self.references, ReferenceSettings::Accuracy { .. })
    }

    /// Resampling count.
    pub fn k(&self) -> u32 {
        self.k
    }

    /// Gold labels and references.
    pub fn references(&self) -> &ReferenceSettings {
        &self.references
    }

    /// Whether outlier systems are included.
    pub fn use_outliers(&self) -> bool {
        self.use_outliers
    }

    /// Whether only primary submissions are compared.
    pub fn primary(&self) -> bool {
        self.primary
    }

    /// Significance threshold.
    pub fn pval(&self) -> f64 {
        self.pval
    }

    /// Early-stopping parameters for permutation tests.
    pub fn sig_params(&self) -> PermutationSigParams {
        PermutationSigParams {
            block_size: self.block_size,
            early_min: self.early_min,
            early_max: self.early_max,
        }
    }

    /// Whether NaN scores are replaced by zeros.
    pub fn replace_nans_with_zeros(&self) -> bool {
        self.replace_nans_with_zeros
    }

    /// Permutation strategy.
    pub fn perm_test(&self) -> PermutationTest {
        self.perm_test
    }

    /// Extra correlation function arguments, sorted by key.
    pub fn corr_fcn_args(&self) -> &BTreeMap<String, Value> {
        &self.corr_fcn_args
    }

    /// Textual value of one attribute, with all whitespace removed.
    pub fn value(&self, attribute: Attribute) -> String {
        let text = match attribute {
            Attribute::AvgBy => self.avg_by.to_string(),
            Attribute::BlockSize => self.block_size.to_string(),
            Attribute::CloseRefs => match &self.references {
                ReferenceSettings::Standard { close_refs, .. } => render_set(close_refs),
                ReferenceSettings::Accuracy { close_refs, .. } => {
                    render_list(close_refs.iter().map(render_set))
                }
            },
            Attribute::CorrFcn => self.corr_fcn.to_string(),
            Attribute::CorrFcnArgs => Value::Object(
                self.corr_fcn_args
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            )
            .to_string(),
            Attribute::Domain => self.domain.as_deref().unwrap_or("none").to_owned(),
            Attribute::EarlyMax => self.early_max.to_string(),
            Attribute::EarlyMin => self.early_min.to_string(),
            Attribute::Gold => match &self.references {
                ReferenceSettings::Standard { gold, .. } => gold.clone(),
                ReferenceSettings::Accuracy { golds, .. } => render_list(golds.iter().cloned()),
            },
            Attribute::Human => self.human.to_string(),
            Attribute::K => self.k.to_string(),
            Attribute::Lang => self.lang.clone(),
            Attribute::Level => self.level.to_string(),
            Attribute::PermTest => self.perm_test.to_string(),
            Attribute::Primary => self.primary.to_string(),
            Attribute::Pval => self.pval.to_string(),
            Attribute::Refs => match &self.references {
                ReferenceSettings::Standard { refs, .. } => render_set(refs),
                ReferenceSettings::Accuracy { refs, .. } => {
                    render_list(refs.iter().map(render_set))
                }
            },
            Attribute::ReplaceNansWithZeros => self.replace_nans_with_zeros.to_string(),
            Attribute::TestSet => self.test_set.clone(),
            Attribute::UseOutliers => self.use_outliers.to_string(),
        };
        text.split_whitespace().collect()
    }

    /// Canonical `attr=value` identity, attributes in [`Attribute::ALL`] order.
    pub fn name(&self) -> String {
        Attribute::ALL
            .iter()
            .map(|attr| format!("{attr}={}", self.value(*attr)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Compute metric correlations and pairwise significance.
    ///
    /// Eval sets come from `eval_sets` when given; otherwise they are loaded
    /// through the backend for this run only. `parallel_file` is handed to the
    /// backend for distributing permutation work.
    ///
    /// # Errors
    /// Returns an error if an eval set is missing from `eval_sets` or the backend fails
    pub fn run<B: Backend>(
        &self,
        backend: &B,
        eval_sets: Option<&EvalSetCache<B::EvalSet>>,
        parallel_file: Option<&Path>,
    ) -> Result<TaskResults> {
        debug!("Running task: {}", self.name());

        let local;
        let cache = if let Some(shared) = eval_sets {
            shared
        } else {
            local = EvalSetCache::for_tasks(backend, slice::from_ref(self))?;
            &local
        };

        let sig = self.sig_params();
        let comparison = match &self.references {
            ReferenceSettings::Accuracy {
                golds,
                refs,
                close_refs,
            } => {
                let handles = self
                    .languages()
                    .map(|lang| cache.require(&self.test_set, lang))
                    .collect::<Result<Vec<_>>>()?;
                let query = AccuracyQuery {
                    refs,
                    close_refs,
                    include_human: self.human,
                    use_outliers: self.use_outliers,
                    golds,
                    primary_only: self.primary,
                    domain: self.domain(),
                    k: self.k,
                    sig,
                    pval: self.pval,
                };
                backend.compare_metrics_with_global_accuracy(&handles, &query, parallel_file)?
            }
            ReferenceSettings::Standard {
                gold,
                refs,
                close_refs,
            } => {
                let eval_set = cache.require(&self.test_set, &self.lang)?;
                let query = CorrelationQuery {
                    level: self.level,
                    refs,
                    close_refs,
                    include_human: self.human,
                    use_outliers: self.use_outliers,
                    gold,
                    primary_only: self.primary,
                    domain: self.domain(),
                    spreadsheet_metric_names: true,
                };
                let correlations = backend.correlations(eval_set, &query)?;
                let params = ComparisonParams {
                    corr_fcn: self.corr_fcn,
                    avg_by: self.avg_by,
                    k: self.k,
                    sig,
                    pval: self.pval,
                    replace_nans_with_zeros: self.replace_nans_with_zeros,
                    perm_test: self.perm_test,
                    corr_fcn_args: &self.corr_fcn_args,
                };
                backend.compare_metrics(&correlations, &params, parallel_file)?
            }
        };

        TaskResults::from_task(self, comparison)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.name())
    }
}

/// A value that is either shared or given per language pair.
#[derive(Debug, Clone, PartialEq)]
enum Shape<T> {
    Single(T),
    PerLanguage(Vec<T>),
}

/// Builder for [`Task`]. Unset gold labels and references take standard values.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskBuilder {
    test_set: String,
    lang: String,
    domain: Option<String>,
    level: Level,
    human: bool,
    avg_by: AverageBy,
    corr_fcn: CorrelationFunction,
    k: u32,
    gold: Option<Shape<String>>,
    refs: Option<Shape<BTreeSet<String>>>,
    close_refs: Option<Shape<BTreeSet<String>>>,
    use_outliers: bool,
    primary: bool,
    pval: f64,
    block_size: u32,
    early_min: f64,
    early_max: f64,
    replace_nans_with_zeros: bool,
    perm_test: PermutationTest,
    corr_fcn_args: BTreeMap<String, Value>,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self {
            test_set: "wmt22".to_owned(),
            lang: "en-de".to_owned(),
            domain: None,
            level: Level::Sys,
            human: true,
            avg_by: AverageBy::None,
            corr_fcn: CorrelationFunction::Pearson,
            k: 1000,
            gold: None,
            refs: None,
            close_refs: None,
            use_outliers: false,
            primary: true,
            pval: 0.05,
            block_size: 100,
            early_min: 0.02,
            early_max: 0.50,
            replace_nans_with_zeros: false,
            perm_test: PermutationTest::Scores,
            corr_fcn_args: BTreeMap::new(),
        }
    }
}

fn expect_str(attribute: Attribute, value: &Value) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| Error::invalid_value(attribute.as_str(), format!("expected a string, got {value}")))
}

fn expect_bool(attribute: Attribute, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::invalid_value(attribute.as_str(), format!("expected a boolean, got {value}")))
}

fn expect_u32(attribute: Attribute, value: &Value) -> Result<u32> {
    value
        .as_u64()
        .and_then(|number| u32::try_from(number).ok())
        .ok_or_else(|| {
            Error::invalid_value(
                attribute.as_str(),
                format!("expected a non-negative integer, got {value}"),
            )
        })
}

fn expect_f64(attribute: Attribute, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| Error::invalid_value(attribute.as_str(), format!("expected a number, got {value}")))
}

fn expect_set(attribute: Attribute, value: &Value) -> Result<BTreeSet<String>> {
    let items = value.as_array().ok_or_else(|| {
        Error::invalid_value(attribute.as_str(), format!("expected a list of labels, got {value}"))
    })?;
    items
        .iter()
        .map(|item| expect_str(attribute, item).map(str::to_owned))
        .collect()
}

fn expect_ref_shape(attribute: Attribute, value: &Value) -> Result<Shape<BTreeSet<String>>> {
    match value.as_array() {
        Some(items) if !items.is_empty() && items.iter().all(Value::is_array) => items
            .iter()
            .map(|item| expect_set(attribute, item))
            .collect::<Result<_>>()
            .map(Shape::PerLanguage),
        _ => expect_set(attribute, value).map(Shape::Single),
    }
}

fn single<T>(
    attribute: Attribute,
    value: Option<Shape<T>>,
    default: impl FnOnce() -> Result<T>,
) -> Result<T> {
    match value {
        None => default(),
        Some(Shape::Single(value)) => Ok(value),
        Some(Shape::PerLanguage(_)) => Err(Error::InvalidConfig(format!(
            "{attribute} must be a single value outside accuracy mode"
        ))),
    }
}

fn per_language<T>(
    attribute: Attribute,
    value: Option<Shape<T>>,
    count: usize,
    default: impl FnOnce() -> Result<Vec<T>>,
) -> Result<Vec<T>> {
    let values = match value {
        None => default()?,
        Some(Shape::PerLanguage(values)) => values,
        Some(Shape::Single(_)) => {
            return Err(Error::InvalidConfig(format!(
                "{attribute} must list one value per language pair in accuracy mode"
            )));
        }
    };
    if values.len() != count {
        return Err(Error::InvalidConfig(format!(
            "{attribute} has {} entries for {count} language pairs",
            values.len()
        )));
    }
    Ok(values)
}

impl TaskBuilder {
    /// Set the test set.
    #[must_use]
    pub fn test_set(mut self, test_set: impl Into<String>) -> Self {
        self.test_set = test_set.into();
        self
    }

    /// Set the language pair, or comma-joined pairs for accuracy mode.
    #[must_use]
    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Restrict to a domain.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the granularity.
    #[must_use]
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Compare human outputs as systems.
    #[must_use]
    pub fn human(mut self, human: bool) -> Self {
        self.human = human;
        self
    }

    /// Set the averaging mode.
    #[must_use]
    pub fn avg_by(mut self, avg_by: AverageBy) -> Self {
        self.avg_by = avg_by;
        self
    }

    /// Set the correlation function.
    #[must_use]
    pub fn corr_fcn(mut self, corr_fcn: CorrelationFunction) -> Self {
        self.corr_fcn = corr_fcn;
        self
    }

    /// Set the resampling count.
    #[must_use]
    pub fn k(mut self, k: u32) -> Self {
        self.k = k;
        self
    }

    /// Set the gold label for a single language pair.
    #[must_use]
    pub fn gold(mut self, gold: impl Into<String>) -> Self {
        self.gold = Some(Shape::Single(gold.into()));
        self
    }

    /// Set one gold label per language pair (accuracy mode).
    #[must_use]
    pub fn golds<I, S>(mut self, golds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gold = Some(Shape::PerLanguage(golds.into_iter().map(Into::into).collect()));
        self
    }

    /// Set the references for a single language pair.
    #[must_use]
    pub fn refs<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.refs = Some(Shape::Single(refs.into_iter().map(Into::into).collect()));
        self
    }

    /// Set one reference set per language pair (accuracy mode).
    #[must_use]
    pub fn refs_per_lang(mut self, refs: Vec<BTreeSet<String>>) -> Self {
        self.refs = Some(Shape::PerLanguage(refs));
        self
    }

    /// Set the close references for a single language pair.
    #[must_use]
    pub fn close_refs<I, S>(mut self, close_refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.close_refs = Some(Shape::Single(close_refs.into_iter().map(Into::into).collect()));
        self
    }

    /// Set one close-reference set per language pair (accuracy mode).
    #[must_use]
    pub fn close_refs_per_lang(mut self, close_refs: Vec<BTreeSet<String>>) -> Self {
        self.close_refs = Some(Shape::PerLanguage(close_refs));
        self
    }

    /// Include outlier systems.
    #[must_use]
    pub fn use_outliers(mut self, use_outliers: bool) -> Self {
        self.use_outliers = use_outliers;
        self
    }

    /// Restrict to primary submissions.
    #[must_use]
    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    /// Set the significance threshold.
    #[must_use]
    pub fn pval(mut self, pval: f64) -> Self {
        self.pval = pval;
        self
    }

    /// Set the permutation block size.
    #[must_use]
    pub fn block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the lower early-stop bound.
    #[must_use]
    pub fn early_min(mut self, early_min: f64) -> Self {
        self.early_min = early_min;
        self
    }

    /// Set the upper early-stop bound.
    #[must_use]
    pub fn early_max(mut self, early_max: f64) -> Self {
        self.early_max = early_max;
        self
    }

    /// Replace NaN scores with zeros.
    #[must_use]
    pub fn replace_nans_with_zeros(mut self, replace: bool) -> Self {
        self.replace_nans_with_zeros = replace;
        self
    }

    /// Set the permutation strategy.
    #[must_use]
    pub fn perm_test(mut self, perm_test: PermutationTest) -> Self {
        self.perm_test = perm_test;
        self
    }

    /// Add one extra correlation function argument.
    #[must_use]
    pub fn corr_fcn_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.corr_fcn_args.insert(key.into(), value);
        self
    }

    /// Assign an attribute from a dynamic value, as found in task-set combinations.
    ///
    /// Gold labels take a string, or a list of strings for accuracy mode.
    /// References take a list of labels, or a list of such lists for accuracy mode.
    ///
    /// # Errors
    /// Returns an error if the value has the wrong type or names an unknown identifier
    pub fn set(mut self, attribute: Attribute, value: &Value) -> Result<Self> {
        match attribute {
            Attribute::AvgBy => self.avg_by = expect_str(attribute, value)?.parse()?,
            Attribute::BlockSize => self.block_size = expect_u32(attribute, value)?,
            Attribute::CloseRefs => self.close_refs = Some(expect_ref_shape(attribute, value)?),
            Attribute::CorrFcn => self.corr_fcn = expect_str(attribute, value)?.parse()?,
            Attribute::CorrFcnArgs => {
                self.corr_fcn_args = match value {
                    Value::Null => BTreeMap::new(),
                    Value::Object(args) => args
                        .iter()
                        .map(|(key, arg)| (key.clone(), arg.clone()))
                        .collect(),
                    other => {
                        return Err(Error::invalid_value(
                            attribute.as_str(),
                            format!("expected a table of arguments, got {other}"),
                        ));
                    }
                };
            }
            Attribute::Domain => {
                self.domain = match value {
                    Value::Null => None,
                    other => Some(expect_str(attribute, other)?.to_owned()),
                };
            }
            Attribute::EarlyMax => self.early_max = expect_f64(attribute, value)?,
            Attribute::EarlyMin => self.early_min = expect_f64(attribute, value)?,
            Attribute::Gold => {
                self.gold = Some(match value {
                    Value::Array(items) => Shape::PerLanguage(
                        items
                            .iter()
                            .map(|item| expect_str(attribute, item).map(str::to_owned))
                            .collect::<Result<_>>()?,
                    ),
                    other => Shape::Single(expect_str(attribute, other)?.to_owned()),
                });
            }
            Attribute::Human => self.human = expect_bool(attribute, value)?,
            Attribute::K => self.k = expect_u32(attribute, value)?,
            Attribute::Lang => self.lang = expect_str(attribute, value)?.to_owned(),
            Attribute::Level => self.level = expect_str(attribute, value)?.parse()?,
            Attribute::PermTest => self.perm_test = expect_str(attribute, value)?.parse()?,
            Attribute::Primary => self.primary = expect_bool(attribute, value)?,
            Attribute::Pval => self.pval = expect_f64(attribute, value)?,
            Attribute::Refs => self.refs = Some(expect_ref_shape(attribute, value)?),
            Attribute::ReplaceNansWithZeros => {
                self.replace_nans_with_zeros = expect_bool(attribute, value)?;
            }
            Attribute::TestSet => self.test_set = expect_str(attribute, value)?.to_owned(),
            Attribute::UseOutliers => self.use_outliers = expect_bool(attribute, value)?,
        }
        Ok(self)
    }

    /// Validate against the built-in registry and build the task.
    ///
    /// # Errors
    /// Returns a configuration error if the task is inconsistent
    pub fn build(self) -> Result<Task> {
        self.build_in(MetaInfo::standard())
    }

    /// Validate against `meta` and build the task.
    ///
    /// # Errors
    /// Returns a configuration error if the test set, language pairs or level are
    /// unknown, or if gold labels and references do not match the mode
    pub fn build_in(self, meta: &MetaInfo) -> Result<Task> {
        if !meta.contains_test_set(&self.test_set) {
            return Err(Error::UnknownTestSet(self.test_set));
        }

        let test_set = self.test_set.as_str();
        let level = self.level;
        let sub_langs: Vec<&str> = self.lang.split(',').collect();

        let references = if self.corr_fcn == CorrelationFunction::Accuracy {
            if level != Level::Sys {
                return Err(Error::InvalidConfig(format!(
                    "accuracy requires level sys, got {level}"
                )));
            }
            if sub_langs.len() < 2 {
                return Err(Error::InvalidConfig(format!(
                    "accuracy compares several language pairs, got {}",
                    self.lang
                )));
            }
            for sub_lang in &sub_langs {
                meta.lookup(test_set, sub_lang)?;
            }
            let count = sub_langs.len();
            ReferenceSettings::Accuracy {
                golds: per_language(Attribute::Gold, self.gold, count, || {
                    sub_langs
                        .iter()
                        .map(|sub_lang| meta.std_gold(test_set, sub_lang, level).map(str::to_owned))
                        .collect()
                })?,
                refs: per_language(Attribute::Refs, self.refs, count, || {
                    sub_langs
                        .iter()
                        .map(|sub_lang| meta.std_refs(test_set, sub_lang))
                        .collect()
                })?,
                close_refs: per_language(Attribute::CloseRefs, self.close_refs, count, || {
                    Ok(vec![BTreeSet::new(); count])
                })?,
            }
        } else {
            if sub_langs.len() != 1 {
                return Err(Error::InvalidConfig(format!(
                    "{} takes a single language pair, got {}",
                    self.corr_fcn, self.lang
                )));
            }
            let std_gold = meta.std_gold(test_set, &self.lang, level)?;
            ReferenceSettings::Standard {
                gold: single(Attribute::Gold, self.gold, || Ok(std_gold.to_owned()))?,
                refs: single(Attribute::Refs, self.refs, || meta.std_refs(test_set, &self.lang))?,
                close_refs: single(Attribute::CloseRefs, self.close_refs, || Ok(BTreeSet::new()))?,
            }
        };

        Ok(Task {
            test_set: self.test_set,
            lang: self.lang,
            domain: self.domain,
            level,
            human: self.human,
            avg_by: self.avg_by,
            corr_fcn: self.corr_fcn,
            k: self.k,
            references,
            use_outliers: self.use_outliers,
            primary: self.primary,
            pval: self.pval,
            block_size: self.block_size,
            early_min: self.early_min,
            early_max: self.early_max,
            replace_nans_with_zeros: self.replace_nans_with_zeros,
            perm_test: self.perm_test,
            corr_fcn_args: self.corr_fcn_args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta_info::LanguageInfo;
    use serde_json::json;

    const DEFAULT_NAME: &str = "avg_by=none block_size=100 close_refs={} corr_fcn=pearson \
        corr_fcn_args={} domain=none early_max=0.5 early_min=0.02 gold=mqm human=true k=1000 \
        lang=en-de level=sys perm_test=scores primary=true pval=0.05 refs={refA} \
        replace_nans_with_zeros=false test_set=wmt22 use_outliers=false";

    #[test]
    fn test_default_task_fills_standard_values() {
        let task = Task::builder()
            .test_set("wmt22")
            .lang("en-de")
            .level(Level::Sys)
            .corr_fcn(CorrelationFunction::Pearson)
            .build()
            .unwrap();

        assert_eq!(
            task.references(),
            &ReferenceSettings::Standard {
                gold: "mqm".to_owned(),
                refs: BTreeSet::from(["refA".to_owned()]),
                close_refs: BTreeSet::new(),
            }
        );
        assert_eq!(task.name(), DEFAULT_NAME);
        assert_eq!(task.to_string(), DEFAULT_NAME);
        assert!(!task.is_accuracy());
    }

    #[test]
    fn test_name_is_reproducible() {
        let first = Task::builder().build().unwrap();
        let second = Task::builder().build().unwrap();
        assert_eq!(first.name(), second.name());
        assert_eq!(first, second);
    }

    #[test]
    fn test_name_ignores_argument_insertion_order() {
        let forward = Task::builder()
            .corr_fcn(CorrelationFunction::KendallVariants)
            .corr_fcn_arg("variant", json!("acc23"))
            .corr_fcn_arg("epsilon", json!(0.0))
            .build()
            .unwrap();
        let backward = Task::builder()
            .corr_fcn(CorrelationFunction::KendallVariants)
            .corr_fcn_arg("epsilon", json!(0.0))
            .corr_fcn_arg("variant", json!("acc23"))
            .build()
            .unwrap();

        assert_eq!(forward.name(), backward.name());
        assert_eq!(
            forward.value(Attribute::CorrFcnArgs),
            r#"{"epsilon":0.0,"variant":"acc23"}"#
        );
    }

    #[test]
    fn test_nested_arguments_render_as_compact_json() {
        let task = Task::builder()
            .corr_fcn_arg("weights", json!({"b": [1, 2], "a": null}))
            .corr_fcn_arg("flag", json!(true))
            .build()
            .unwrap();
        assert_eq!(
            task.value(Attribute::CorrFcnArgs),
            r#"{"flag":true,"weights":{"a":null,"b":[1,2]}}"#
        );
    }

    #[test]
    fn test_values_strip_whitespace() {
        let task = Task::builder()
            .domain("social media")
            .corr_fcn_arg("note", json!("a b"))
            .build()
            .unwrap();
        assert_eq!(task.value(Attribute::Domain), "socialmedia");
        assert_eq!(task.value(Attribute::CorrFcnArgs), r#"{"note":"ab"}"#);
        assert_eq!(task.name().split_whitespace().count(), Attribute::ALL.len());
    }

    #[test]
    fn test_explicit_standard_references() {
        let task = Task::builder()
            .level(Level::Seg)
            .gold("mqm")
            .refs(["refB", "refA"])
            .close_refs(["refC"])
            .build()
            .unwrap();
        assert_eq!(task.value(Attribute::Refs), "{refA,refB}");
        assert_eq!(task.value(Attribute::CloseRefs), "{refC}");
        assert_eq!(task.value(Attribute::Level), "seg");
    }

    #[test]
    fn test_accuracy_task_defaults_per_language() {
        let task = Task::builder()
            .lang("en-de,zh-en")
            .corr_fcn(CorrelationFunction::Accuracy)
            .build()
            .unwrap();

        assert!(task.is_accuracy());
        assert_eq!(task.languages().collect::<Vec<_>>(), vec!["en-de", "zh-en"]);
        assert_eq!(task.value(Attribute::Gold), "[mqm,mqm]");
        assert_eq!(task.value(Attribute::Refs), "[{refA},{refA}]");
        assert_eq!(task.value(Attribute::CloseRefs), "[{},{}]");
    }

    #[test]
    fn test_accuracy_rejects_single_language() {
        let error = Task::builder()
            .lang("en-de")
            .corr_fcn(CorrelationFunction::Accuracy)
            .build()
            .unwrap_err();
        assert!(matches!(error, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_accuracy_rejects_non_system_level() {
        let error = Task::builder()
            .lang("en-de,zh-en")
            .level(Level::Seg)
            .corr_fcn(CorrelationFunction::Accuracy)
            .build()
            .unwrap_err();
        assert!(error.is_configuration());
    }

    #[test]
    fn test_accuracy_rejects_wrong_shapes_and_lengths() {
        let scalar_gold = Task::builder()
            .lang("en-de,zh-en")
            .corr_fcn(CorrelationFunction::Accuracy)
            .gold("mqm")
            .build();
        assert!(matches!(scalar_gold, Err(Error::InvalidConfig(_))));

        let short_golds = Task::builder()
            .lang("en-de,zh-en")
            .corr_fcn(CorrelationFunction::Accuracy)
            .golds(["mqm"])
            .build();
        assert!(matches!(short_golds, Err(Error::InvalidConfig(_))));

        let long_refs = Task::builder()
            .lang("en-de,zh-en")
            .corr_fcn(CorrelationFunction::Accuracy)
            .refs_per_lang(vec![BTreeSet::new(), BTreeSet::new(), BTreeSet::new()])
            .build();
        assert!(matches!(long_refs, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_accuracy_rejects_unknown_sub_language() {
        let error = Task::builder()
            .lang("en-de,xx-yy")
            .corr_fcn(CorrelationFunction::Accuracy)
            .build()
            .unwrap_err();
        assert!(matches!(error, Error::UnknownLanguage { .. }));
    }

    #[test]
    fn test_standard_rejects_multiple_languages() {
        let error = Task::builder().lang("en-de,zh-en").build().unwrap_err();
        assert!(matches!(error, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_standard_rejects_per_language_shapes() {
        let golds = Task::builder().golds(["mqm"]).build();
        assert!(matches!(golds, Err(Error::InvalidConfig(_))));

        let refs = Task::builder()
            .refs_per_lang(vec![BTreeSet::from(["refA".to_owned()])])
            .build();
        assert!(matches!(refs, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_test_set_language_and_level() {
        assert!(matches!(
            Task::builder().test_set("wmt99").build(),
            Err(Error::UnknownTestSet(_))
        ));
        assert!(matches!(
            Task::builder().lang("xx-yy").build(),
            Err(Error::UnknownLanguage { .. })
        ));
        assert!(matches!(
            Task::builder().level(Level::Doc).build(),
            Err(Error::UnknownLevel { .. })
        ));
    }

    #[test]
    fn test_set_from_dynamic_values() {
        let task = Task::builder()
            .set(Attribute::K, &json!(0))
            .unwrap()
            .set(Attribute::Refs, &json!(["refA", "refB"]))
            .unwrap()
            .set(Attribute::Domain, &json!("news"))
            .unwrap()
            .set(Attribute::Level, &json!("seg"))
            .unwrap()
            .set(Attribute::Human, &json!(false))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(task.k(), 0);
        assert_eq!(task.domain(), Some("news"));
        assert_eq!(task.level(), Level::Seg);
        assert!(!task.human());
        assert_eq!(task.value(Attribute::Refs), "{refA,refB}");
    }

    #[test]
    fn test_set_per_language_values() {
        let task = Task::builder()
            .set(Attribute::Lang, &json!("en-de,zh-en"))
            .unwrap()
            .set(Attribute::CorrFcn, &json!("accuracy"))
            .unwrap()
            .set(Attribute::Gold, &json!(["mqm", "wmt-appraise"]))
            .unwrap()
            .set(Attribute::CloseRefs, &json!([["refB"], []]))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(task.value(Attribute::Gold), "[mqm,wmt-appraise]");
        assert_eq!(task.value(Attribute::CloseRefs), "[{refB},{}]");
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let unknown_fcn = Task::builder().set(Attribute::CorrFcn, &json!("cosine"));
        assert!(matches!(
            unknown_fcn,
            Err(Error::UnknownCorrelationFunction(name)) if name == "cosine"
        ));

        let negative_k = Task::builder().set(Attribute::K, &json!(-1));
        assert!(matches!(negative_k, Err(Error::InvalidValue { .. })));

        let bad_level = Task::builder().set(Attribute::Level, &json!("paragraph"));
        assert!(matches!(bad_level, Err(Error::InvalidValue { .. })));
    }

    #[test]
    fn test_custom_registry() {
        let mut meta = MetaInfo::default();
        meta.insert(
            "mytest",
            "en-fr",
            LanguageInfo::new("refX", "esa", &[Level::Sys]),
        );

        let task = Task::builder()
            .test_set("mytest")
            .lang("en-fr")
            .build_in(&meta)
            .unwrap();
        assert_eq!(task.value(Attribute::Gold), "esa");
        assert!(matches!(
            Task::builder().build_in(&meta),
            Err(Error::UnknownTestSet(_))
        ));
    }
}
