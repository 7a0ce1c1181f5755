use core::result::Result as CoreResult;
use std::io::Error as IoError;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur while configuring, running or aggregating tasks.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// The test set is not present in the registry.
    #[error("Unknown test set: {0}")]
    UnknownTestSet(String),

    /// The language pair is not available for the test set.
    #[error("Unknown language pair {lang} for test set {test_set}")]
    UnknownLanguage {
        /// Test set that was searched
        test_set: String,
        /// Language pair that was not found
        lang: String,
    },

    /// The granularity level has no standard gold scores for the language pair.
    #[error("Level {level} is not available for {test_set}/{lang}")]
    UnknownLevel {
        /// Test set that was searched
        test_set: String,
        /// Language pair that was searched
        lang: String,
        /// Level that was not found
        level: String,
    },

    /// The correlation function identifier is not recognized.
    #[error("Unknown correlation function: {0}")]
    UnknownCorrelationFunction(String),

    /// The attribute name is not one of the task attributes.
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// An attribute was given a value of the wrong type or an unrecognized identifier.
    #[error("Invalid value for {attribute}: {message}")]
    InvalidValue {
        /// Attribute being assigned
        attribute: String,
        /// What was wrong with the value
        message: String,
    },

    /// The combination of attributes is inconsistent.
    #[error("Invalid task configuration: {0}")]
    InvalidConfig(String),

    /// The metric name is not present in the results.
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// The metric index is past the end of the results.
    #[error("Metric index {index} out of range for {len} metrics")]
    MetricIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of metrics available
        len: usize,
    },

    /// The significance matrix does not have one row per metric.
    #[error("Significance matrix of size {size} does not match {metrics} metrics")]
    MatrixSizeMismatch {
        /// Number of metrics
        metrics: usize,
        /// Number of matrix rows
        size: usize,
    },

    /// A result name does not carry the requested attribute.
    #[error("Attribute {attribute} missing from result name: {name}")]
    MissingAttribute {
        /// Attribute that was requested
        attribute: String,
        /// Result name that was searched
        name: String,
    },

    /// The number of weights does not match the number of results.
    #[error("Expected {expected} weights, got {actual}")]
    WeightCountMismatch {
        /// Number of results
        expected: usize,
        /// Number of weights supplied
        actual: usize,
    },

    /// A task needed an eval set that the shared cache does not hold.
    #[error("No eval set loaded for {test_set}/{lang}")]
    MissingEvalSet {
        /// Test set of the missing entry
        test_set: String,
        /// Language pair of the missing entry
        lang: String,
    },

    /// The evaluation backend failed.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Determines whether this error describes an invalid task configuration.
    ///
    /// Configuration errors are raised while building tasks, before anything runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownTestSet(_)
                | Self::UnknownLanguage { .. }
                | Self::UnknownLevel { .. }
                | Self::UnknownCorrelationFunction(_)
                | Self::UnknownAttribute(_)
                | Self::InvalidValue { .. }
                | Self::InvalidConfig(_)
        )
    }

    pub(crate) fn invalid_value(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            attribute: attribute.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value as JsonValue, from_str};
    use std::io;

    #[test]
    fn test_error_display() {
        let error1 = Error::UnknownTestSet("wmt99".to_owned());
        assert_eq!(error1.to_string(), "Unknown test set: wmt99");

        let error2 = Error::UnknownLanguage {
            test_set: "wmt22".to_owned(),
            lang: "xx-yy".to_owned(),
        };
        assert_eq!(
            error2.to_string(),
            "Unknown language pair xx-yy for test set wmt22"
        );

        let error3 = Error::MetricIndexOutOfRange { index: 4, len: 2 };
        assert_eq!(error3.to_string(), "Metric index 4 out of range for 2 metrics");

        let error4 = Error::MatrixSizeMismatch { metrics: 3, size: 1 };
        assert_eq!(
            error4.to_string(),
            "Significance matrix of size 1 does not match 3 metrics"
        );
    }

    #[test]
    fn test_error_is_configuration() {
        assert!(Error::UnknownCorrelationFunction("foo".to_owned()).is_configuration());
        assert!(Error::InvalidConfig("bad".to_owned()).is_configuration());
        assert!(Error::invalid_value("k", "not a number").is_configuration());

        assert!(!Error::UnknownMetric("BLEU".to_owned()).is_configuration());
        assert!(!Error::Backend("disk".to_owned()).is_configuration());
    }

    #[test]
    fn test_error_from_io() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_error = from_str::<JsonValue>("invalid json").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Json(_)));
    }
}
