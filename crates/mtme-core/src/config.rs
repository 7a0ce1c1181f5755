//! Declarative task-set files.
//!
//! ```toml
//! [fixed]
//! test_set = "wmt23"
//! k = 0
//!
//! [combinations]
//! lang = ["en-de", "zh-en"]
//! level = ["sys", "seg"]
//! ```

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::attributes::Attribute;
use crate::error::Result;
use crate::meta_info::MetaInfo;
use crate::task_set::TaskSet;

/// Attribute values shared by every task plus the attribute lists to combine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSetConfig {
    /// Attribute name to the value every task gets
    #[serde(default)]
    pub fixed: IndexMap<String, Value>,
    /// Attribute name to the values to take the cartesian product over
    #[serde(default)]
    pub combinations: IndexMap<String, Vec<Value>>,
}

impl TaskSetConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    /// Returns an error if the document is not a valid task-set description
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading task set from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Expand into tasks validated against the built-in registry.
    ///
    /// # Errors
    /// Returns a configuration error for unknown attributes or invalid tasks
    pub fn to_task_set(&self) -> Result<TaskSet> {
        self.to_task_set_in(MetaInfo::standard())
    }

    /// Expand into tasks validated against `meta`.
    ///
    /// Combinations expand in file order, the last listed attribute varying
    /// fastest.
    ///
    /// # Errors
    /// Returns a configuration error for unknown attributes or invalid tasks
    pub fn to_task_set_in(&self, meta: &MetaInfo) -> Result<TaskSet> {
        let fixed = self
            .fixed
            .iter()
            .map(|(name, value)| Ok((name.parse::<Attribute>()?, value.clone())))
            .collect::<Result<Vec<_>>>()?;
        let combinations = self
            .combinations
            .iter()
            .map(|(name, values)| Ok((name.parse::<Attribute>()?, values.clone())))
            .collect::<Result<Vec<_>>>()?;

        TaskSet::from_combinations_in(meta, &combinations, &fixed)
    }
}
