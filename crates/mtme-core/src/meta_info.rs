//! Known test sets and the standard gold labels and references for each language pair.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::task::Level;

/// Standard settings for one language pair of a test set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    /// Reference used when a task does not name its own
    pub std_ref: String,
    /// Gold score label per granularity level
    pub std_gold: BTreeMap<Level, String>,
}

impl LanguageInfo {
    /// Create settings with one gold label shared by the given levels.
    pub fn new(std_ref: impl Into<String>, gold: &str, levels: &[Level]) -> Self {
        Self {
            std_ref: std_ref.into(),
            std_gold: levels
                .iter()
                .map(|level| (*level, gold.to_owned()))
                .collect(),
        }
    }
}

/// Registry mapping test set → language pair → [`LanguageInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaInfo {
    test_sets: BTreeMap<String, BTreeMap<String, LanguageInfo>>,
}

static STANDARD: LazyLock<MetaInfo> = LazyLock::new(MetaInfo::builtin);

impl MetaInfo {
    /// The built-in registry.
    pub fn standard() -> &'static Self {
        &STANDARD
    }

    fn builtin() -> Self {
        use Level::{Domain, Seg, Sys};

        let mut info = Self::default();
        let mqm_levels = [Sys, Seg];
        let mqm_domain_levels = [Sys, Domain, Seg];

        for (lang, reference) in [("en-de", "refC"), ("en-ru", "refA"), ("zh-en", "refB")] {
            info.insert("wmt21.news", lang, LanguageInfo::new(reference, "mqm", &mqm_levels));
        }
        for lang in ["en-de", "en-ru", "zh-en"] {
            info.insert("wmt22", lang, LanguageInfo::new("refA", "mqm", &mqm_domain_levels));
        }
        for lang in ["cs-en", "de-en", "en-ja"] {
            info.insert("wmt22", lang, LanguageInfo::new("refA", "wmt-appraise", &mqm_levels));
        }
        for (lang, reference) in [("en-de", "refA"), ("he-en", "refB"), ("zh-en", "refA")] {
            info.insert("wmt23", lang, LanguageInfo::new(reference, "mqm", &mqm_domain_levels));
        }
        for (lang, reference) in [("en-de", "refB"), ("en-es", "refA"), ("ja-zh", "refA")] {
            info.insert("wmt24", lang, LanguageInfo::new(reference, "mqm", &mqm_domain_levels));
        }
        info
    }

    /// Parse a registry from TOML, one `[test_set.lang]` table per language pair.
    ///
    /// # Errors
    /// Returns an error if the TOML is malformed
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a registry from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let info = Self::from_toml_str(&content)?;
        debug!(
            "Loaded {} test sets from {}",
            info.test_sets.len(),
            path.display()
        );
        Ok(info)
    }

    /// Register or replace the settings for one language pair.
    pub fn insert(&mut self, test_set: &str, lang: &str, info: LanguageInfo) {
        self.test_sets
            .entry(test_set.to_owned())
            .or_default()
            .insert(lang.to_owned(), info);
    }

    /// Layer `other` over this registry; its language pairs replace existing ones.
    pub fn merge(&mut self, other: Self) {
        for (test_set, langs) in other.test_sets {
            self.test_sets.entry(test_set).or_default().extend(langs);
        }
    }

    /// Whether the test set is known.
    pub fn contains_test_set(&self, test_set: &str) -> bool {
        self.test_sets.contains_key(test_set)
    }

    /// Language pairs available for a test set, in sorted order.
    pub fn languages(&self, test_set: &str) -> impl Iterator<Item = &str> {
        self.test_sets
            .get(test_set)
            .into_iter()
            .flat_map(|langs| langs.keys().map(String::as_str))
    }

    /// Settings for a language pair.
    ///
    /// # Errors
    /// Returns an error if the test set or language pair is unknown
    pub fn lookup(&self, test_set: &str, lang: &str) -> Result<&LanguageInfo> {
        self.test_sets
            .get(test_set)
            .ok_or_else(|| Error::UnknownTestSet(test_set.to_owned()))?
            .get(lang)
            .ok_or_else(|| Error::UnknownLanguage {
                test_set: test_set.to_owned(),
                lang: lang.to_owned(),
            })
    }

    /// Standard gold label for a language pair at a level.
    ///
    /// # Errors
    /// Returns an error if the test set, language pair or level is unknown
    pub fn std_gold(&self, test_set: &str, lang: &str, level: Level) -> Result<&str> {
        self.lookup(test_set, lang)?
            .std_gold
            .get(&level)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownLevel {
                test_set: test_set.to_owned(),
                lang: lang.to_owned(),
                level: level.as_str().to_owned(),
            })
    }

    /// Standard reference set for a language pair.
    ///
    /// # Errors
    /// Returns an error if the test set or language pair is unknown
    pub fn std_refs(&self, test_set: &str, lang: &str) -> Result<BTreeSet<String>> {
        let info = self.lookup(test_set, lang)?;
        Ok(BTreeSet::from([info.std_ref.clone()]))
    }
}
