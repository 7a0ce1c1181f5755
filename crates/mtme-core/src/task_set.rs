//! Batches of tasks built from attribute combinations.

use core::ops::Add;
use core::slice;
use std::collections::HashMap;
use std::vec;

use itertools::Itertools as _;
use serde_json::Value;
use tracing::{info, trace};

use crate::attributes::Attribute;
use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::meta_info::MetaInfo;
use crate::set_results::TaskSetResults;
use crate::task::{Task, TaskBuilder};

/// Eval sets keyed by test set and language pair, shared by every task in a batch.
///
/// Populated before a batch runs and only read while tasks execute.
#[derive(Debug, Clone)]
pub struct EvalSetCache<E> {
    entries: HashMap<String, HashMap<String, E>>,
}

impl<E> Default for EvalSetCache<E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<E> EvalSetCache<E> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every eval set the given tasks reference.
    ///
    /// # Errors
    /// Returns an error if the backend fails to load an eval set
    pub fn for_tasks<'task, B>(
        backend: &B,
        tasks: impl IntoIterator<Item = &'task Task>,
    ) -> Result<Self>
    where
        B: Backend<EvalSet = E>,
    {
        let mut cache = Self::new();
        cache.populate(backend, tasks)?;
        Ok(cache)
    }

    /// Load the eval sets referenced by `tasks` that are not cached yet.
    ///
    /// Accuracy tasks contribute one entry per language pair. Returns the number
    /// of eval sets loaded.
    ///
    /// # Errors
    /// Returns an error if the backend fails to load an eval set
    pub fn populate<'task, B>(
        &mut self,
        backend: &B,
        tasks: impl IntoIterator<Item = &'task Task>,
    ) -> Result<usize>
    where
        B: Backend<EvalSet = E>,
    {
        let mut loaded = 0;
        for task in tasks {
            for lang in task.languages() {
                if self.contains(task.test_set(), lang) {
                    continue;
                }
                trace!("Loading eval set {}/{lang}", task.test_set());
                let eval_set = backend.load_eval_set(task.test_set(), lang, true)?;
                self.insert(task.test_set(), lang, eval_set);
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, test_set: &str, lang: &str, eval_set: E) {
        self.entries
            .entry(test_set.to_owned())
            .or_default()
            .insert(lang.to_owned(), eval_set);
    }

    /// Whether an entry is cached.
    pub fn contains(&self, test_set: &str, lang: &str) -> bool {
        self.get(test_set, lang).is_some()
    }

    /// Cached eval set.
    pub fn get(&self, test_set: &str, lang: &str) -> Option<&E> {
        self.entries.get(test_set)?.get(lang)
    }

    /// Cached eval set, or an error naming the missing entry.
    ///
    /// # Errors
    /// Returns an error if the entry is not cached
    pub fn require(&self, test_set: &str, lang: &str) -> Result<&E> {
        self.get(test_set, lang)
            .ok_or_else(|| Error::MissingEvalSet {
                test_set: test_set.to_owned(),
                lang: lang.to_owned(),
            })
    }

    /// Take over the entries of `other`; its entries win on conflicts.
    pub fn merge(&mut self, other: Self) {
        for (test_set, langs) in other.entries {
            self.entries.entry(test_set).or_default().extend(langs);
        }
    }

    /// Number of cached eval sets.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered collection of tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSet {
    tasks: Vec<Task>,
}

impl TaskSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// One task per element of the cartesian product of `combinations`, each also
    /// given the `fixed` attributes. Validated against the built-in registry.
    ///
    /// # Errors
    /// Returns a configuration error if any combination is not a valid task
    pub fn from_combinations(
        combinations: &[(Attribute, Vec<Value>)],
        fixed: &[(Attribute, Value)],
    ) -> Result<Self> {
        Self::from_combinations_in(MetaInfo::standard(), combinations, fixed)
    }

    /// Like [`TaskSet::from_combinations`], validated against `meta`.
    ///
    /// Empty `combinations` produce an empty set. The last attribute varies fastest.
    ///
    /// # Errors
    /// Returns a configuration error if any combination is not a valid task, or if
    /// an attribute is both fixed and combined
    pub fn from_combinations_in(
        meta: &MetaInfo,
        combinations: &[(Attribute, Vec<Value>)],
        fixed: &[(Attribute, Value)],
    ) -> Result<Self> {
        if let Some((attr, _)) = fixed
            .iter()
            .find(|(attr, _)| combinations.iter().any(|(combined, _)| combined == attr))
        {
            return Err(Error::InvalidConfig(format!(
                "attribute {attr} is both fixed and combined"
            )));
        }
        if combinations.is_empty() || combinations.iter().any(|(_, values)| values.is_empty()) {
            return Ok(Self::new());
        }

        let tasks = combinations
            .iter()
            .map(|(_, values)| values.iter())
            .multi_cartesian_product()
            .map(|picked| {
                let mut builder = TaskBuilder::default();
                for ((attr, _), value) in combinations.iter().zip(picked) {
                    builder = builder.set(*attr, value)?;
                }
                for (attr, value) in fixed {
                    builder = builder.set(*attr, value)?;
                }
                builder.build_in(meta)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { tasks })
    }

    /// Append a task.
    pub fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Tasks in order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Iterate over tasks in order.
    pub fn iter(&self) -> slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the set has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task, loading each referenced eval set once.
    ///
    /// # Errors
    /// Returns the first error raised while loading data or running a task
    pub fn run<B: Backend>(&self, backend: &B) -> Result<TaskSetResults> {
        let mut cache = EvalSetCache::new();
        self.run_with_cache(backend, &mut cache)
    }

    /// Run every task against a caller-owned cache, loading missing entries first.
    ///
    /// # Errors
    /// Returns the first error raised while loading data or running a task
    pub fn run_with_cache<B: Backend>(
        &self,
        backend: &B,
        cache: &mut EvalSetCache<B::EvalSet>,
    ) -> Result<TaskSetResults> {
        let loaded = cache.populate(backend, &self.tasks)?;
        info!(
            "Running {} tasks over {} eval sets ({loaded} newly loaded)",
            self.tasks.len(),
            cache.len()
        );

        let shared = &*cache;
        self.tasks
            .iter()
            .map(|task| task.run(backend, Some(shared), None))
            .collect()
    }
}

impl Add for TaskSet {
    type Output = Self;

    /// Concatenate; duplicate tasks are kept.
    fn add(mut self, other: Self) -> Self {
        self.tasks.extend(other.tasks);
        self
    }
}

impl Extend<Task> for TaskSet {
    fn extend<I: IntoIterator<Item = Task>>(&mut self, iter: I) {
        self.tasks.extend(iter);
    }
}

impl FromIterator<Task> for TaskSet {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        Self {
            tasks: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TaskSet {
    type Item = Task;
    type IntoIter = vec::IntoIter<Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_iter()
    }
}

impl<'set> IntoIterator for &'set TaskSet {
    type Item = &'set Task;
    type IntoIter = slice::Iter<'set, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_product_size_and_distinct_names() {
        let combinations = vec![
            (Attribute::Lang, vec![json!("en-de"), json!("zh-en"), json!("en-ru")]),
            (Attribute::Level, vec![json!("sys"), json!("seg")]),
            (Attribute::CorrFcn, vec![json!("pearson"), json!("kendall")]),
        ];
        let tasks =
            TaskSet::from_combinations(&combinations, &[(Attribute::K, json!(0))]).unwrap();

        assert_eq!(tasks.len(), 12);
        let names: HashSet<_> = tasks.iter().map(Task::name).collect();
        assert_eq!(names.len(), 12);
        assert!(tasks.iter().all(|task| task.k() == 0));
    }

    #[test]
    fn test_product_order_varies_last_attribute_fastest() {
        let combinations = vec![
            (Attribute::Lang, vec![json!("en-de"), json!("zh-en")]),
            (Attribute::Level, vec![json!("sys"), json!("seg")]),
        ];
        let tasks = TaskSet::from_combinations(&combinations, &[]).unwrap();
        let pairs: Vec<_> = tasks
            .iter()
            .map(|task| format!("{}/{}", task.lang(), task.level()))
            .collect();
        assert_eq!(pairs, vec!["en-de/sys", "en-de/seg", "zh-en/sys", "zh-en/seg"]);
    }

    #[test]
    fn test_empty_combinations_produce_no_tasks() {
        assert!(TaskSet::from_combinations(&[], &[]).unwrap().is_empty());
        let with_empty_list = vec![(Attribute::Lang, vec![])];
        assert!(
            TaskSet::from_combinations(&with_empty_list, &[])
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_invalid_combination_fails() {
        let combinations = vec![(Attribute::Lang, vec![json!("en-de"), json!("xx-yy")])];
        let error = TaskSet::from_combinations(&combinations, &[]).unwrap_err();
        assert!(matches!(error, Error::UnknownLanguage { .. }));
    }

    #[test]
    fn test_fixed_and_combined_conflict() {
        let combinations = vec![(Attribute::Lang, vec![json!("en-de")])];
        let error =
            TaskSet::from_combinations(&combinations, &[(Attribute::Lang, json!("zh-en"))])
                .unwrap_err();
        assert!(matches!(error, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_add_keeps_duplicates() {
        let combinations = vec![(Attribute::Lang, vec![json!("en-de"), json!("zh-en")])];
        let first = TaskSet::from_combinations(&combinations, &[]).unwrap();
        let second = TaskSet::from_combinations(&combinations, &[]).unwrap();

        let mut combined = first.clone() + second;
        assert_eq!(combined.len(), 4);
        assert_eq!(combined.tasks()[0], combined.tasks()[2]);

        combined.push(Task::builder().build().unwrap());
        assert_eq!(combined.len(), 5);
        assert_eq!(combined.iter().take(2).cloned().collect::<TaskSet>(), first);
    }
}
