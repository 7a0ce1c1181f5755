//! Operations on results from running a task set.
//!
//! Results are partitioned by the attribute values recorded in their names.
//! Partitioning compares rendered value strings for the one attribute named,
//! so equal strings under different attributes never interact.

use core::ops::Add;
use core::slice;
use std::collections::{BTreeSet, HashMap};
use std::vec;

use indexmap::IndexMap;
use tracing::warn;

use crate::attributes::Attribute;
use crate::error::{Error, Result};
use crate::results::TaskResults;

/// Ordered collection of [`TaskResults`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSetResults {
    results: Vec<TaskResults>,
}

impl TaskSetResults {
    /// Wrap a list of results.
    pub fn new(results: Vec<TaskResults>) -> Self {
        Self { results }
    }

    /// Append a result.
    pub fn push(&mut self, result: TaskResults) {
        self.results.push(result);
    }

    /// Results in order.
    pub fn results(&self) -> &[TaskResults] {
        &self.results
    }

    /// Iterate over results in order.
    pub fn iter(&self) -> slice::Iter<'_, TaskResults> {
        self.results.iter()
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether there are no results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Partition by the value of an attribute, keeping order within each part.
    ///
    /// Parts are keyed by value in order of first appearance.
    ///
    /// # Errors
    /// Returns an error if a result name does not carry the attribute
    pub fn split_by_attr(&self, attribute: Attribute) -> Result<IndexMap<String, Self>> {
        let mut subsets: IndexMap<String, Self> = IndexMap::new();
        for result in &self.results {
            let value = result.attr_val(attribute.as_str())?;
            subsets
                .entry(value.to_owned())
                .or_default()
                .push(result.clone());
        }
        Ok(subsets)
    }

    /// Group result positions by attribute value, in order of first appearance.
    fn group_indices(&self, indices: &[usize], attribute: Attribute) -> Result<Vec<Vec<usize>>> {
        let mut groups: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for &index in indices {
            let value = self.results[index].attr_val(attribute.as_str())?;
            groups.entry(value).or_default().push(index);
        }
        Ok(groups.into_values().collect())
    }

    fn assign_to(
        &self,
        indices: &[usize],
        attrs: &[Attribute],
        total_wt: f64,
        weights: &mut [f64],
    ) -> Result<()> {
        let Some((first, rest)) = attrs.split_first() else {
            let share = total_wt / indices.len() as f64;
            for &index in indices {
                weights[index] = share;
            }
            return Ok(());
        };

        let groups = self.group_indices(indices, *first)?;
        let share = total_wt / groups.len() as f64;
        for group in &groups {
            self.assign_to(group, rest, share, weights)?;
        }
        Ok(())
    }

    /// Assign task weights hierarchically.
    ///
    /// `total_wt` is split evenly across the values of the first attribute, each
    /// share is split across the values of the next attribute within that part,
    /// and so on. Once the attributes run out, the remaining results of a part
    /// share its weight equally. Weights are returned in result order and sum to
    /// `total_wt`.
    ///
    /// # Errors
    /// Returns an error if a result name does not carry one of the attributes
    pub fn assign_weights(&self, attrs: &[Attribute], total_wt: f64) -> Result<Vec<f64>> {
        let mut weights = vec![0.0; self.results.len()];
        let indices: Vec<usize> = (0..self.results.len()).collect();
        self.assign_to(&indices, attrs, total_wt, &mut weights)?;
        Ok(weights)
    }

    /// Same weights as [`TaskSetResults::assign_weights`], computed per result as
    /// `total_wt` times `1 / part_count` at every level of its attribute path.
    ///
    /// # Errors
    /// Returns an error if a result name does not carry one of the attributes
    pub fn assign_weights_by_path(&self, attrs: &[Attribute], total_wt: f64) -> Result<Vec<f64>> {
        let paths = self
            .results
            .iter()
            .map(|result| {
                attrs
                    .iter()
                    .map(|attr| result.attr_val(attr.as_str()))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let weights = paths
            .iter()
            .map(|path| {
                let mut weight = total_wt;
                for depth in 0..path.len() {
                    let prefix = &path[..depth];
                    let parts: BTreeSet<&str> = paths
                        .iter()
                        .filter(|other| other[..depth] == *prefix)
                        .map(|other| other[depth])
                        .collect();
                    weight /= parts.len() as f64;
                }
                let leaf_size = paths.iter().filter(|other| *other == path).count();
                weight / leaf_size as f64
            })
            .collect();
        Ok(weights)
    }

    /// Weighted average rank of each metric present in every result, best first.
    ///
    /// Without `weights` every result counts `1 / len`. Metrics missing from any
    /// result are left out.
    ///
    /// # Errors
    /// Returns an error if the number of weights differs from the number of results
    pub fn average_ranks(&self, weights: Option<&[f64]>) -> Result<Vec<(String, f64)>> {
        let count = self.results.len();
        let uniform;
        let weights = match weights {
            Some(given) if given.len() != count => {
                return Err(Error::WeightCountMismatch {
                    expected: count,
                    actual: given.len(),
                });
            }
            Some(given) => given,
            None => {
                uniform = vec![1.0 / count as f64; count];
                uniform.as_slice()
            }
        };

        let mut order: Vec<&str> = Vec::new();
        let mut totals: HashMap<&str, (f64, usize)> = HashMap::new();
        for (result, weight) in self.results.iter().zip(weights) {
            for (metric, value) in result.corr_ranks().iter() {
                let entry = totals.entry(metric).or_insert_with(|| {
                    order.push(metric);
                    (0.0, 0)
                });
                entry.0 = f64::from(value.rank).mul_add(*weight, entry.0);
                entry.1 += 1;
            }
        }

        let mut ranks: Vec<(String, f64)> = order
            .iter()
            .filter_map(|metric| {
                let (sum, seen) = totals[metric];
                (seen == count).then(|| ((*metric).to_owned(), sum))
            })
            .collect();
        let dropped = order.len() - ranks.len();
        if dropped > 0 {
            warn!("Dropped {dropped} metrics missing from some of {count} results");
        }

        ranks.sort_by(|left, right| left.1.total_cmp(&right.1));
        Ok(ranks)
    }
}

impl Add for TaskSetResults {
    type Output = Self;

    /// Concatenate; duplicate results are kept.
    fn add(mut self, other: Self) -> Self {
        self.results.extend(other.results);
        self
    }
}

impl Extend<TaskResults> for TaskSetResults {
    fn extend<I: IntoIterator<Item = TaskResults>>(&mut self, iter: I) {
        self.results.extend(iter);
    }
}

impl FromIterator<TaskResults> for TaskSetResults {
    fn from_iter<I: IntoIterator<Item = TaskResults>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for TaskSetResults {
    type Item = TaskResults;
    type IntoIter = vec::IntoIter<TaskResults>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'set> IntoIterator for &'set TaskSetResults {
    type Item = &'set TaskResults;
    type IntoIter = slice::Iter<'set, TaskResults>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
