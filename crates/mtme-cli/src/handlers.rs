//! Command handlers for CLI operations

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use mtme_core::{Attribute, MetaInfo, TaskResults, TaskSetConfig, TaskSetResults};
use tracing::{debug, info};

/// Built-in registry, extended from `path` when given.
///
/// # Errors
/// Returns an error if the extra registry cannot be read
pub fn registry(path: Option<&Path>) -> Result<MetaInfo> {
    let mut meta = MetaInfo::standard().clone();
    if let Some(path) = path {
        let extra = MetaInfo::from_file(path)
            .with_context(|| format!("Failed to load registry from {}", path.display()))?;
        meta.merge(extra);
    }
    Ok(meta)
}

/// Print the canonical name of every task described by a task-set file.
///
/// # Errors
/// Returns an error if the file is unreadable or describes an invalid task
pub fn handle_tasks(out: &mut impl Write, meta: &MetaInfo, config: &Path) -> Result<()> {
    let tasks = TaskSetConfig::from_file(config)
        .and_then(|parsed| parsed.to_task_set_in(meta))
        .with_context(|| format!("Invalid task set {}", config.display()))?;
    info!("Expanded {} tasks from {}", tasks.len(), config.display());

    for task in &tasks {
        writeln!(out, "{task}")?;
    }
    Ok(())
}

/// Print a stored result as a table.
///
/// # Errors
/// Returns an error if the result cannot be loaded
pub fn handle_show(out: &mut impl Write, results: &Path, probs: bool) -> Result<()> {
    let result = TaskResults::load(results)
        .with_context(|| format!("Failed to load results from {}", results.display()))?;
    writeln!(out, "{}", result.name())?;
    write!(out, "{}", result.table(probs)?)?;
    Ok(())
}

/// Print weighted average ranks over stored results.
///
/// # Errors
/// Returns an error if a result cannot be loaded or lacks a weighting attribute
pub fn handle_summarize(
    out: &mut impl Write,
    paths: &[PathBuf],
    weight_by: &[Attribute],
    split_by: Option<Attribute>,
) -> Result<()> {
    let results = paths
        .iter()
        .map(|path| {
            debug!("Loading {}", path.display());
            TaskResults::load(path)
                .with_context(|| format!("Failed to load results from {}", path.display()))
        })
        .collect::<Result<TaskSetResults>>()?;

    if let Some(attribute) = split_by {
        for (value, subset) in results.split_by_attr(attribute)? {
            writeln!(out, "## {attribute}={value}")?;
            write_summary(out, &subset, weight_by)?;
            writeln!(out)?;
        }
        Ok(())
    } else {
        write_summary(out, &results, weight_by)
    }
}

fn write_summary(
    out: &mut impl Write,
    results: &TaskSetResults,
    weight_by: &[Attribute],
) -> Result<()> {
    let weights = results.assign_weights(weight_by, 1.0)?;
    let ranks = results.average_ranks(Some(&weights))?;
    info!(
        "Averaged {} metrics over {} results",
        ranks.len(),
        results.len()
    );

    writeln!(out, "| # | Metric | Avg rank |")?;
    writeln!(out, "|---|--------|----------|")?;
    for (index, (metric, rank)) in ranks.iter().enumerate() {
        writeln!(out, "| {} | {metric} | {rank:.3} |", index + 1)?;
    }
    Ok(())
}
