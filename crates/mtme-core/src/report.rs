use core::fmt::{self, Write as _};

use crate::backend::ComparisonPrinter;
use crate::results::{CorrRanks, Matrix};

/// Default printer producing a markdown table.
///
/// Each metric gets one row with its rank and correlation, followed by one
/// column per lower-ranked metric. A column shows `>` where the row metric is
/// significantly better and `.` where it is not; with `probs` it shows the
/// p-value instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct TablePrinter;

impl ComparisonPrinter for TablePrinter {
    fn print(
        &self,
        corr_ranks: &CorrRanks,
        matrix: &Matrix,
        pval: f64,
        out: &mut dyn fmt::Write,
        probs: bool,
    ) -> fmt::Result {
        let count = corr_ranks.len();

        let mut header = String::from("| # | Metric | Rank | Corr |");
        let mut rule = String::from("|---|--------|------|------|");
        for index in 1..=count {
            write!(header, " {index} |")?;
            rule.push_str("---|");
        }
        writeln!(out, "{header}")?;
        writeln!(out, "{rule}")?;

        for (row, (name, value)) in corr_ranks.iter().enumerate() {
            let mut line = format!(
                "| {} | {name} | {} | {:.3} |",
                row + 1,
                value.rank,
                value.corr
            );
            for col in 0..count {
                let cell = match matrix.get(row, col) {
                    Some(p_value) if col > row && probs => format!("{p_value:.3}"),
                    Some(p_value) if col > row && p_value < pval => ">".to_owned(),
                    Some(_) if col > row => ".".to_owned(),
                    _ => String::new(),
                };
                write!(line, " {cell} |")?;
            }
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}
