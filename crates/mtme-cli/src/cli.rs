use clap::{Parser, Subcommand};
use mtme_core::Attribute;
use std::path::PathBuf;

/// Command-line arguments for `mtme`.
#[derive(Parser)]
#[command(name = "mtme")]
#[command(about = "Machine translation metric evaluation tasks", long_about = None)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "TOML file with extra test sets layered over the built-in registry"
    )]
    pub meta_info: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Show debug logs")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Expand a task-set file and print each task name")]
    Tasks {
        #[arg(help = "Task-set TOML file")]
        config: PathBuf,
    },

    #[command(about = "Print the comparison table of a stored result")]
    Show {
        #[arg(help = "Results JSON file")]
        results: PathBuf,

        #[arg(long, help = "Show pairwise p-values instead of significance marks")]
        probs: bool,
    },

    #[command(about = "Average metric ranks over stored results")]
    Summarize {
        #[arg(required = true, help = "Results JSON files")]
        results: Vec<PathBuf>,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Attributes to split weight over, outermost first"
        )]
        weight_by: Vec<Attribute>,

        #[arg(long, help = "Print one summary per value of this attribute")]
        split_by: Option<Attribute>,
    },
}
