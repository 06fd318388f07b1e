use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "slipguard")]
#[command(about = "Find and fix zip-slip path traversal in Java sources")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a source tree and report zip-slip findings
    Scan {
        /// Path to scan (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Show only findings the fixer would rewrite
        #[arg(long)]
        fixable_only: bool,
    },

    /// Rewrite vulnerable files with a containment guard
    Fix {
        /// Path to fix (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Analyze and report, but do not write any file
        #[arg(long)]
        dry_run: bool,

        /// Override the fixed-point cycle budget
        #[arg(long)]
        max_cycles: Option<usize>,
    },
}
