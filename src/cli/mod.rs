//! CLI interface for rulebook.
//!
//! Provides command-line argument parsing using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line interface for rulebook.
#[derive(Parser)]
#[command(name = "rulebook")]
#[command(author, version, about = "Ask questions about the NFL rules", long_about = None)]
pub struct Cli {
    /// Directory holding the persisted index (overrides config).
    #[arg(long, global = true)]
    pub storage: Option<PathBuf>,

    /// Directory holding the rules documents (overrides config).
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Build the index from the documents, or load it if already persisted.
    Index,

    /// Ask a single question.
    Ask {
        /// The question to answer.
        question: String,

        /// Also print the passages the answer was based on.
        #[arg(short, long)]
        sources: bool,
    },

    /// Start an interactive question-and-answer session.
    Chat {
        /// Print answers at once instead of typing them out.
        #[arg(long)]
        no_typing: bool,
    },
}
