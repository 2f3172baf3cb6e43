//! Thin CLI demonstration front-end (spec §1's "CLI front-end" Non-goal —
//! a collaborator, not a core subsystem). Mirrors the teacher's `clap`
//! derive layout in `main.rs`: one subcommand per externally visible
//! operation, delegating straight into the library.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ragctl", about = "Retrieval-augmented storage and chunking core", version)]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true, default_value = "./ragcore.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index one or more local files or glob patterns.
    Index {
        /// Root directory to resolve paths against.
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Glob patterns to match within `root`.
        patterns: Vec<String>,
    },

    /// Run a semantic search against the configured store.
    Search {
        /// Search query text.
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        k: Option<usize>,

        /// Restrict results to a source type (gist, github, file, text).
        #[arg(long)]
        source_type: Option<String>,

        /// Blend with lexical match ratio instead of plain re-ranking.
        #[arg(long)]
        hybrid: bool,
    },

    /// Print aggregate statistics for all indexed chunks.
    Stats,
}
