use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Redact regions and cover handwritten signatures in PDF documents.
#[derive(Debug, Parser)]
#[command(name = "pdf-redactor", about, version)]
pub struct Cli {
    /// Configuration file (defaults to ./redactor.json when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Remove content under the given rectangles and paint them white
    Redact {
        /// PDF to redact
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// JSON array of rectangles
        #[arg(value_name = "REDACTIONS")]
        redactions: PathBuf,

        /// Output path (default: <input>_redacted.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Find handwritten signatures and print their rectangles as JSON
    Detect {
        /// PDF to scan
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// JSON array of already known signatures to skip
        #[arg(long, value_name = "FILE")]
        existing: Option<PathBuf>,

        /// Minimum detection score, exclusive (default from config)
        #[arg(long)]
        confidence: Option<f64>,
    },

    /// Detect signatures and cover them, plus any given ones, with white boxes
    CoverSignatures {
        /// PDF to process
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// JSON array of additional signatures to cover
        #[arg(long, value_name = "FILE")]
        existing: Option<PathBuf>,

        /// Minimum detection score, exclusive (default from config)
        #[arg(long)]
        confidence: Option<f64>,

        /// Only cover the signatures passed with --existing
        #[arg(long)]
        no_detect: bool,

        /// Output path (default: <input>_signatures_redacted.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
