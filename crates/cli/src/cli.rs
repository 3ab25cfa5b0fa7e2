use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operator tool for the marshal routing layer.
///
/// Every command loads the same config and routing table a producer would,
/// so its answers match what the fleet does.
#[derive(Parser, Debug)]
#[command(name = "marshal", version, about = "Inspect and exercise marshal task routing")]
pub struct CliArgs {
    /// Config profile; keys are read as {PROFILE}_{KEY} first
    #[arg(long, env = "MARSHAL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Routing table to load instead of ROUTING_TABLE_PATH or the builtin one
    #[arg(long, global = true)]
    pub table: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show which queue a task kind resolves to
    Resolve {
        /// Task kind, e.g. perform_indexing
        kind: String,

        /// Model or retriever id for resource-scoped kinds
        #[arg(long)]
        resource: Option<String>,
    },

    /// Show how many sub-tasks a producer creates for an input
    Plan {
        /// Batched task kind, e.g. perform_video_decode
        kind: String,

        /// Number of input segments or frames
        total: u64,

        /// List every batch
        #[arg(long)]
        list: bool,
    },

    /// Show the frame sampling plan for a rate
    Sampling {
        /// Keep one frame every N (defaults to SAMPLING_RATE)
        #[arg(long)]
        rate: Option<u32>,
    },

    /// Validate the routing table and print it with its fleet fingerprint
    Catalog,

    /// Print the effective configuration with secrets removed
    Config,

    /// Submit one task through the configured broker
    Submit {
        kind: String,

        #[arg(long)]
        resource: Option<String>,

        /// JSON payload
        #[arg(long, default_value = "{}")]
        payload: String,
    },

    /// Check broker connectivity for catalog queues
    Health {
        /// Queues to check (defaults to every catalog queue)
        queues: Vec<String>,
    },
}
