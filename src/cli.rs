use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kombi")]
#[command(author, version, about = "Content-pipeline orchestrator")]
pub struct Cli {
    /// Resource file or directory with user kinds and procedures
    #[arg(short = 'c', long = "config", global = true)]
    pub support: Option<PathBuf>,

    /// Enable verbose logging and echo child output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the configured task trees over an input path
    Run {
        /// Resource file or directory describing the tasks
        #[arg(required = true)]
        config: PathBuf,

        /// File or directory to process
        #[arg(required = true)]
        input: PathBuf,

        /// Dispatcher: local or renderFarm
        #[arg(long, default_value = "local")]
        dispatcher: String,

        /// Wait for wrapped tasks to finish (default)
        #[arg(long = "await", overrides_with = "no_await")]
        wait: bool,

        /// Launch wrapped tasks without waiting for them
        #[arg(long)]
        no_await: bool,

        /// Reporter: columns, detailed or json
        #[arg(long, default_value = "columns")]
        reporter: String,

        /// Abort on unresolved templates instead of skipping elements
        #[arg(long)]
        strict: bool,

        /// Bindings per chunk for split tasks
        #[arg(long)]
        split_size: Option<usize>,

        /// Spool directory of the renderFarm dispatcher
        #[arg(long)]
        spool_dir: Option<PathBuf>,
    },

    /// List registered element kinds, task kinds and wrappers
    ListTypes {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate resource files
    Validate {
        /// Resource file or directory (uses --config if not specified)
        config: Option<PathBuf>,
    },

    /// Perform a serialised task (child side of task wrappers)
    #[command(hide = true)]
    ExecJob {
        /// Task JSON written by the parent
        job: PathBuf,
        /// Where to write the produced elements
        result: PathBuf,
    },

    /// Render farm plumbing
    #[command(hide = true)]
    Farm {
        #[command(subcommand)]
        command: FarmCommands,
    },
}

#[derive(Subcommand)]
pub enum FarmCommands {
    /// Execute one farm job
    Exec {
        /// Auxiliary data file of the job
        aux: PathBuf,

        /// First binding of the range (inclusive)
        #[arg(long, requires = "range_end")]
        range_start: Option<usize>,

        /// Last binding of the range (inclusive)
        #[arg(long, requires = "range_start")]
        range_end: Option<usize>,

        /// Farm id of this job (defaults to KOMBI_FARM_JOB_ID)
        #[arg(long)]
        job_id: Option<String>,
    },

    /// Run every ready job of a spool directory
    Drain {
        /// Spool directory
        dir: PathBuf,
    },
}
