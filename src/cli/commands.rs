//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - serve: run the daemon in the foreground
//! - compile: submit a source file
//! - start/poll: drive a compiled job by id
//! - run: compile, start and follow a source file to completion

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Crunner - compile and run C programs behind a polling gateway
#[derive(Parser, Debug)]
#[command(name = "crunner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Daemon socket path (overrides config)
    #[arg(short, long, global = true)]
    pub socket: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daemon in the foreground
    Serve,

    /// Check that the daemon is reachable
    Ping,

    /// Compile a C source file and print the job id
    Compile {
        /// Path to the source file
        file: PathBuf,
    },

    /// Start running a compiled job
    Start {
        /// Job id returned by compile
        job_id: String,
    },

    /// Show the current state of a job
    Poll {
        /// Job id to inspect
        job_id: String,

        /// Print the snapshot as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Compile, start and follow a source file until it exits
    Run {
        /// Path to the source file
        file: PathBuf,

        /// Poll interval in milliseconds (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,
    },
}
