// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines global flags, all subcommands and their arguments.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skiff")]
#[command(about = "Zero-downtime blue-green container deployment over SSH")]
#[command(version)]
pub struct Cli {
    /// Log every remote command (secrets masked)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Answer yes to confirmations
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Path to skiff.yml (default: discovered in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Only act on this server host
    #[arg(short, long, global = true)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Service {
    App,
    Worker,
    Db,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a new release to every configured server
    Deploy {
        /// Image tag to deploy (default: the tag in the config, else latest)
        #[arg(short, long)]
        tag: Option<String>,

        /// Continue past failed pre-deploy hooks and health checks
        #[arg(long)]
        force: bool,
    },

    /// Re-activate an older release
    Rollback {
        /// Release to restore (default: the one before current)
        #[arg(long)]
        to: Option<String>,

        /// Break a live deploy lock
        #[arg(long)]
        force: bool,
    },

    /// Run a command inside a container
    Exec {
        #[arg(short, long)]
        user: Option<String>,

        #[arg(long, value_enum, default_value = "app")]
        service: Service,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Open an interactive shell inside a container
    Shell {
        #[arg(short, long)]
        user: Option<String>,

        #[arg(long, value_enum, default_value = "app")]
        service: Service,
    },

    /// Show container logs
    Logs {
        /// Number of lines to show from the end
        #[arg(short = 'n', long)]
        tail: Option<String>,

        /// Only show logs newer than this (e.g. 10m, 2h)
        #[arg(long)]
        since: Option<String>,

        #[arg(short, long)]
        follow: bool,

        #[arg(long, value_enum, default_value = "app")]
        service: Service,
    },

    /// Show the current release and container state
    Status,
}
