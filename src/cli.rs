//! Command line interface of `jobstep`, built with clap.
//!
//! [`Cli`] carries the subcommands in [`Command`] (run, status, demo) and the
//! global `--verbose` flag.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::LauncherMode;

/// jobstep: run a child job as a step of a parent job and fold its outcome back.
#[derive(Debug, Parser)]
#[command(name = "jobstep", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Launcher accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LauncherArg {
    /// Run the child on the calling thread.
    Sync,
    /// Run the child as a supervised tokio task and join it.
    Task,
}

impl From<LauncherArg> for LauncherMode {
    fn from(arg: LauncherArg) -> Self {
        match arg {
            LauncherArg::Sync => LauncherMode::Sync,
            LauncherArg::Task => LauncherMode::Task,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the parent job, launching the configured child command as its step.
    Run {
        /// Path to the TOML configuration.
        #[arg(long, default_value = "jobstep.toml")]
        config: PathBuf,

        /// Parent job parameter, `name[(type)]=value`. Repeatable.
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Initial step context entry, `key=value`. Repeatable.
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,

        /// JSON file holding job executions (overrides the configuration).
        #[arg(long)]
        store: Option<PathBuf>,

        /// How to launch the child (overrides the configuration).
        #[arg(long)]
        launcher: Option<LauncherArg>,
    },

    /// List the job executions recorded in a store.
    Status {
        /// JSON file holding job executions.
        #[arg(long)]
        store: PathBuf,
    },

    /// Run built-in scenarios showing how child outcomes map onto the step.
    Demo,
}
