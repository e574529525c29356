//! The job capability launched by a [`JobLauncher`](crate::launch::JobLauncher).
//!
//! A job only needs a name, a restartability flag and a way to run against
//! its own [`JobExecution`]. Whatever the job leaves in the execution's status
//! and exit status is what the launcher reports back.

use std::collections::BTreeMap;
use std::fmt;
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::batch::{BatchStatus, ExitStatus, JobExecution};

pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    fn is_restartable(&self) -> bool {
        true
    }

    /// Run the job, updating `execution` along the way. An `Err` is a fault
    /// raised by the job; reporting `FAILED` through the status is not.
    fn execute(&self, execution: &mut JobExecution) -> Result<()>;
}

type JobFn = dyn Fn(&mut JobExecution) -> Result<()> + Send + Sync;

/// A job whose body is a closure.
pub struct FnJob {
    name: String,
    restartable: bool,
    body: Box<JobFn>,
}

impl FnJob {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut JobExecution) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            restartable: true,
            body: Box::new(body),
        }
    }

    pub fn restartable(mut self, restartable: bool) -> Self {
        self.restartable = restartable;
        self
    }
}

impl fmt::Debug for FnJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob")
            .field("name", &self.name)
            .field("restartable", &self.restartable)
            .finish_non_exhaustive()
    }
}

impl Job for FnJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_restartable(&self) -> bool {
        self.restartable
    }

    fn execute(&self, execution: &mut JobExecution) -> Result<()> {
        (self.body)(execution)
    }
}

/// A job that runs an external command.
///
/// Job parameters are exported to the process as `JOBSTEP_PARAM_<NAME>`
/// environment variables (name upper-cased, non-alphanumerics replaced by `_`).
/// Exit status 0 completes the job; a code listed in `exit_codes` completes it
/// with that custom exit code; any other code fails it. A process killed by a
/// signal is reported as stopped.
#[derive(Debug, Clone)]
pub struct CommandJob {
    name: String,
    program: String,
    args: Vec<String>,
    restartable: bool,
    // process exit code -> exit code reported for a completed run
    exit_codes: BTreeMap<i32, String>,
}

impl CommandJob {
    pub fn new(name: impl Into<String>, command: &[String]) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            bail!("command for job must not be empty");
        };
        Ok(Self {
            name: name.into(),
            program: program.clone(),
            args: args.to_vec(),
            restartable: true,
            exit_codes: BTreeMap::new(),
        })
    }

    pub fn restartable(mut self, restartable: bool) -> Self {
        self.restartable = restartable;
        self
    }

    pub fn with_exit_codes(mut self, exit_codes: BTreeMap<i32, String>) -> Self {
        self.exit_codes = exit_codes;
        self
    }
}

fn env_name(parameter: &str) -> String {
    let sanitized: String = parameter
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("JOBSTEP_PARAM_{sanitized}")
}

impl Job for CommandJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_restartable(&self) -> bool {
        self.restartable
    }

    fn execute(&self, execution: &mut JobExecution) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (name, param) in execution.job_parameters.iter() {
            command.env(env_name(name), param.value.to_string());
        }

        debug!(job = %self.name, program = %self.program, "spawning command");
        let status = command
            .status()
            .with_context(|| format!("failed to run '{}'", self.program))?;

        let (batch_status, exit_status) = match status.code() {
            Some(0) => (BatchStatus::Completed, ExitStatus::completed()),
            Some(code) => match self.exit_codes.get(&code) {
                Some(custom) => (BatchStatus::Completed, ExitStatus::new(custom.clone())),
                None => (
                    BatchStatus::Failed,
                    ExitStatus::with_description(
                        ExitStatus::FAILED_CODE,
                        format!("command exited with status {code}"),
                    ),
                ),
            },
            None => (
                BatchStatus::Stopped,
                ExitStatus::with_description(
                    ExitStatus::STOPPED_CODE,
                    "command terminated by signal",
                ),
            ),
        };
        info!(job = %self.name, status = %batch_status, exit = %exit_status, "command finished");
        execution.status = batch_status;
        execution.exit_status = exit_status;
        Ok(())
    }
}
