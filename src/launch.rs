//! Launching a job for a given set of parameters and waiting for it to end.
//!
//! Both launchers share the same bookkeeping: refuse duplicate or
//! non-restartable launches, create and start the execution in the
//! repository, run the job, then close the execution and persist it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::batch::{
    BatchStatus, ExitStatus, FailureCause, FailureKind, JobExecution, JobParameters,
};
use crate::error::BatchError;
use crate::job::Job;
use crate::repository::JobRepository;

pub trait JobLauncher: Send + Sync {
    /// Run `job` with `parameters`, returning once the execution is terminal.
    ///
    /// A job that reports `FAILED` or `STOPPED` is returned as `Ok`; an error
    /// raised by the job is returned as [`BatchError::JobExecution`].
    fn run(&self, job: Arc<dyn Job>, parameters: JobParameters)
    -> Result<JobExecution, BatchError>;
}

fn start_execution(
    repository: &dyn JobRepository,
    job: &dyn Job,
    parameters: &JobParameters,
) -> Result<JobExecution, BatchError> {
    if let Some(last) = repository.get_last_job_execution(job.name(), parameters) {
        if last.is_running() {
            return Err(BatchError::JobExecutionAlreadyRunning {
                job_name: job.name().to_string(),
            });
        }
        if !job.is_restartable() {
            return Err(BatchError::JobRestart {
                job_name: job.name().to_string(),
                reason: "job instance already exists and is not restartable".into(),
            });
        }
    }

    let mut execution = repository.create_job_execution(job.name(), parameters)?;
    execution.status = BatchStatus::Started;
    execution.start_time = Some(Utc::now());
    repository.update(&mut execution)?;
    info!(job = job.name(), execution_id = execution.id, parameters = %parameters, "job launched");
    Ok(execution)
}

fn finish_execution(
    repository: &dyn JobRepository,
    mut execution: JobExecution,
    outcome: Result<(), String>,
) -> Result<JobExecution, BatchError> {
    match outcome {
        Ok(()) => {
            execution.status = match execution.status {
                BatchStatus::Starting | BatchStatus::Started => BatchStatus::Completed,
                BatchStatus::Stopping => BatchStatus::Stopped,
                other => other,
            };
            if execution.exit_status.is_running() {
                execution.exit_status = ExitStatus::for_status(execution.status);
            }
        }
        Err(ref message) => {
            execution.upgrade_status(BatchStatus::Failed);
            let failed = ExitStatus::with_description(ExitStatus::FAILED_CODE, message.clone());
            execution.exit_status = if execution.exit_status.is_running() {
                failed
            } else {
                execution.exit_status.and(&failed)
            };
            execution.add_failure(FailureCause::new(FailureKind::ChildExecution, message.clone()));
        }
    }
    if execution.end_time.is_none() {
        execution.end_time = Some(Utc::now());
    }

    let persisted = repository.update(&mut execution);
    info!(
        job = %execution.job_name,
        execution_id = execution.id,
        status = %execution.status,
        exit = %execution.exit_status,
        "job finished"
    );

    match (outcome, persisted) {
        (Err(message), Err(e)) => {
            warn!(job = %execution.job_name, error = %e, "could not record failed job execution");
            Err(BatchError::JobExecution(message))
        }
        (Err(message), Ok(())) => Err(BatchError::JobExecution(message)),
        (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(execution),
    }
}

/// Runs the job on the calling thread.
///
/// A panic inside the job is caught and recorded as a job fault, the same
/// way [`TaskJobLauncher`] reports it.
pub struct SimpleJobLauncher {
    repository: Arc<dyn JobRepository>,
}

impl SimpleJobLauncher {
    pub fn new(repository: Arc<dyn JobRepository>) -> Self {
        Self { repository }
    }
}

impl JobLauncher for SimpleJobLauncher {
    fn run(
        &self,
        job: Arc<dyn Job>,
        parameters: JobParameters,
    ) -> Result<JobExecution, BatchError> {
        let mut execution = start_execution(self.repository.as_ref(), job.as_ref(), &parameters)?;
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job.execute(&mut execution))) {
            Ok(result) => result.map_err(|e| format!("{e:#}")),
            Err(payload) => Err(panic_message(payload)),
        };
        finish_execution(self.repository.as_ref(), execution, outcome)
    }
}

/// Runs the job as a blocking task on a tokio runtime and joins it.
///
/// The caller still waits for the child to end; the child just gets its own
/// thread, and a panic inside it is reported as a job fault instead of
/// unwinding into the caller. `run` must not be called from within the
/// runtime's async context.
pub struct TaskJobLauncher {
    repository: Arc<dyn JobRepository>,
    // runtime that owns the blocking pool; must outlive the launcher
    runtime: Handle,
}

impl TaskJobLauncher {
    pub fn new(repository: Arc<dyn JobRepository>, runtime: Handle) -> Self {
        Self {
            repository,
            runtime,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "child job panicked".to_string()
    }
}

impl JobLauncher for TaskJobLauncher {
    fn run(
        &self,
        job: Arc<dyn Job>,
        parameters: JobParameters,
    ) -> Result<JobExecution, BatchError> {
        let execution = start_execution(self.repository.as_ref(), job.as_ref(), &parameters)?;
        let snapshot = execution.clone();

        let task_job = Arc::clone(&job);
        let task = self.runtime.spawn_blocking(move || {
            let mut execution = execution;
            let outcome = task_job.execute(&mut execution).map_err(|e| format!("{e:#}"));
            (execution, outcome)
        });

        let (execution, outcome) = match self.runtime.block_on(task) {
            Ok(joined) => joined,
            Err(e) if e.is_panic() => (snapshot, Err(panic_message(e.into_panic()))),
            Err(_) => (snapshot, Err("child job task was cancelled".to_string())),
        };
        finish_execution(self.repository.as_ref(), execution, outcome)
    }
}
