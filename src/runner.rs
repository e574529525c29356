//! Minimal single-step job runner used by the CLI.
//!
//! It plays the part of the enclosing job: it opens a parent job execution,
//! hands a restarted step the context its previous attempt saved, runs the
//! step once and persists the outcome.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::batch::{
    BatchStatus, ExecutionContext, ExitStatus, FailureCause, JobExecution, JobParameters,
    StepExecution,
};
use crate::error::BatchError;
use crate::repository::JobRepository;
use crate::step::Step;

pub struct StepRunner {
    repository: Arc<dyn JobRepository>,
}

impl StepRunner {
    pub fn new(repository: Arc<dyn JobRepository>) -> Self {
        Self { repository }
    }

    /// Run `step` as the only step of job `job_name`.
    ///
    /// `seed` becomes the step's execution context on a first attempt. When
    /// the same job instance already ran this step without completing, the
    /// saved context of that attempt is used instead.
    ///
    /// If recording the outcome fails once the parent execution has started,
    /// the parent is closed as `FAILED` before the error is returned.
    pub fn run(
        &self,
        step: &dyn Step,
        job_name: &str,
        parameters: &JobParameters,
        seed: ExecutionContext,
    ) -> Result<StepExecution, BatchError> {
        let mut job_execution = self.repository.create_job_execution(job_name, parameters)?;
        job_execution.status = BatchStatus::Started;
        job_execution.start_time = Some(Utc::now());
        self.repository.update(&mut job_execution)?;

        match self.run_step(step, &mut job_execution, seed) {
            Ok(step_execution) => {
                info!(
                    job = job_name,
                    execution_id = job_execution.id,
                    status = %job_execution.status,
                    exit = %job_execution.exit_status,
                    "parent job finished"
                );
                Ok(step_execution)
            }
            Err(e) => {
                self.close_failed(&mut job_execution, &e);
                Err(e)
            }
        }
    }

    fn run_step(
        &self,
        step: &dyn Step,
        job_execution: &mut JobExecution,
        seed: ExecutionContext,
    ) -> Result<StepExecution, BatchError> {
        let mut step_execution = job_execution.create_step_execution(step.name());
        match self
            .repository
            .get_last_step_execution(job_execution.job_instance_id, step.name())
        {
            Some(previous) if previous.status != BatchStatus::Completed => {
                info!(
                    job = %job_execution.job_name,
                    step = step.name(),
                    previous_status = %previous.status,
                    "restarting step with saved execution context"
                );
                if !seed.is_empty() {
                    debug!(ignored = %seed, "seed context ignored on restart");
                }
                step_execution.set_execution_context(previous.execution_context);
            }
            _ => step_execution.set_execution_context(seed),
        }
        self.repository.add_step_execution(&mut step_execution)?;

        step.execute(&mut step_execution);
        self.repository.update_step_execution(&mut step_execution)?;

        job_execution.upgrade_status(step_execution.status);
        job_execution.exit_status = step_execution.exit_status.clone();
        job_execution.failures.extend(step_execution.failures.iter().cloned());
        job_execution.end_time = Some(Utc::now());
        job_execution.step_executions.push(step_execution.clone());
        self.repository.update(job_execution)?;
        Ok(step_execution)
    }

    /// Best effort: the original error is what the caller gets back.
    fn close_failed(&self, job_execution: &mut JobExecution, error: &BatchError) {
        job_execution.upgrade_status(BatchStatus::Failed);
        job_execution.exit_status =
            ExitStatus::with_description(ExitStatus::FAILED_CODE, error.to_string());
        job_execution.add_failure(FailureCause::from(error));
        job_execution.end_time = Some(Utc::now());
        if let Err(e) = self.repository.update(job_execution) {
            warn!(
                job = %job_execution.job_name,
                execution_id = job_execution.id,
                error = %e,
                "could not close parent job execution"
            );
        }
    }
}
