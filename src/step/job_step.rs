//! A step that runs a whole job as its unit of work.
//!
//! The parameters handed to the child are derived once and saved in the
//! step's execution context under [`JOB_PARAMETERS_KEY`]. A restarted step
//! gets that context back and relaunches the child with exactly the same
//! parameters, so the repository sees a restart of the same child instance
//! rather than a brand new one.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use super::Step;
use super::extractor::{DefaultJobParametersExtractor, JobParametersExtractor};
use super::translate::translate;
use crate::batch::{BatchStatus, ExitStatus, FailureCause, JobExecution, JobParameters, StepExecution};
use crate::error::BatchError;
use crate::job::Job;
use crate::launch::JobLauncher;

/// Context key holding the parameters the child was launched with.
pub const JOB_PARAMETERS_KEY: &str = "jobstep.JobStep.JOB_PARAMETERS";

/// Context key recording which kind of step wrote the context.
pub const STEP_TYPE_KEY: &str = "jobstep.Step.STEP_TYPE";

const STEP_TYPE: &str = "jobstep.JobStep";

/// Runs [`job`](Self::job) through a launcher and takes on the child's outcome.
pub struct JobStep {
    name: String,
    // child job launched on every execute
    job: Arc<dyn Job>,
    // blocks until the child execution is over
    launcher: Arc<dyn JobLauncher>,
    // only consulted when the context holds no saved parameters
    extractor: Arc<dyn JobParametersExtractor>,
}

impl JobStep {
    pub fn builder() -> JobStepBuilder {
        JobStepBuilder::default()
    }

    pub fn job(&self) -> &dyn Job {
        self.job.as_ref()
    }

    /// Parameters for this attempt: the ones saved by an earlier attempt if
    /// the context has them, otherwise freshly extracted and saved.
    pub fn resolve_parameters(
        &self,
        step_execution: &mut StepExecution,
    ) -> Result<JobParameters, BatchError> {
        if let Some(saved) = step_execution
            .execution_context
            .get_parameters(JOB_PARAMETERS_KEY)
        {
            debug!(parameters = %saved, "reusing child job parameters from execution context");
            return Ok(saved.clone());
        }
        let parameters = self
            .extractor
            .get_job_parameters(self.job.as_ref(), step_execution)?;
        step_execution
            .execution_context
            .put(JOB_PARAMETERS_KEY, parameters.clone());
        Ok(parameters)
    }

    fn launch_child(&self, step_execution: &mut StepExecution) -> Result<JobExecution, BatchError> {
        let parameters = self.resolve_parameters(step_execution)?;
        self.launcher.run(Arc::clone(&self.job), parameters)
    }
}

impl Step for JobStep {
    fn name(&self) -> &str {
        &self.name
    }

    /// Launch the child job and fold its outcome into `step_execution`.
    ///
    /// Never fails: a rejected launch or a child that raised an error or
    /// panicked leaves the step `FAILED` with the error recorded as a failure cause.
    /// Persisting the step execution is up to the caller.
    fn execute(&self, step_execution: &mut StepExecution) {
        let span = info_span!("job_step", step = %self.name, job = self.job.name());
        let _entered = span.enter();

        step_execution.status = BatchStatus::Started;
        step_execution.start_time = Some(Utc::now());
        step_execution.execution_context.put(STEP_TYPE_KEY, STEP_TYPE);

        match self.launch_child(step_execution) {
            Ok(child) => {
                let (status, exit_status) = translate(&child);
                info!(
                    child_execution_id = child.id,
                    child_status = %child.status,
                    status = %status,
                    exit = %exit_status,
                    "child job finished"
                );
                step_execution.status = status;
                step_execution.exit_status = exit_status;
            }
            Err(e) => {
                warn!(error = %e, kind = %e.failure_kind(), "child job did not complete");
                step_execution.add_failure(FailureCause::from(&e));
                step_execution.status = BatchStatus::Failed;
                step_execution.exit_status =
                    ExitStatus::with_description(ExitStatus::FAILED_CODE, e.to_string());
            }
        }

        let now = Utc::now();
        step_execution.end_time = Some(now);
        step_execution.last_updated = now;
    }
}

/// Assembles a [`JobStep`]; `build` refuses to produce one without a job and
/// a launcher.
#[derive(Default)]
pub struct JobStepBuilder {
    name: Option<String>,
    job: Option<Arc<dyn Job>>,
    launcher: Option<Arc<dyn JobLauncher>>,
    extractor: Option<Arc<dyn JobParametersExtractor>>,
}

impl JobStepBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn job(mut self, job: Arc<dyn Job>) -> Self {
        self.job = Some(job);
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn JobLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn JobParametersExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Check the wiring without building anything.
    pub fn validate(&self) -> Result<(), BatchError> {
        let mut missing = Vec::new();
        if self.job.is_none() {
            missing.push("job");
        }
        if self.launcher.is_none() {
            missing.push("job launcher");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BatchError::Configuration(format!(
                "{} must be provided for a job step",
                missing.join(" and ")
            )))
        }
    }

    pub fn build(self) -> Result<JobStep, BatchError> {
        self.validate()?;
        let (Some(job), Some(launcher)) = (self.job, self.launcher) else {
            return Err(BatchError::Configuration(
                "job and job launcher must be provided for a job step".into(),
            ));
        };
        let name = self.name.unwrap_or_else(|| job.name().to_string());
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(DefaultJobParametersExtractor::default()));
        Ok(JobStep {
            name,
            job,
            launcher,
            extractor,
        })
    }
}
