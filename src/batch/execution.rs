use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::ExecutionContext;
use super::parameters::JobParameters;
use super::status::{BatchStatus, ExitStatus};

/// Classifies a recorded failure so callers can tell a rejected launch from a
/// child job that blew up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Wiring problem, e.g. a missing job or launcher.
    Configuration,
    /// The launcher refused to start the child (duplicate or not restartable).
    LaunchRejected,
    /// Parameters could not be derived for the child.
    InvalidParameters,
    /// The child job raised an error while running.
    ChildExecution,
    /// Reading or writing execution records failed.
    Repository,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Configuration => write!(f, "Configuration"),
            FailureKind::LaunchRejected => write!(f, "LaunchRejected"),
            FailureKind::InvalidParameters => write!(f, "InvalidParameters"),
            FailureKind::ChildExecution => write!(f, "ChildExecution"),
            FailureKind::Repository => write!(f, "Repository"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    pub kind: FailureKind,
    /// Error text as the caller saw it.
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl FailureCause {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

impl From<&crate::error::BatchError> for FailureCause {
    fn from(err: &crate::error::BatchError) -> Self {
        FailureCause::new(err.failure_kind(), err.to_string())
    }
}

/// A job name plus the key of its identifying parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: u64,
    pub job_name: String,
    /// See [`JobParameters::job_key`].
    pub job_key: String,
}

/// One attempt to run a job instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    /// Assigned by the repository.
    pub id: u64,
    /// Instance this execution is an attempt of; restarts share it.
    pub job_instance_id: u64,
    pub job_name: String,
    /// Full parameter set, non-identifying entries included.
    pub job_parameters: JobParameters,
    /// Lifecycle status; starts at `STARTING`.
    pub status: BatchStatus,
    /// Exit code and description; `UNKNOWN` until the execution ends.
    pub exit_status: ExitStatus,
    pub create_time: DateTime<Utc>,
    /// Set when the launcher marks the execution `STARTED`.
    pub start_time: Option<DateTime<Utc>>,
    /// Set once the execution is over. A running status without an end
    /// time is what makes an execution count as running.
    pub end_time: Option<DateTime<Utc>>,
    /// Refreshed by every repository update.
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub execution_context: ExecutionContext,
    /// Attached by the repository on reads; not stored with the execution.
    #[serde(default)]
    pub step_executions: Vec<StepExecution>,
    /// Errors recorded while the execution ran, oldest first.
    #[serde(default)]
    pub failures: Vec<FailureCause>,
}

impl JobExecution {
    pub fn new(id: u64, instance: &JobInstance, job_parameters: JobParameters) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_instance_id: instance.id,
            job_name: instance.job_name.clone(),
            job_parameters,
            status: BatchStatus::Starting,
            exit_status: ExitStatus::unknown(),
            create_time: now,
            start_time: None,
            end_time: None,
            last_updated: now,
            execution_context: ExecutionContext::new(),
            step_executions: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Still in flight: a running status and no end time recorded.
    pub fn is_running(&self) -> bool {
        self.status.is_running() && self.end_time.is_none()
    }

    /// Upgrade the status, never moving it backwards.
    pub fn upgrade_status(&mut self, status: BatchStatus) {
        self.status = self.status.upgrade_to(status);
    }

    /// Build a step execution belonging to this job execution. The step is
    /// not registered anywhere until it is added to a repository.
    pub fn create_step_execution(&self, step_name: impl Into<String>) -> StepExecution {
        StepExecution::new(step_name, self)
    }

    pub fn add_failure(&mut self, failure: FailureCause) {
        self.failures.push(failure);
    }
}

/// One attempt to run a step within a job execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    /// Zero until the step execution is added to a repository.
    pub id: u64,
    pub step_name: String,
    pub job_execution_id: u64,
    /// Used to find the previous attempt of the step on restart.
    pub job_instance_id: u64,
    pub job_name: String,
    /// Parameters of the owning job execution.
    pub job_parameters: JobParameters,
    pub status: BatchStatus,
    /// `EXECUTING` until the step decides its outcome.
    pub exit_status: ExitStatus,
    /// Saved with the step and handed back to the next attempt of the same
    /// step in the same job instance.
    #[serde(default)]
    pub execution_context: ExecutionContext,
    /// Faults absorbed by the step instead of being returned to the caller.
    #[serde(default)]
    pub failures: Vec<FailureCause>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl StepExecution {
    pub fn new(step_name: impl Into<String>, job_execution: &JobExecution) -> Self {
        Self {
            id: 0,
            step_name: step_name.into(),
            job_execution_id: job_execution.id,
            job_instance_id: job_execution.job_instance_id,
            job_name: job_execution.job_name.clone(),
            job_parameters: job_execution.job_parameters.clone(),
            status: BatchStatus::Starting,
            exit_status: ExitStatus::executing(),
            execution_context: ExecutionContext::new(),
            failures: Vec::new(),
            start_time: None,
            end_time: None,
            last_updated: Utc::now(),
        }
    }

    pub fn add_failure(&mut self, failure: FailureCause) {
        self.failures.push(failure);
    }

    /// Replace the execution context, e.g. with the one saved by a previous attempt.
    pub fn set_execution_context(&mut self, context: ExecutionContext) {
        self.execution_context = context;
    }
}

/// Flat record of a finished step execution, printed by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub job_name: String,
    pub job_execution_id: u64,
    pub step_name: String,
    pub step_execution_id: u64,
    pub status: BatchStatus,
    pub exit_status: ExitStatus,
    pub failures: Vec<FailureCause>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl ExecutionSummary {
    pub fn from_step(step: &StepExecution) -> Self {
        let duration_ms = match (step.start_time, step.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        };
        Self {
            job_name: step.job_name.clone(),
            job_execution_id: step.job_execution_id,
            step_name: step.step_name.clone(),
            step_execution_id: step.id,
            status: step.status,
            exit_status: step.exit_status.clone(),
            failures: step.failures.clone(),
            started_at: step.start_time,
            completed_at: step.end_time,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::JobParametersBuilder;
    use crate::error::BatchError;

    fn instance() -> JobInstance {
        JobInstance {
            id: 1,
            job_name: "job".into(),
            job_key: JobParameters::new().job_key(),
        }
    }

    #[test]
    fn job_execution_defaults() {
        let exec = JobExecution::new(7, &instance(), JobParameters::new());
        assert_eq!(exec.status, BatchStatus::Starting);
        assert_eq!(exec.exit_status, ExitStatus::unknown());
        assert!(exec.is_running());
        assert!(exec.step_executions.is_empty());
    }

    #[test]
    fn end_time_means_not_running() {
        let mut exec = JobExecution::new(7, &instance(), JobParameters::new());
        exec.end_time = Some(Utc::now());
        assert!(!exec.is_running());
    }

    #[test]
    fn step_execution_inherits_job_identity() {
        let params = JobParametersBuilder::new()
            .add_string("foo", "bar")
            .to_job_parameters();
        let exec = JobExecution::new(7, &instance(), params.clone());
        let step = exec.create_step_execution("step");
        assert_eq!(step.step_name, "step");
        assert_eq!(step.job_execution_id, 7);
        assert_eq!(step.job_instance_id, 1);
        assert_eq!(step.job_parameters, params);
        assert_eq!(step.status, BatchStatus::Starting);
        assert_eq!(step.exit_status, ExitStatus::executing());
    }

    #[test]
    fn upgrade_status_never_goes_back() {
        let mut exec = JobExecution::new(7, &instance(), JobParameters::new());
        exec.upgrade_status(BatchStatus::Failed);
        exec.upgrade_status(BatchStatus::Started);
        assert_eq!(exec.status, BatchStatus::Failed);
    }

    #[test]
    fn failure_cause_from_error() {
        let cause = FailureCause::from(&BatchError::JobExecution("FOO".into()));
        assert_eq!(cause.kind, FailureKind::ChildExecution);
        assert_eq!(cause.message, "FOO");
    }

    #[test]
    fn summary_from_step() {
        let exec = JobExecution::new(7, &instance(), JobParameters::new());
        let mut step = exec.create_step_execution("step");
        let start = Utc::now();
        step.start_time = Some(start);
        step.end_time = Some(start + chrono::Duration::milliseconds(250));
        let summary = ExecutionSummary::from_step(&step);
        assert_eq!(summary.step_name, "step");
        assert_eq!(summary.duration_ms, Some(250));
    }

    #[test]
    fn step_execution_serialization_roundtrip() {
        let exec = JobExecution::new(7, &instance(), JobParameters::new());
        let mut step = exec.create_step_execution("step");
        step.execution_context.put("foo", "bar");
        let json = serde_json::to_string(&step).unwrap();
        let back: StepExecution = serde_json::from_str(&json).unwrap();
        assert_eq!(back.execution_context.get_string("foo"), Some("bar"));
        assert_eq!(back.job_execution_id, 7);
    }
}
