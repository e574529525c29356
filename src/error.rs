use thiserror::Error;

use crate::batch::FailureKind;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("A job execution for job '{job_name}' is already running")]
    JobExecutionAlreadyRunning { job_name: String },

    #[error("A job instance already exists and is complete for job '{job_name}' with parameters [{parameters}]")]
    JobInstanceAlreadyComplete { job_name: String, parameters: String },

    #[error("Job '{job_name}' cannot be restarted: {reason}")]
    JobRestart { job_name: String, reason: String },

    #[error("Invalid job parameters: {0}")]
    InvalidJobParameters(String),

    /// A fault raised by the job itself while it was running. The message is
    /// kept verbatim so it can be surfaced as a failure cause.
    #[error("{0}")]
    JobExecution(String),

    #[error("No job execution with id {0}")]
    NoSuchJobExecution(u64),

    #[error("No step execution with id {0}")]
    NoSuchStepExecution(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BatchError {
    /// Classifies the error for the failure list of a step execution.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            BatchError::Configuration(_) => FailureKind::Configuration,
            BatchError::JobExecutionAlreadyRunning { .. }
            | BatchError::JobInstanceAlreadyComplete { .. }
            | BatchError::JobRestart { .. } => FailureKind::LaunchRejected,
            BatchError::InvalidJobParameters(_) => FailureKind::InvalidParameters,
            BatchError::JobExecution(_) => FailureKind::ChildExecution,
            BatchError::NoSuchJobExecution(_)
            | BatchError::NoSuchStepExecution(_)
            | BatchError::Io(_)
            | BatchError::Json(_) => FailureKind::Repository,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_execution_display_is_the_raw_message() {
        let err = BatchError::JobExecution("FOO".into());
        assert_eq!(err.to_string(), "FOO");
    }

    #[test]
    fn launch_rejections_are_classified() {
        let err = BatchError::JobInstanceAlreadyComplete {
            job_name: "child".into(),
            parameters: "foo=bar".into(),
        };
        assert_eq!(err.failure_kind(), FailureKind::LaunchRejected);
        assert_eq!(
            err.to_string(),
            "A job instance already exists and is complete for job 'child' with parameters [foo=bar]"
        );

        let err = BatchError::JobRestart {
            job_name: "child".into(),
            reason: "job is not restartable".into(),
        };
        assert_eq!(err.failure_kind(), FailureKind::LaunchRejected);
    }

    #[test]
    fn invalid_parameters_are_classified() {
        let err = BatchError::InvalidJobParameters("bad".into());
        assert_eq!(err.failure_kind(), FailureKind::InvalidParameters);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BatchError>();
    }
}
