mod context;
mod execution;
mod parameters;
mod status;

pub use context::{ContextValue, ExecutionContext};
pub use execution::{
    ExecutionSummary, FailureCause, FailureKind, JobExecution, JobInstance, StepExecution,
};
pub use parameters::{
    JobParameter, JobParameters, JobParametersBuilder, ParameterType, ParameterValue,
    parse_date, parse_key_spec,
};
pub use status::{BatchStatus, ExitStatus};
