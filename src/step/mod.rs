mod extractor;
mod job_step;
mod translate;

pub use extractor::{DefaultJobParametersExtractor, JobParametersExtractor, extract};
pub use job_step::{JOB_PARAMETERS_KEY, JobStep, JobStepBuilder, STEP_TYPE_KEY};
pub use translate::translate;

use crate::batch::StepExecution;

/// A unit of work run by the enclosing job.
///
/// `execute` records its outcome on the step execution (status, exit status,
/// context, failures); saving it is the caller's job.
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, step_execution: &mut StepExecution);
}
