//! Nested job execution for batch processing.
//!
//! A [`JobStep`](step::JobStep) launches a complete child job through a
//! [`JobLauncher`](launch::JobLauncher), waits for it, and folds the child's
//! terminal status and exit status back into its own step execution. The
//! parameters given to the child are derived from the step's execution
//! context once and saved there, so a restarted step relaunches the same
//! child instance.

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod launch;
pub mod repository;
pub mod runner;
pub mod step;
pub mod ui;

pub use batch::{
    BatchStatus, ExecutionContext, ExitStatus, JobExecution, JobParameters, JobParametersBuilder,
    StepExecution,
};
pub use error::BatchError;
pub use job::{CommandJob, FnJob, Job};
pub use launch::{JobLauncher, SimpleJobLauncher, TaskJobLauncher};
pub use repository::{JobRepository, SimpleJobRepository};
pub use runner::StepRunner;
pub use step::{DefaultJobParametersExtractor, JobParametersExtractor, JobStep, Step};
