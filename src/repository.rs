//! Storage of job instances and executions.
//!
//! [`SimpleJobRepository`] keeps everything in memory behind a mutex and can
//! mirror its state into a JSON file so that a later process sees the
//! executions of an earlier one (that is how the CLI restarts a failed run).

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::batch::{BatchStatus, JobExecution, JobInstance, JobParameters, StepExecution};
use crate::error::BatchError;

pub trait JobRepository: Send + Sync {
    /// Create a new execution for the instance identified by `job_name` and
    /// the identifying part of `parameters`, creating the instance if needed.
    ///
    /// Fails if the instance has a running execution, or if it already
    /// completed and the identifying parameters are non-empty.
    fn create_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Result<JobExecution, BatchError>;

    fn is_job_instance_exists(&self, job_name: &str, parameters: &JobParameters) -> bool;

    /// Latest execution of the instance, with its step executions attached.
    fn get_last_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Option<JobExecution>;

    fn update(&self, execution: &mut JobExecution) -> Result<(), BatchError>;

    /// Register a step execution and assign its id.
    fn add_step_execution(&self, step_execution: &mut StepExecution) -> Result<(), BatchError>;

    fn update_step_execution(&self, step_execution: &mut StepExecution) -> Result<(), BatchError>;

    /// Latest execution of `step_name` across all executions of a job instance.
    fn get_last_step_execution(
        &self,
        job_instance_id: u64,
        step_name: &str,
    ) -> Option<StepExecution>;

    /// Every job execution, oldest first.
    fn job_executions(&self) -> Vec<JobExecution>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoryState {
    next_id: u64,
    instances: Vec<JobInstance>,
    job_executions: Vec<JobExecution>,
    step_executions: Vec<StepExecution>,
}

impl RepositoryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn find_instance(&self, job_name: &str, job_key: &str) -> Option<&JobInstance> {
        self.instances
            .iter()
            .find(|i| i.job_name == job_name && i.job_key == job_key)
    }

    fn executions_of(&self, instance_id: u64) -> impl Iterator<Item = &JobExecution> {
        self.job_executions
            .iter()
            .filter(move |e| e.job_instance_id == instance_id)
    }

    fn with_steps(&self, execution: &JobExecution) -> JobExecution {
        let mut execution = execution.clone();
        execution.step_executions = self
            .step_executions
            .iter()
            .filter(|s| s.job_execution_id == execution.id)
            .cloned()
            .collect();
        execution
    }
}

pub struct SimpleJobRepository {
    state: Mutex<RepositoryState>,
    path: Option<PathBuf>,
}

impl SimpleJobRepository {
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(RepositoryState::default()),
            path: None,
        }
    }

    /// Open a file-backed repository, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BatchError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str::<RepositoryState>(&contents)?
        } else {
            RepositoryState::default()
        };
        debug!(path = %path.display(), executions = state.job_executions.len(), "opened job repository");
        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn flush(&self, state: &RepositoryState) -> Result<(), BatchError> {
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(state)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }
}

impl Default for SimpleJobRepository {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl JobRepository for SimpleJobRepository {
    fn create_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Result<JobExecution, BatchError> {
        let mut state = self.lock();
        let job_key = parameters.job_key();

        let instance = match state.find_instance(job_name, &job_key).cloned() {
            Some(instance) => {
                for execution in state.executions_of(instance.id) {
                    if execution.is_running() {
                        return Err(BatchError::JobExecutionAlreadyRunning {
                            job_name: job_name.to_string(),
                        });
                    }
                    let finished = matches!(
                        execution.status,
                        BatchStatus::Completed | BatchStatus::Abandoned
                    );
                    if finished && !parameters.identifying().is_empty() {
                        return Err(BatchError::JobInstanceAlreadyComplete {
                            job_name: job_name.to_string(),
                            parameters: parameters.to_string(),
                        });
                    }
                }
                instance
            }
            None => {
                let instance = JobInstance {
                    id: state.next_id(),
                    job_name: job_name.to_string(),
                    job_key,
                };
                state.instances.push(instance.clone());
                instance
            }
        };

        let id = state.next_id();
        let execution = JobExecution::new(id, &instance, parameters.clone());
        state.job_executions.push(execution.clone());
        self.flush(&state)?;
        debug!(job = job_name, execution_id = id, instance_id = instance.id, "created job execution");
        Ok(execution)
    }

    fn is_job_instance_exists(&self, job_name: &str, parameters: &JobParameters) -> bool {
        self.lock()
            .find_instance(job_name, &parameters.job_key())
            .is_some()
    }

    fn get_last_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Option<JobExecution> {
        let state = self.lock();
        let instance = state.find_instance(job_name, &parameters.job_key())?;
        state
            .executions_of(instance.id)
            .max_by_key(|e| e.id)
            .map(|e| state.with_steps(e))
    }

    fn update(&self, execution: &mut JobExecution) -> Result<(), BatchError> {
        let mut state = self.lock();
        let slot = state
            .job_executions
            .iter_mut()
            .find(|e| e.id == execution.id)
            .ok_or(BatchError::NoSuchJobExecution(execution.id))?;
        execution.last_updated = Utc::now();
        *slot = execution.clone();
        slot.step_executions.clear();
        self.flush(&state)
    }

    fn add_step_execution(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
        let mut state = self.lock();
        if !state
            .job_executions
            .iter()
            .any(|e| e.id == step_execution.job_execution_id)
        {
            return Err(BatchError::NoSuchJobExecution(step_execution.job_execution_id));
        }
        step_execution.id = state.next_id();
        step_execution.last_updated = Utc::now();
        state.step_executions.push(step_execution.clone());
        self.flush(&state)
    }

    fn update_step_execution(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
        let mut state = self.lock();
        step_execution.last_updated = Utc::now();
        step_execution.execution_context.clear_dirty();
        match state
            .step_executions
            .iter_mut()
            .find(|s| s.id == step_execution.id)
        {
            Some(slot) => *slot = step_execution.clone(),
            None => return Err(BatchError::NoSuchStepExecution(step_execution.id)),
        }
        self.flush(&state)
    }

    fn get_last_step_execution(
        &self,
        job_instance_id: u64,
        step_name: &str,
    ) -> Option<StepExecution> {
        self.lock()
            .step_executions
            .iter()
            .filter(|s| s.job_instance_id == job_instance_id && s.step_name == step_name)
            .max_by_key(|s| s.id)
            .cloned()
    }

    fn job_executions(&self) -> Vec<JobExecution> {
        let state = self.lock();
        state
            .job_executions
            .iter()
            .map(|e| state.with_steps(e))
            .collect()
    }
}
