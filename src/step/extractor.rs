use tracing::trace;

use crate::batch::{
    ExecutionContext, JobParameter, JobParameters, JobParametersBuilder, StepExecution,
    parse_key_spec,
};
use crate::error::BatchError;
use crate::job::Job;

/// Derives the parameters a child job is launched with from the parent step.
pub trait JobParametersExtractor: Send + Sync {
    fn get_job_parameters(
        &self,
        job: &dyn Job,
        step_execution: &StepExecution,
    ) -> Result<JobParameters, BatchError>;
}

/// Copies selected execution context entries into the child's parameters.
///
/// Keys may carry a type suffix (`count(long)`, `day(date)`, ...) to coerce
/// the context value; the suffix is not part of the parameter name. When
/// `use_all_parent_parameters` is set the parent job's parameters are copied
/// first and context entries override them.
#[derive(Debug, Clone, Default)]
pub struct DefaultJobParametersExtractor {
    // context keys, optionally with a type suffix
    keys: Vec<String>,
    use_all_parent_parameters: bool,
}

impl DefaultJobParametersExtractor {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            use_all_parent_parameters: false,
        }
    }

    pub fn use_all_parent_parameters(mut self, enabled: bool) -> Self {
        self.use_all_parent_parameters = enabled;
        self
    }
}

impl JobParametersExtractor for DefaultJobParametersExtractor {
    fn get_job_parameters(
        &self,
        job: &dyn Job,
        step_execution: &StepExecution,
    ) -> Result<JobParameters, BatchError> {
        let builder = if self.use_all_parent_parameters {
            JobParametersBuilder::from_parameters(&step_execution.job_parameters)
        } else {
            JobParametersBuilder::new()
        };
        let parameters = add_context_entries(builder, &step_execution.execution_context, &self.keys)?
            .to_job_parameters();
        trace!(job = job.name(), parameters = %parameters, "extracted child job parameters");
        Ok(parameters)
    }
}

/// Build parameters from the entries of `context` named by `keys`.
/// Keys missing from the context are skipped.
pub fn extract(context: &ExecutionContext, keys: &[String]) -> Result<JobParameters, BatchError> {
    Ok(add_context_entries(JobParametersBuilder::new(), context, keys)?.to_job_parameters())
}

fn add_context_entries(
    mut builder: JobParametersBuilder,
    context: &ExecutionContext,
    keys: &[String],
) -> Result<JobParametersBuilder, BatchError> {
    for key in keys {
        let (name, requested) = parse_key_spec(key);
        let Some(value) = context.get(name) else {
            continue;
        };
        let value = value.to_parameter_value(name, requested)?;
        builder = builder.add_parameter(name, JobParameter::identifying(value));
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{JobExecution, JobInstance, ParameterValue};
    use crate::job::FnJob;

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn step_with_parent(parent: JobParameters) -> StepExecution {
        let instance = JobInstance {
            id: 1,
            job_name: "job".into(),
            job_key: parent.job_key(),
        };
        JobExecution::new(2, &instance, parent).create_step_execution("step")
    }

    #[test]
    fn copies_present_keys_and_skips_missing_ones() {
        let mut ctx = ExecutionContext::new();
        ctx.put("foo", "bar");
        ctx.put("count", 3i64);
        let params = extract(&ctx, &keys(&["foo", "count", "missing"])).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params.get_string("foo"), Some("bar"));
        assert_eq!(params.get_long("count"), Some(3));
    }

    #[test]
    fn empty_key_set_gives_empty_parameters() {
        let mut ctx = ExecutionContext::new();
        ctx.put("foo", "bar");
        assert!(extract(&ctx, &[]).unwrap().is_empty());
    }

    #[test]
    fn is_deterministic_and_leaves_context_alone() {
        let mut ctx = ExecutionContext::new();
        ctx.put("b", 2.5f64);
        ctx.put("a", "x");
        ctx.clear_dirty();
        let first = extract(&ctx, &keys(&["a", "b"])).unwrap();
        let second = extract(&ctx, &keys(&["b", "a"])).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert!(!ctx.is_dirty());
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn typed_keys_coerce_values() {
        let mut ctx = ExecutionContext::new();
        ctx.put("count", "12");
        ctx.put("day", "2024-01-31");
        let params = extract(&ctx, &keys(&["count(long)", "day(date)"])).unwrap();
        assert_eq!(params.get_long("count"), Some(12));
        assert!(params.get_date("day").is_some());
        assert!(params.get("count(long)").is_none());
    }

    #[test]
    fn typed_key_mismatch_is_an_error() {
        let mut ctx = ExecutionContext::new();
        ctx.put("count", "twelve");
        let err = extract(&ctx, &keys(&["count(long)"])).unwrap_err();
        assert!(matches!(err, BatchError::InvalidJobParameters(_)));
    }

    #[test]
    fn extractor_reads_the_step_context() {
        let mut step = step_with_parent(JobParameters::new());
        step.execution_context.put("foo", "bar");
        let job = FnJob::new("child", |_| Ok(()));
        let params = DefaultJobParametersExtractor::new(["foo"])
            .get_job_parameters(&job, &step)
            .unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params.get_string("foo"), Some("bar"));
    }

    #[test]
    fn parent_parameters_are_copied_when_enabled() {
        let parent = JobParametersBuilder::new()
            .add_string("region", "eu")
            .add_string("foo", "parent")
            .to_job_parameters();
        let mut step = step_with_parent(parent);
        step.execution_context.put("foo", "context");
        let job = FnJob::new("child", |_| Ok(()));

        let without = DefaultJobParametersExtractor::new(["foo"])
            .get_job_parameters(&job, &step)
            .unwrap();
        assert_eq!(without.len(), 1);

        let with = DefaultJobParametersExtractor::new(["foo"])
            .use_all_parent_parameters(true)
            .get_job_parameters(&job, &step)
            .unwrap();
        assert_eq!(with.len(), 2);
        assert_eq!(with.get_string("region"), Some("eu"));
        assert_eq!(
            with.get("foo").map(|p| &p.value),
            Some(&ParameterValue::String("context".into()))
        );
    }
}
