use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use jobstep::batch::{ContextValue, ExitStatus, JobParameter, JobParametersBuilder};
use jobstep::cli::{Cli, Command, LauncherArg};
use jobstep::config::{JobStepConfig, LauncherMode};
use jobstep::ui::{StepProgress, print_executions};
use jobstep::{
    BatchStatus, CommandJob, DefaultJobParametersExtractor, ExecutionContext, FnJob, Job,
    JobLauncher, JobParameters, JobRepository, JobStep, SimpleJobLauncher, SimpleJobRepository,
    Step, StepExecution, StepRunner, TaskJobLauncher,
};

/// Log level comes from `--verbose`, then `RUST_LOG`, then defaults to info.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("jobstep=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobstep=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!("jobstep starting with args: {:?}", cli);

    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Run {
            config,
            params,
            context,
            store,
            launcher,
        } => run(config, &params, &context, store, launcher, cli.verbose),
        Command::Status { store } => {
            let repo = SimpleJobRepository::open(&store)
                .with_context(|| format!("opening store {}", store.display()))?;
            print_executions(&repo.job_executions());
            Ok(ExitCode::SUCCESS)
        }
        Command::Demo => demo(),
    }
}

fn exit_code_for(step: &StepExecution) -> ExitCode {
    match step.status {
        BatchStatus::Completed => ExitCode::SUCCESS,
        BatchStatus::Stopped => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

fn parse_parameters(assignments: &[String]) -> Result<JobParameters> {
    let mut builder = JobParametersBuilder::new();
    for assignment in assignments {
        let (name, parameter) = JobParameter::parse_assignment(assignment)?;
        builder = builder.add_parameter(name, parameter);
    }
    Ok(builder.to_job_parameters())
}

fn parse_context(entries: &[String]) -> Result<ExecutionContext> {
    let mut context = ExecutionContext::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got '{entry}'"))?;
        context.put(key.trim(), ContextValue::infer(value));
    }
    Ok(context)
}

fn run(
    config_path: PathBuf,
    params: &[String],
    context: &[String],
    store: Option<PathBuf>,
    launcher: Option<LauncherArg>,
    verbose: bool,
) -> Result<ExitCode> {
    let mut config = JobStepConfig::load(&config_path)?;
    if store.is_some() {
        config.store = store;
    }
    if let Some(arg) = launcher {
        config.launcher = arg.into();
    }

    let repository: Arc<dyn JobRepository> = match &config.store {
        Some(path) => Arc::new(
            SimpleJobRepository::open(path)
                .with_context(|| format!("opening store {}", path.display()))?,
        ),
        None => Arc::new(SimpleJobRepository::in_memory()),
    };

    let child = CommandJob::new(config.child.name.clone(), &config.child.command)?
        .restartable(config.child.restartable)
        .with_exit_codes(config.child.parsed_exit_codes()?);

    // Kept alive for the whole run when the task launcher is used.
    let runtime = match config.launcher {
        LauncherMode::Task => Some(tokio::runtime::Runtime::new()?),
        LauncherMode::Sync => None,
    };
    let job_launcher: Arc<dyn JobLauncher> = match &runtime {
        Some(rt) => Arc::new(TaskJobLauncher::new(repository.clone(), rt.handle().clone())),
        None => Arc::new(SimpleJobLauncher::new(repository.clone())),
    };

    let extractor = DefaultJobParametersExtractor::new(config.keys.clone())
        .use_all_parent_parameters(config.use_all_parent_parameters);
    let step = JobStep::builder()
        .name(config.step_name.clone())
        .job(Arc::new(child))
        .launcher(job_launcher)
        .extractor(Arc::new(extractor))
        .build()?;

    let parameters = parse_parameters(params)?;
    let seed = parse_context(context)?;

    let progress = StepProgress::start(step.name(), &config.child.name);
    let outcome = StepRunner::new(repository).run(&step, &config.parent_job, &parameters, seed);
    let step_execution = match outcome {
        Ok(step_execution) => step_execution,
        Err(e) => {
            progress.clear();
            return Err(e.into());
        }
    };
    progress.complete(&step_execution);
    if verbose {
        progress.print_summary(&step_execution);
    }
    Ok(exit_code_for(&step_execution))
}

/// Child outcomes shown by `jobstep demo`.
fn demo_jobs() -> Vec<(&'static str, FnJob)> {
    vec![
        (
            "completes",
            FnJob::new("child-completes", |exec| {
                exec.status = BatchStatus::Completed;
                Ok(())
            }),
        ),
        (
            "completes with custom exit",
            FnJob::new("child-custom-exit", |exec| {
                exec.status = BatchStatus::Completed;
                exec.exit_status =
                    ExitStatus::with_description("COMPLETED_WITH_SKIPS", "2 records skipped");
                Ok(())
            }),
        ),
        (
            "reports failure",
            FnJob::new("child-fails", |exec| {
                exec.status = BatchStatus::Failed;
                Ok(())
            }),
        ),
        (
            "stops",
            FnJob::new("child-stops", |exec| {
                exec.status = BatchStatus::Stopped;
                Ok(())
            }),
        ),
        (
            "raises an error",
            FnJob::new("child-raises", |_| Err(anyhow!("disk full"))),
        ),
    ]
}

fn demo() -> Result<ExitCode> {
    let repository: Arc<dyn JobRepository> = Arc::new(SimpleJobRepository::in_memory());
    let launcher: Arc<dyn JobLauncher> = Arc::new(SimpleJobLauncher::new(repository.clone()));
    let runner = StepRunner::new(repository.clone());
    let parameters = JobParametersBuilder::new()
        .add_string("demo", "1")
        .to_job_parameters();

    for (label, job) in demo_jobs() {
        println!("Child {label}:");
        let job: Arc<dyn Job> = Arc::new(job);
        let step = JobStep::builder()
            .name(format!("{}-step", job.name()))
            .job(job)
            .launcher(launcher.clone())
            .extractor(Arc::new(DefaultJobParametersExtractor::new(["input"])))
            .build()?;

        let mut seed = ExecutionContext::new();
        seed.put("input", "demo.csv");
        let progress = StepProgress::start(step.name(), step.job().name());
        let parent_job = format!("parent-{}", step.job().name());
        let step_execution = runner.run(&step, &parent_job, &parameters, seed);
        match step_execution {
            Ok(step_execution) => progress.complete(&step_execution),
            Err(e) => {
                progress.clear();
                return Err(e.into());
            }
        }
    }

    println!();
    print_executions(&repository.job_executions());
    Ok(ExitCode::SUCCESS)
}
