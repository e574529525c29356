//! Terminal output for `jobstep`: a spinner while the child runs and a
//! coloured summary afterwards.
//!
//! Uses `indicatif` for the spinner and `console` for colours.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::{BatchStatus, ExecutionSummary, JobExecution, StepExecution};

/// Spinner shown while a nested step waits for its child job.
pub struct StepProgress {
    // spinner on stderr, cleared before any outcome is printed
    pb: ProgressBar,
    // completed
    green: Style,
    // failed, unknown or abandoned, and failure causes
    red: Style,
    // stopped or stopping
    yellow: Style,
}

impl StepProgress {
    /// Start the spinner for the given step and child job.
    pub fn start(step_name: &str, child_name: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("{step_name}: waiting for child job '{child_name}'"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow().bold(),
        }
    }

    fn style_for(&self, status: BatchStatus) -> &Style {
        match status {
            BatchStatus::Completed => &self.green,
            BatchStatus::Stopped | BatchStatus::Stopping => &self.yellow,
            _ => &self.red,
        }
    }

    /// Stop the spinner without printing anything.
    pub fn clear(&self) {
        self.pb.finish_and_clear();
    }

    /// Stop the spinner and print the step outcome.
    pub fn complete(&self, step: &StepExecution) {
        self.pb.finish_and_clear();
        let style = self.style_for(step.status);
        let mark = match step.status {
            BatchStatus::Completed => "✓",
            BatchStatus::Stopped => "■",
            _ => "✗",
        };
        println!(
            "  {} {} {} (exit {})",
            style.apply_to(mark),
            step.step_name,
            style.apply_to(step.status),
            step.exit_status
        );
        for failure in &step.failures {
            println!("    {} {}: {}", self.red.apply_to("•"), failure.kind, failure.message);
        }
    }

    /// Print the execution summary as pretty JSON.
    pub fn print_summary(&self, step: &StepExecution) {
        let summary = ExecutionSummary::from_step(step);
        println!();
        println!("{}", self.style_for(step.status).apply_to("─── Step Execution ───"));
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).unwrap_or_default()
        );
    }
}

/// One line per job execution, for `jobstep status`.
pub fn print_executions(executions: &[JobExecution]) {
    let dim = Style::new().dim();
    if executions.is_empty() {
        println!("{}", dim.apply_to("no job executions recorded"));
        return;
    }
    for exec in executions {
        let style = match exec.status {
            BatchStatus::Completed => Style::new().green(),
            BatchStatus::Stopped => Style::new().yellow(),
            s if s.is_running() => Style::new().cyan(),
            _ => Style::new().red(),
        };
        println!(
            "#{:<4} {:<16} {:<10} exit={:<12} params=[{}]",
            exec.id,
            exec.job_name,
            style.apply_to(exec.status),
            exec.exit_status.exit_code,
            exec.job_parameters
        );
        for step in &exec.step_executions {
            println!(
                "       {} {} {} exit={}",
                dim.apply_to("└"),
                step.step_name,
                step.status,
                step.exit_status.exit_code
            );
        }
    }
}
