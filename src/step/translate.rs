use tracing::warn;

use crate::batch::{BatchStatus, ExitStatus, JobExecution};

/// Map a finished child job execution onto the parent step's status and exit
/// status.
///
/// A completed child hands its exit status up only when job logic set a
/// custom code. Every other terminal status maps to itself with the default
/// exit status for that name. A child that is somehow still running when the
/// launcher returns is reported as `UNKNOWN`.
pub fn translate(child: &JobExecution) -> (BatchStatus, ExitStatus) {
    match child.status {
        BatchStatus::Completed if child.exit_status.is_custom() => {
            (BatchStatus::Completed, child.exit_status.clone())
        }
        BatchStatus::Completed => (BatchStatus::Completed, ExitStatus::completed()),
        BatchStatus::Failed => (BatchStatus::Failed, ExitStatus::failed()),
        BatchStatus::Stopped => (BatchStatus::Stopped, ExitStatus::stopped()),
        status @ (BatchStatus::Abandoned | BatchStatus::Unknown) => {
            (status, ExitStatus::for_status(status))
        }
        status @ (BatchStatus::Starting | BatchStatus::Started | BatchStatus::Stopping) => {
            warn!(
                job = %child.job_name,
                execution_id = child.id,
                status = %status,
                "child job returned while still running"
            );
            (BatchStatus::Unknown, ExitStatus::unknown())
        }
    }
}
