//! Report publishing for pipeline commands

use crate::cli::ReportOptions;
use role_tester_core::git;
use role_tester_core::pipeline::PipelineOutcome;
use role_tester_core::process::ProcessExecutor;
use role_tester_core::report::RunReport;
use tracing::error;

use super::Prepared;

/// Print the summary and write the report file when `--report` is set
///
/// A report that cannot be written is logged; the pipeline verdict stands.
pub async fn publish_report<E: ProcessExecutor>(
    executor: &E,
    options: &ReportOptions,
    prepared: &Prepared,
    outcome: &PipelineOutcome,
) {
    if !options.report {
        return;
    }

    let git = git::collect(executor, &prepared.config.host_path).await;
    let report = RunReport::new(
        options.report_output.clone(),
        git,
        prepared.handle.distribution.clone(),
        prepared.config.clone(),
        outcome.hosts.clone(),
        outcome.result.clone(),
    );
    if let Err(err) = report.publish() {
        error!("Failed to write report: {}", err);
    }
}
