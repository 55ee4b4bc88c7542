use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::host::Host;

use super::checks;
use super::types::{CheckResult, CheckStatus, PipelineInput, ValidationReport};

/// Run every check in order and collect the results.
///
/// A failing check never stops the ones after it. `on_check` sees each
/// result as soon as it is known.
pub fn run_pipeline<H: Host>(
    input: &PipelineInput,
    host: &H,
    mut on_check: impl FnMut(&CheckResult),
) -> ValidationReport {
    let cfg = &input.config;
    let v = &cfg.validation;
    let work_dir = input.work_dir.as_path();

    let mut results = Vec::new();
    let mut record = |result: CheckResult| {
        match result.status {
            CheckStatus::Pass => info!(check = %result.name, "{}", result.message),
            CheckStatus::Warn | CheckStatus::Fail => {
                warn!(check = %result.name, status = %result.status, "{}", result.message)
            }
        }
        on_check(&result);
        results.push(result);
    };

    // ── Engine ───────────────────────────────────────────────────────
    record(checks::engine(host, &cfg.engines));

    // ── Service profiles ─────────────────────────────────────────────
    for profile in &v.service_profiles {
        record(checks::service_profile(work_dir, profile));
    }

    // ── Declarative artifacts ────────────────────────────────────────
    record(checks::present("ignore-file", work_dir, &v.ignore_file));
    record(checks::present("devcontainer", work_dir, &v.devcontainer));
    record(checks::ci_workflows(work_dir, &v.ci_workflow_dir));
    record(checks::present(
        "dependency-updates",
        work_dir,
        &v.dependency_updates,
    ));

    // ── Host ─────────────────────────────────────────────────────────
    record(checks::gpu(host));

    // ── Repository layout ────────────────────────────────────────────
    record(checks::submodules(
        work_dir,
        &v.submodules_file,
        v.min_submodules,
    ));
    record(checks::dependency_manifest(work_dir, &v.dependency_manifests));

    ValidationReport::from_checks(results)
}

/// Turn a failed aggregate into [`Error::ValidationCheckFailed`].
pub fn ensure_passed(report: &ValidationReport) -> Result<()> {
    match report.required_failures() {
        0 => Ok(()),
        failed => Err(Error::ValidationCheckFailed { failed }),
    }
}
