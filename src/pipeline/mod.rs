// Read-only repository and host validation.

pub mod checks;
pub mod orchestrator;
mod types;

pub use orchestrator::{ensure_passed, run_pipeline};
pub use types::{CheckResult, CheckStatus, PipelineInput, Summary, ValidationReport};
