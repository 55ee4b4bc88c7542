use std::fmt;

use serde::Serialize;

use crate::engine::EngineInfo;
use crate::engine::commands::inspect_state_args;
use crate::error::{Error, Result};
use crate::host::{Host, render};

/// Observed state of the named container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

impl ContainerState {
    /// Map an engine `{{.State.Status}}` value. Anything that is not
    /// `running` (created, exited, paused, ...) counts as stopped.
    pub fn from_status(status: &str) -> Self {
        if status.trim().eq_ignore_ascii_case("running") {
            ContainerState::Running
        } else {
            ContainerState::Stopped
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Absent => "absent",
            ContainerState::Stopped => "stopped",
            ContainerState::Running => "running",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ask the engine for the container's state.
///
/// Only an inspect that names the container as unknown means absent; an
/// unreachable daemon or a permission error is an [`Error::EngineCommand`].
pub fn inspect_state<H: Host>(host: &H, engine: &EngineInfo, name: &str) -> Result<ContainerState> {
    let args = inspect_state_args(name);
    let out = host.capture(&engine.binary, &args)?;
    if out.success() {
        return Ok(ContainerState::from_status(&out.stdout));
    }
    if !out.timed_out && reports_missing(&out.stderr) {
        return Ok(ContainerState::Absent);
    }
    Err(Error::engine_failure(render(&engine.binary, &args), &out))
}

/// Podman says "no such container", Docker "No such object" or "No such container".
fn reports_missing(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("no such container") || stderr.contains("no such object")
}
