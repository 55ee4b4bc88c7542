use std::path::PathBuf;

use thiserror::Error;

use crate::host::Captured;
use crate::lifecycle::ContainerState;

/// Errors surfaced by probing, lifecycle and validation operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no container engine found (tried: {})", .tried.join(", "))]
    EngineNotFound { tried: Vec<String> },

    #[error("no usable GPU: {0}")]
    GpuUnavailable(String),

    #[error("container name `{name}` is already in use")]
    ContainerAlreadyExists { name: String },

    #[error("container `{name}` is not running (state: {state})")]
    ContainerNotRunning { name: String, state: ContainerState },

    #[error("validation failed: {failed} required check(s) did not pass")]
    ValidationCheckFailed { failed: usize },

    #[error("`{command}` failed ({})", describe_exit(.code))]
    EngineCommand { command: String, code: Option<i32> },

    #[error("`{command}` timed out and was killed")]
    EngineTimeout { command: String },

    #[error("CDI regeneration finished but `nvidia.com/gpu` is still not advertised")]
    CdiNotAdvertised,

    #[error("failed to lock {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid command line `{0}`")]
    BadCommand(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify a failed captured engine call.
    pub(crate) fn engine_failure(command: String, out: &Captured) -> Self {
        if out.timed_out {
            Error::EngineTimeout { command }
        } else {
            Error::EngineCommand {
                command,
                code: out.exit_code,
            }
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit {code}"),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_not_found_lists_candidates() {
        let err = Error::EngineNotFound {
            tried: vec!["podman".into(), "docker".into()],
        };
        assert_eq!(
            err.to_string(),
            "no container engine found (tried: podman, docker)"
        );
    }

    #[test]
    fn engine_command_reports_signal_termination() {
        let err = Error::EngineCommand {
            command: "podman run".into(),
            code: None,
        };
        assert!(err.to_string().contains("terminated by signal"));

        let err = Error::EngineCommand {
            command: "podman run".into(),
            code: Some(125),
        };
        assert!(err.to_string().contains("exit 125"));
    }

    #[test]
    fn killed_capture_is_reported_as_timeout() {
        let out = Captured {
            timed_out: true,
            ..Captured::default()
        };
        let err = Error::engine_failure("podman run -d".into(), &out);
        assert!(matches!(err, Error::EngineTimeout { .. }));
        assert_eq!(err.to_string(), "`podman run -d` timed out and was killed");

        let err = Error::engine_failure("podman run -d".into(), &Captured::failed(125, ""));
        assert!(matches!(err, Error::EngineCommand { code: Some(125), .. }));
    }
}
