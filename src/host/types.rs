use std::io;
use std::time::Duration;

/// Outcome of a captured (non-interactive) subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convenience constructor for a zero exit with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Convenience constructor for a non-zero exit with the given stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }
}

/// Everything the probe and lifecycle need from the machine they run on.
///
/// `capture` is for short queries whose output is parsed and is bounded by
/// the host's query timeout. Engine calls that change state go through
/// `capture_with` so a slow image pull is not cut short. `attach` hands the
/// invoking terminal to the child and waits for it. A program that cannot be
/// found yields `io::ErrorKind::NotFound`.
pub trait Host {
    /// Run `program` to completion, killing it once `timeout` elapses.
    fn capture_with(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> io::Result<Captured>;

    /// Upper bound for [`Host::capture`]; `None` waits indefinitely.
    fn query_timeout(&self) -> Option<Duration> {
        None
    }

    fn capture(&self, program: &str, args: &[String]) -> io::Result<Captured> {
        self.capture_with(program, args, self.query_timeout())
    }

    /// Returns the child's exit code, or `None` when it was killed by a signal.
    fn attach(&self, program: &str, args: &[String]) -> io::Result<Option<i32>>;
}

/// Render a command line for logs and error messages.
pub fn render(program: &str, args: &[String]) -> String {
    let mut words = Vec::with_capacity(args.len() + 1);
    words.push(program);
    words.extend(args.iter().map(String::as_str));
    shell_words::join(words)
}
