use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::types::{Captured, Host, render};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// [`Host`] backed by real subprocesses. `timeout` bounds queries only.
#[derive(Debug, Clone)]
pub struct SystemHost {
    timeout: Duration,
}

impl SystemHost {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl Host for SystemHost {
    fn query_timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    fn capture_with(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> io::Result<Captured> {
        debug!(command = %render(program, args), ?timeout, "capturing");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe.
        let stdout_handle = std::thread::spawn(move || read_all(stdout));
        let stderr_handle = std::thread::spawn(move || read_all(stderr));

        let start = Instant::now();
        let mut timed_out = false;

        let exit_status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {}
                Err(_) => break None,
            }

            if let Some(limit) = timeout
                && start.elapsed() > limit
            {
                timed_out = true;
                warn!(command = %render(program, args), timeout = ?limit, "killing slow command");
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }

            std::thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();

        Ok(Captured {
            exit_code: exit_status.and_then(|s| s.code()),
            stdout,
            stderr,
            timed_out,
        })
    }

    fn attach(&self, program: &str, args: &[String]) -> io::Result<Option<i32>> {
        debug!(command = %render(program, args), "attaching");
        let status = Command::new(program).args(args).status()?;
        Ok(status.code())
    }
}

fn read_all<R: Read>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn capture_collects_stdout_and_exit_code() {
        let host = SystemHost::default();
        let out = host
            .capture("sh", &["-c".into(), "echo hello; echo oops >&2; exit 3".into()])
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.timed_out);
    }

    #[test]
    fn capture_kills_after_timeout() {
        let host = SystemHost::new(Duration::from_millis(100));
        let out = host.capture("sleep", &["5".into()]).unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[test]
    fn unbounded_capture_outlives_query_timeout() {
        let host = SystemHost::new(Duration::from_millis(100));
        let out = host
            .capture_with("sh", &["-c".into(), "sleep 0.4; echo done".into()], None)
            .unwrap();
        assert!(!out.timed_out);
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "done");
    }

    #[test]
    fn missing_program_is_not_found() {
        let host = SystemHost::default();
        let err = host
            .capture("gpuctl-definitely-not-a-binary", &[])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
