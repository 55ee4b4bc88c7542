//! Scripted in-memory host for unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use crate::host::{Captured, Host};

/// Fake engine, driver and CDI tooling that keeps container state in memory.
///
/// Understands exactly the commands gpuctl issues; anything else behaves
/// like a missing binary.
#[derive(Debug, Default)]
pub struct FakeHost {
    engine: Option<(String, String)>,
    gpu: Option<String>,
    cdi: Cell<bool>,
    cdi_generate_fixes: bool,
    attach_exit: Option<i32>,
    conflict_on_next_create: Cell<bool>,
    daemon_down: bool,
    containers: RefCell<BTreeMap<String, String>>,
    calls: RefCell<Vec<Vec<String>>>,
}

impl FakeHost {
    pub fn podman() -> Self {
        Self::with_engine("podman", "podman version 5.2.0")
    }

    pub fn docker() -> Self {
        Self::with_engine("docker", "Docker version 27.1.1, build 6312585")
    }

    pub fn without_engine() -> Self {
        Self {
            cdi_generate_fixes: true,
            attach_exit: Some(0),
            ..Self::default()
        }
    }

    fn with_engine(binary: &str, version: &str) -> Self {
        Self {
            engine: Some((binary.to_string(), version.to_string())),
            ..Self::without_engine()
        }
    }

    pub fn with_gpu(mut self, name: &str) -> Self {
        self.gpu = Some(name.to_string());
        self
    }

    pub fn with_cdi(self) -> Self {
        self.cdi.set(true);
        self
    }

    /// Make `nvidia-ctk cdi generate` succeed without advertising the GPU.
    pub fn with_broken_cdi_generate(mut self) -> Self {
        self.cdi_generate_fixes = false;
        self
    }

    /// Exit code returned by attached `start -ai`/`exec` sessions.
    pub fn with_attach_exit(mut self, code: Option<i32>) -> Self {
        self.attach_exit = code;
        self
    }

    /// Make every container query fail the way a stopped Docker daemon does.
    pub fn with_unreachable_daemon(mut self) -> Self {
        self.daemon_down = true;
        self
    }

    /// Seed a container, e.g. `("gpu-workload", "exited")`.
    pub fn with_container(self, name: &str, status: &str) -> Self {
        self.containers
            .borrow_mut()
            .insert(name.to_string(), status.to_string());
        self
    }

    /// Simulate a concurrent invocation claiming the name right before the
    /// next create.
    pub fn race_next_create(&self) {
        self.conflict_on_next_create.set(true);
    }

    pub fn status_of(&self, name: &str) -> Option<String> {
        self.containers.borrow().get(name).cloned()
    }

    pub fn container_count(&self) -> usize {
        self.containers.borrow().len()
    }

    pub fn cdi_advertised(&self) -> bool {
        self.cdi.get()
    }

    /// Every invocation so far, program first.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    /// Invocations of the engine whose first argument is `subcommand`.
    pub fn engine_calls(&self, subcommand: &str) -> Vec<Vec<String>> {
        let Some((binary, _)) = &self.engine else {
            return Vec::new();
        };
        self.calls()
            .into_iter()
            .filter(|c| c.first() == Some(binary) && c.get(1).map(String::as_str) == Some(subcommand))
            .map(|c| c[1..].to_vec())
            .collect()
    }

    fn record(&self, program: &str, args: &[String]) {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        self.calls.borrow_mut().push(call);
    }

    fn is_engine(&self, program: &str) -> bool {
        self.engine.as_ref().is_some_and(|(b, _)| b == program)
    }

    fn engine_capture(&self, args: &[String]) -> Captured {
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["--version"] => {
                let version = self.engine.as_ref().map(|(_, v)| v.clone()).unwrap_or_default();
                Captured::ok(format!("{version}\n"))
            }
            ["container", "inspect", ..] if self.daemon_down => Captured::failed(
                1,
                "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?\n",
            ),
            ["container", "inspect", "--format", _, name] => match self.status_of(name) {
                Some(status) => Captured::ok(format!("{status}\n")),
                None => Captured::failed(125, format!("Error: no such container {name}\n")),
            },
            ["rm", "-f", name] => match self.containers.borrow_mut().remove(*name) {
                Some(_) => Captured::ok(format!("{name}\n")),
                None => Captured::failed(
                    1,
                    format!("Error: no container with name or ID \"{name}\" found: no such container\n"),
                ),
            },
            ["stop", name] => match self.containers.borrow_mut().get_mut(*name) {
                Some(status) => {
                    *status = "exited".to_string();
                    Captured::ok(format!("{name}\n"))
                }
                None => Captured::failed(125, format!("Error: no such container {name}\n")),
            },
            ["run", rest @ ..] if rest.contains(&"-d") => self.create(rest, "running"),
            ["create", rest @ ..] => self.create(rest, "created"),
            _ => Captured::failed(125, format!("Error: unsupported fake command {args:?}\n")),
        }
    }

    fn create(&self, rest: &[&str], status: &str) -> Captured {
        let name = flag_value(rest, "--name").unwrap_or("anonymous").to_string();
        if self.conflict_on_next_create.replace(false) {
            self.containers
                .borrow_mut()
                .insert(name.clone(), "running".to_string());
        }
        if self.containers.borrow().contains_key(&name) {
            return Captured::failed(
                125,
                format!(
                    "Error: creating container storage: the container name \"{name}\" is already in use by 3f2a. You have to remove that container to be able to reuse that name: that name is already in use\n"
                ),
            );
        }
        self.containers.borrow_mut().insert(name, status.to_string());
        Captured::ok("3f2a9c\n")
    }

    fn engine_attach(&self, args: &[String]) -> Option<i32> {
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["build", ..] => Some(0),
            ["start", "-ai", name] => {
                // Created with `--rm`: the container is gone once the session ends.
                match self.containers.borrow_mut().remove(*name) {
                    Some(_) => self.attach_exit,
                    None => Some(125),
                }
            }
            ["exec", _, name, ..] => match self.status_of(name).as_deref() {
                Some("running") => self.attach_exit,
                _ => Some(125),
            },
            _ => Some(125),
        }
    }
}

impl Host for FakeHost {
    fn capture_with(
        &self,
        program: &str,
        args: &[String],
        _timeout: Option<Duration>,
    ) -> io::Result<Captured> {
        self.record(program, args);
        if self.is_engine(program) {
            return Ok(self.engine_capture(args));
        }
        match (program, args.first().map(String::as_str)) {
            ("nvidia-smi", _) => match &self.gpu {
                Some(name) => Ok(Captured::ok(format!("{name}\n"))),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "nvidia-smi")),
            },
            ("nvidia-ctk", Some("cdi")) if args.get(1).map(String::as_str) == Some("list") => {
                if self.cdi.get() {
                    Ok(Captured::ok("nvidia.com/gpu=0\nnvidia.com/gpu=all\n"))
                } else {
                    Ok(Captured::ok(""))
                }
            }
            _ => Err(io::Error::new(io::ErrorKind::NotFound, program.to_string())),
        }
    }

    fn attach(&self, program: &str, args: &[String]) -> io::Result<Option<i32>> {
        self.record(program, args);
        if self.is_engine(program) {
            return Ok(self.engine_attach(args));
        }
        let generates = args.iter().any(|a| a == "generate") && args.iter().any(|a| a == "cdi");
        if (program == "sudo" || program == "nvidia-ctk") && generates {
            if self.cdi_generate_fixes {
                self.cdi.set(true);
            }
            return Ok(Some(0));
        }
        Err(io::Error::new(io::ErrorKind::NotFound, program.to_string()))
    }
}

fn flag_value<'a>(args: &[&'a str], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| *a == flag)
        .and_then(|i| args.get(i + 1))
        .copied()
}
