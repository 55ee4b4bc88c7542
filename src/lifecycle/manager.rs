use std::io::IsTerminal;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::commands::{
    build_create_args, build_image_args, exec_args, remove_args, start_attached_args, stop_args,
};
use crate::engine::probe::cdi_gpu_advertised;
use crate::engine::{
    ContainerSpec, EngineInfo, RunMode, RuntimeEnvironment, build_run_args, detect_engine, probe,
};
use crate::error::{Error, Result};
use crate::host::{Host, render};

use super::lock::NameLock;
use super::state::{ContainerState, inspect_state};

/// What a mutating subcommand needs from the container name before it acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Desired {
    /// Nothing may hold the name afterwards.
    Cleared,
    /// A running container may stay; anything else is cleared.
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Snapshot printed by `gpuctl status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub environment: RuntimeEnvironment,
    pub container: String,
    pub state: ContainerState,
}

/// Drives the container through its lifecycle on one engine.
///
/// Every operation probes the host afresh; nothing is cached between calls.
pub struct LifecycleManager<'a, H: Host> {
    host: &'a H,
    config: &'a Config,
    work_dir: PathBuf,
    tty: bool,
}

impl<'a, H: Host> LifecycleManager<'a, H> {
    pub fn new(host: &'a H, config: &'a Config, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            host,
            config,
            work_dir: work_dir.into(),
            tty: std::io::stdin().is_terminal(),
        }
    }

    /// Override whether `exec` asks the engine for a pseudo-terminal.
    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    fn name(&self) -> &str {
        &self.config.container_name
    }

    fn lock(&self) -> Result<NameLock> {
        let dir = self
            .config
            .lock_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        NameLock::acquire(&dir, self.name())
    }

    fn spec(&self, environment: &RuntimeEnvironment) -> Result<ContainerSpec> {
        let spec = ContainerSpec::from_config(self.config, environment, &self.work_dir);
        spec.ensure_mount_dirs()?;
        Ok(spec)
    }

    /// Build the image. Container state is untouched.
    pub fn build(&self) -> Result<()> {
        let engine = detect_engine(self.host, &self.config.engines)?;
        let args = build_image_args(
            &self.config.image,
            &self.work_dir.join(&self.config.containerfile),
            self.config.build_target.as_deref(),
            &self.work_dir.join(&self.config.build_context),
        );
        info!(engine = engine.kind.as_str(), image = %self.config.image, "building image");
        self.attach_checked(&engine.binary, &args)
    }

    /// Replace any existing container and attach an interactive session.
    ///
    /// The container is created under the name lock and attached once the
    /// lock is released. Returns the engine's exit code verbatim.
    pub fn run(&self) -> Result<i32> {
        let environment = probe(self.host, self.config)?;
        let engine = &environment.engine;
        let spec = self.spec(&environment)?;
        let args = build_create_args(&spec, &environment);

        {
            let _lock = self.lock()?;
            self.reconcile(engine, Desired::Cleared)?;
            self.create_with_retry(engine, &args)?;
        }
        // The session can last hours; holding the lock would block `stop`.

        info!(container = self.name(), exposure = %environment.exposure, "starting interactive session");
        let args = start_attached_args(self.name());
        let code = self.host.attach(&engine.binary, &args)?;
        code.ok_or_else(|| Error::EngineCommand {
            command: render(&engine.binary, &args),
            code: None,
        })
    }

    /// Ensure a detached container is running. Re-entrant: a running
    /// container is left alone.
    pub fn start(&self) -> Result<StartOutcome> {
        let environment = probe(self.host, self.config)?;
        let engine = &environment.engine;
        let _lock = self.lock()?;

        if self.reconcile(engine, Desired::Running)? == ContainerState::Running {
            warn!(container = self.name(), "already running, nothing to do");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let spec = self.spec(&environment)?;
        let args = build_run_args(&spec, &environment, RunMode::Background);

        self.create_with_retry(engine, &args)?;

        match inspect_state(self.host, engine, self.name())? {
            ContainerState::Running => {
                info!(container = self.name(), exposure = %environment.exposure, "container running");
                Ok(StartOutcome::Started)
            }
            state => Err(Error::ContainerNotRunning {
                name: self.name().to_string(),
                state,
            }),
        }
    }

    /// Run `command` (or the configured default) inside the running container.
    pub fn exec(&self, command: &[String]) -> Result<i32> {
        let engine = detect_engine(self.host, &self.config.engines)?;
        match inspect_state(self.host, &engine, self.name())? {
            ContainerState::Running => {}
            state => {
                return Err(Error::ContainerNotRunning {
                    name: self.name().to_string(),
                    state,
                });
            }
        }

        let command = if command.is_empty() {
            self.config.exec_command.as_slice()
        } else {
            command
        };
        let args = exec_args(self.name(), command, self.tty);
        let code = self.host.attach(&engine.binary, &args)?;
        code.ok_or_else(|| Error::EngineCommand {
            command: render(&engine.binary, &args),
            code: None,
        })
    }

    /// Stop and remove the container. Succeeds when it is already gone.
    pub fn stop(&self) -> Result<()> {
        let engine = detect_engine(self.host, &self.config.engines)?;
        let _lock = self.lock()?;

        if inspect_state(self.host, &engine, self.name())? == ContainerState::Running {
            let out = self.host.capture_with(&engine.binary, &stop_args(self.name()), None)?;
            if !out.success() {
                warn!(container = self.name(), stderr = %out.stderr.trim(), "graceful stop failed, forcing removal");
            }
        }
        self.reconcile(&engine, Desired::Cleared)?;
        info!(container = self.name(), "container removed");
        Ok(())
    }

    /// Regenerate the CDI descriptor and confirm the GPU is now advertised.
    pub fn setup_cdi(&self) -> Result<()> {
        let words = shell_words::split(&self.config.cdi_generate_command)
            .map_err(|_| Error::BadCommand(self.config.cdi_generate_command.clone()))?;
        let (program, args) = words
            .split_first()
            .ok_or_else(|| Error::BadCommand(self.config.cdi_generate_command.clone()))?;

        info!(command = %self.config.cdi_generate_command, "regenerating CDI specification");
        self.attach_checked(program, args)?;

        if cdi_gpu_advertised(self.host, &self.config.cdi_spec_dirs) {
            info!("CDI now advertises nvidia.com/gpu");
            Ok(())
        } else {
            Err(Error::CdiNotAdvertised)
        }
    }

    pub fn status(&self) -> Result<StatusReport> {
        let environment = probe(self.host, self.config)?;
        let state = inspect_state(self.host, &environment.engine, self.name())?;
        Ok(StatusReport {
            environment,
            container: self.name().to_string(),
            state,
        })
    }

    /// Bring the container name into the shape `desired` asks for and
    /// return the resulting state.
    pub fn reconcile(&self, engine: &EngineInfo, desired: Desired) -> Result<ContainerState> {
        let state = inspect_state(self.host, engine, self.name())?;
        match (state, desired) {
            (ContainerState::Absent, _) => Ok(ContainerState::Absent),
            (ContainerState::Running, Desired::Running) => Ok(ContainerState::Running),
            (ContainerState::Running | ContainerState::Stopped, _) => {
                info!(container = self.name(), %state, "removing existing container");
                self.force_remove(engine)?;
                Ok(ContainerState::Absent)
            }
        }
    }

    fn force_remove(&self, engine: &EngineInfo) -> Result<()> {
        let args = remove_args(self.name());
        let out = self.host.capture_with(&engine.binary, &args, None)?;
        if out.success() || out.stderr.to_ascii_lowercase().contains("no such container") {
            return Ok(());
        }
        Err(Error::engine_failure(render(&engine.binary, &args), &out))
    }

    /// Create the container; a name taken by a racer is removed and the
    /// create retried exactly once.
    fn create_with_retry(&self, engine: &EngineInfo, args: &[String]) -> Result<()> {
        match self.create(engine, args) {
            Err(Error::ContainerAlreadyExists { name }) => {
                warn!(container = %name, "name taken during create, removing and retrying once");
                self.force_remove(engine)?;
                self.create(engine, args)
            }
            other => other,
        }
    }

    // No timeout: the engine may be pulling the image.
    fn create(&self, engine: &EngineInfo, args: &[String]) -> Result<()> {
        let out = self.host.capture_with(&engine.binary, args, None)?;
        if out.success() {
            return Ok(());
        }
        if out.stderr.to_ascii_lowercase().contains("already in use") {
            return Err(Error::ContainerAlreadyExists {
                name: self.name().to_string(),
            });
        }
        warn!(stderr = %out.stderr.trim(), "engine refused to create container");
        Err(Error::engine_failure(render(&engine.binary, args), &out))
    }

    fn attach_checked(&self, program: &str, args: &[String]) -> Result<()> {
        match self.host.attach(program, args)? {
            Some(0) => Ok(()),
            code => Err(Error::EngineCommand {
                command: render(program, args),
                code,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakeHost;

    fn config(lock_dir: &std::path::Path) -> Config {
        Config {
            lock_dir: Some(lock_dir.to_path_buf()),
            cdi_spec_dirs: Vec::new(),
            ..Config::default()
        }
    }

    #[test]
    fn reconcile_keeps_running_container_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let host = FakeHost::podman().with_container("gpu-workload", "running");
        let mgr = LifecycleManager::new(&host, &cfg, dir.path());
        let engine = detect_engine(&host, &cfg.engines).unwrap();

        assert_eq!(
            mgr.reconcile(&engine, Desired::Running).unwrap(),
            ContainerState::Running
        );
        assert!(host.engine_calls("rm").is_empty());

        assert_eq!(
            mgr.reconcile(&engine, Desired::Cleared).unwrap(),
            ContainerState::Absent
        );
        assert_eq!(host.container_count(), 0);
    }

    #[test]
    fn reconcile_clears_stopped_container_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let host = FakeHost::podman().with_container("gpu-workload", "exited");
        let mgr = LifecycleManager::new(&host, &cfg, dir.path());
        let engine = detect_engine(&host, &cfg.engines).unwrap();

        assert_eq!(
            mgr.reconcile(&engine, Desired::Running).unwrap(),
            ContainerState::Absent
        );
        assert_eq!(host.engine_calls("rm").len(), 1);
    }

    #[test]
    fn build_passes_target_and_containerfile() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.build_target = Some("runtime".into());
        let host = FakeHost::podman();
        LifecycleManager::new(&host, &cfg, dir.path()).build().unwrap();

        let builds = host.engine_calls("build");
        assert_eq!(builds.len(), 1);
        assert!(builds[0].contains(&"runtime".to_string()));
        assert!(builds[0].contains(&dir.path().join("Containerfile").display().to_string()));
        assert_eq!(host.container_count(), 0);
    }

    #[test]
    fn exec_without_terminal_omits_tty_flag() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let host = FakeHost::docker().with_container("gpu-workload", "running");
        let code = LifecycleManager::new(&host, &cfg, dir.path())
            .with_tty(false)
            .exec(&["nvidia-smi".to_string()])
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(host.engine_calls("exec"), [["exec", "-i", "gpu-workload", "nvidia-smi"]]);
    }

    #[test]
    fn setup_cdi_rejects_empty_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.cdi_generate_command = "   ".into();
        let host = FakeHost::podman();
        let err = LifecycleManager::new(&host, &cfg, dir.path())
            .setup_cdi()
            .unwrap_err();
        assert!(matches!(err, Error::BadCommand(_)));
    }
}
