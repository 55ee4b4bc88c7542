use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{Config, ShmSize};
use crate::error::Result;

use super::types::RuntimeEnvironment;

/// A read-write bind mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    pub shm_size: ShmSize,
    pub network: String,
    pub privileged: bool,
}

/// Everything needed to create the workload container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub mounts: Vec<Mount>,
    pub env: BTreeMap<String, String>,
    pub limits: ResourceLimits,
    /// Trailing command for interactive sessions; empty means the image default.
    pub interactive_command: Vec<String>,
    /// Long-lived no-op keeping a detached container alive.
    pub background_command: Vec<String>,
}

impl ContainerSpec {
    /// Assemble the spec from config and the probed environment.
    ///
    /// Relative host paths are resolved against `work_dir`.
    pub fn from_config(cfg: &Config, environment: &RuntimeEnvironment, work_dir: &Path) -> Self {
        let mut mounts = vec![
            Mount {
                host: work_dir.join(&cfg.dataset_dir),
                container: cfg.dataset_mount.clone(),
            },
            Mount {
                host: work_dir.join(&cfg.experiments_dir),
                container: cfg.experiments_mount.clone(),
            },
        ];
        mounts.extend(cfg.extra_mounts.iter().map(|m| Mount {
            host: work_dir.join(&m.host),
            container: m.container.clone(),
        }));

        let mut env = BTreeMap::new();
        env.insert("DISPLAY".to_string(), cfg.display.clone());
        if environment.exposure.has_gpu() {
            env.insert("NVIDIA_VISIBLE_DEVICES".to_string(), "all".to_string());
            env.insert("NVIDIA_DRIVER_CAPABILITIES".to_string(), "all".to_string());
        }
        for (key, value) in &cfg.extra_env {
            env.insert(key.clone(), value.clone());
        }

        Self {
            name: cfg.container_name.clone(),
            image: cfg.image.clone(),
            mounts,
            env,
            limits: ResourceLimits {
                shm_size: cfg.shm_size.clone(),
                network: cfg.network.clone(),
                privileged: cfg.privileged,
            },
            interactive_command: cfg.interactive_command.clone(),
            background_command: cfg.background_command.clone(),
        }
    }

    /// Create every missing host mount directory.
    pub fn ensure_mount_dirs(&self) -> Result<()> {
        for mount in &self.mounts {
            if !mount.host.exists() {
                info!(path = %mount.host.display(), "creating mount directory");
                std::fs::create_dir_all(&mount.host)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MountConfig;
    use crate::engine::types::{EngineInfo, EngineKind, GpuExposure};

    fn environment(exposure: GpuExposure) -> RuntimeEnvironment {
        RuntimeEnvironment {
            engine: EngineInfo {
                kind: EngineKind::Podman,
                binary: "podman".into(),
                version: "5.2.0".into(),
            },
            gpu: None,
            exposure,
        }
    }

    #[test]
    fn absolute_overrides_are_kept_verbatim() {
        let mut cfg = Config::default();
        cfg.dataset_dir = "/tmp/d".into();
        let spec = ContainerSpec::from_config(
            &cfg,
            &environment(GpuExposure::Unsupported),
            Path::new("/work"),
        );
        assert_eq!(spec.mounts[0].host, PathBuf::from("/tmp/d"));
        assert_eq!(spec.mounts[1].host, PathBuf::from("/work/experiments"));
    }

    #[test]
    fn gpu_variables_only_with_gpu_exposure() {
        let cfg = Config::default();
        let cpu = ContainerSpec::from_config(
            &cfg,
            &environment(GpuExposure::Unsupported),
            Path::new("/w"),
        );
        assert!(!cpu.env.contains_key("NVIDIA_VISIBLE_DEVICES"));
        assert_eq!(cpu.env["DISPLAY"], ":0");

        let gpu = ContainerSpec::from_config(&cfg, &environment(GpuExposure::Cdi), Path::new("/w"));
        assert_eq!(gpu.env["NVIDIA_VISIBLE_DEVICES"], "all");
        assert_eq!(gpu.env["NVIDIA_DRIVER_CAPABILITIES"], "all");
    }

    #[test]
    fn extra_mounts_follow_the_fixed_ones() {
        let mut cfg = Config::default();
        cfg.extra_mounts.push(MountConfig {
            host: "cache".into(),
            container: "/root/.cache".into(),
        });
        let spec = ContainerSpec::from_config(
            &cfg,
            &environment(GpuExposure::Unsupported),
            Path::new("/w"),
        );
        assert_eq!(spec.mounts.len(), 3);
        assert_eq!(spec.mounts[2].host, PathBuf::from("/w/cache"));
    }

    #[test]
    fn ensure_mount_dirs_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        let spec = ContainerSpec::from_config(
            &cfg,
            &environment(GpuExposure::Unsupported),
            dir.path(),
        );
        spec.ensure_mount_dirs().unwrap();
        assert!(dir.path().join("datasets").is_dir());
        assert!(dir.path().join("experiments").is_dir());
        // Second call is a no-op.
        spec.ensure_mount_dirs().unwrap();
    }
}
