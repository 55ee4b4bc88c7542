use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Shared-memory size handed to `--shm-size`, e.g. `12g`.
///
/// Accepts either a string with an optional `b`/`k`/`m`/`g` suffix or a bare
/// integer, which is taken as gigabytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShmSize(String);

impl ShmSize {
    pub fn gigabytes(n: u64) -> Self {
        Self(format!("{n}g"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        let digits = value.trim_end_matches(['b', 'k', 'm', 'g']);
        let suffix_len = value.len() - digits.len();
        if digits.is_empty() || suffix_len > 1 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if digits.bytes().all(|b| b == b'0') {
            return None;
        }
        Some(Self(value))
    }
}

impl fmt::Display for ShmSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ShmSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ShmSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ShmVisitor;

        impl<'de> Visitor<'de> for ShmVisitor {
            type Value = ShmSize;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a size like \"12g\" or a positive number of gigabytes")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<ShmSize, E> {
                if value == 0 {
                    return Err(E::custom("shm_size must be positive"));
                }
                Ok(ShmSize::gigabytes(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<ShmSize, E> {
                if value <= 0 {
                    return Err(E::custom("shm_size must be positive"));
                }
                Ok(ShmSize::gigabytes(value as u64))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<ShmSize, E> {
                ShmSize::parse(value)
                    .ok_or_else(|| E::custom(format!("invalid shm_size `{value}`")))
            }
        }

        deserializer.deserialize_any(ShmVisitor)
    }
}

/// An extra bind mount declared in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    pub host: PathBuf,
    pub container: PathBuf,
}

/// Paths inspected by `gpuctl validate`, relative to the work directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub service_profiles: Vec<PathBuf>,
    pub ignore_file: PathBuf,
    pub devcontainer: PathBuf,
    pub ci_workflow_dir: PathBuf,
    pub dependency_updates: PathBuf,
    pub submodules_file: PathBuf,
    pub min_submodules: usize,
    pub dependency_manifests: Vec<PathBuf>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            service_profiles: vec!["docker-compose.yml".into(), "podman-compose.yml".into()],
            ignore_file: ".dockerignore".into(),
            devcontainer: ".devcontainer/devcontainer.json".into(),
            ci_workflow_dir: ".github/workflows".into(),
            dependency_updates: ".github/dependabot.yml".into(),
            submodules_file: ".gitmodules".into(),
            min_submodules: 0,
            dependency_manifests: vec!["requirements.txt".into(), "pyproject.toml".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine binaries tried in order by the probe.
    pub engines: Vec<String>,
    pub image: String,
    pub container_name: String,
    pub containerfile: PathBuf,
    pub build_context: PathBuf,
    pub build_target: Option<String>,
    pub shm_size: ShmSize,
    pub network: String,
    pub privileged: bool,
    pub display: String,
    pub dataset_dir: PathBuf,
    pub experiments_dir: PathBuf,
    pub dataset_mount: PathBuf,
    pub experiments_mount: PathBuf,
    pub extra_mounts: Vec<MountConfig>,
    pub extra_env: BTreeMap<String, String>,
    pub interactive_command: Vec<String>,
    pub background_command: Vec<String>,
    pub exec_command: Vec<String>,
    pub cdi_spec_dirs: Vec<PathBuf>,
    pub cdi_generate_command: String,
    /// Seconds before a captured probe command is killed.
    pub probe_timeout: u64,
    /// Directory for per-container lock files. Defaults to the system temp dir.
    pub lock_dir: Option<PathBuf>,
    pub validation: ValidationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engines: vec!["podman".to_string(), "docker".to_string()],
            image: "localhost/gpu-workload:latest".to_string(),
            container_name: "gpu-workload".to_string(),
            containerfile: "Containerfile".into(),
            build_context: ".".into(),
            build_target: None,
            shm_size: ShmSize::gigabytes(12),
            network: "host".to_string(),
            privileged: false,
            display: ":0".to_string(),
            dataset_dir: "datasets".into(),
            experiments_dir: "experiments".into(),
            dataset_mount: "/workspace/datasets".into(),
            experiments_mount: "/workspace/experiments".into(),
            extra_mounts: Vec::new(),
            extra_env: BTreeMap::new(),
            interactive_command: vec!["bash".to_string()],
            background_command: vec!["sleep".to_string(), "infinity".to_string()],
            exec_command: vec!["bash".to_string()],
            cdi_spec_dirs: vec!["/etc/cdi".into(), "/var/run/cdi".into()],
            cdi_generate_command: "sudo nvidia-ctk cdi generate --output=/etc/cdi/nvidia.yaml"
                .to_string(),
            probe_timeout: 30,
            lock_dir: None,
            validation: ValidationConfig::default(),
        }
    }
}

impl Config {
    /// Apply `DATASET_DIR`, `EXPERIMENTS_DIR` and `DISPLAY` from `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(dir) = get("DATASET_DIR") {
            self.dataset_dir = dir.into();
        }
        if let Some(dir) = get("EXPERIMENTS_DIR") {
            self.experiments_dir = dir.into();
        }
        if let Some(display) = get("DISPLAY") {
            self.display = display;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_twelve_gigabytes_of_shm() {
        let cfg = Config::default();
        assert_eq!(cfg.shm_size.as_str(), "12g");
        assert_eq!(cfg.engines, vec!["podman", "docker"]);
    }

    #[test]
    fn shm_size_accepts_integer_and_suffixed_strings() {
        let cfg: Config = serde_yaml::from_str("shm_size: 8").unwrap();
        assert_eq!(cfg.shm_size.as_str(), "8g");

        let cfg: Config = serde_yaml::from_str("shm_size: 512M").unwrap();
        assert_eq!(cfg.shm_size.as_str(), "512m");
    }

    #[test]
    fn shm_size_rejects_garbage() {
        assert!(serde_yaml::from_str::<Config>("shm_size: lots").is_err());
        assert!(serde_yaml::from_str::<Config>("shm_size: 0").is_err());
        assert!(serde_yaml::from_str::<Config>("shm_size: 12gb").is_err());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let cfg: Config = serde_yaml::from_str("container_name: trainer\nprivileged: true").unwrap();
        assert_eq!(cfg.container_name, "trainer");
        assert!(cfg.privileged);
        assert_eq!(cfg.network, "host");
        assert_eq!(cfg.validation.service_profiles.len(), 2);
    }

    #[test]
    fn env_overrides_replace_directories() {
        let mut cfg = Config::default();
        cfg.apply_env(|key| match key {
            "DATASET_DIR" => Some("/tmp/d".into()),
            "EXPERIMENTS_DIR" => Some(String::new()),
            _ => None,
        });
        assert_eq!(cfg.dataset_dir, PathBuf::from("/tmp/d"));
        assert_eq!(cfg.experiments_dir, PathBuf::from("experiments"));
        assert_eq!(cfg.display, ":0");
    }
}
