use std::fmt;

use serde::Serialize;

/// Which container engine family a binary belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Podman,
    Docker,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Podman => "podman",
            EngineKind::Docker => "docker",
        }
    }
}

/// A reachable engine binary and the version it reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineInfo {
    pub kind: EngineKind,
    pub binary: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GpuInfo {
    pub name: String,
}

/// How the GPU reaches the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GpuExposure {
    /// `nvidia.com/gpu` is advertised through the Container Device Interface.
    Cdi,
    /// No CDI; access relies on disabling SELinux labelling plus the
    /// engine's hook-based GPU support.
    LegacyLabel,
    /// CPU only.
    Unsupported,
}

impl GpuExposure {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuExposure::Cdi => "cdi",
            GpuExposure::LegacyLabel => "legacy-label",
            GpuExposure::Unsupported => "unsupported",
        }
    }

    pub fn has_gpu(&self) -> bool {
        !matches!(self, GpuExposure::Unsupported)
    }
}

impl fmt::Display for GpuExposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host capabilities, probed fresh on every invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeEnvironment {
    pub engine: EngineInfo,
    pub gpu: Option<GpuInfo>,
    pub exposure: GpuExposure,
}

impl RuntimeEnvironment {
    pub fn gpu_name(&self) -> &str {
        self.gpu.as_ref().map_or("unknown", |g| g.name.as_str())
    }
}
