use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::host::Host;

use super::types::{EngineInfo, EngineKind, GpuExposure, GpuInfo, RuntimeEnvironment};

/// CDI kind that must be advertised for `cdi` mode.
pub const CDI_GPU_KIND: &str = "nvidia.com/gpu";

/// Probe engine, GPU and exposure mode in one go.
pub fn probe<H: Host>(host: &H, cfg: &Config) -> Result<RuntimeEnvironment> {
    let engine = detect_engine(host, &cfg.engines)?;
    let gpu = match detect_gpu(host) {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            warn!(error = %e, "continuing without a GPU");
            None
        }
    };
    let exposure = detect_gpu_exposure_mode(host, &cfg.cdi_spec_dirs, gpu.as_ref());
    info!(
        engine = engine.kind.as_str(),
        version = %engine.version,
        gpu = gpu.as_ref().map_or("unknown", |g| g.name.as_str()),
        exposure = exposure.as_str(),
        "probed runtime environment"
    );
    Ok(RuntimeEnvironment {
        engine,
        gpu,
        exposure,
    })
}

/// Return the first candidate binary that answers `--version`.
pub fn detect_engine<H: Host>(host: &H, candidates: &[String]) -> Result<EngineInfo> {
    for binary in candidates {
        let out = match host.capture(binary, &["--version".to_string()]) {
            Ok(out) => out,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(binary, "engine not on PATH");
                continue;
            }
            Err(e) => {
                debug!(binary, error = %e, "engine could not be started");
                continue;
            }
        };
        if !out.success() {
            debug!(binary, stderr = %out.stderr.trim(), "engine --version failed");
            continue;
        }
        return Ok(EngineInfo {
            kind: engine_kind(binary, &out.stdout),
            binary: binary.clone(),
            version: parse_version(&out.stdout),
        });
    }

    Err(Error::EngineNotFound {
        tried: candidates.to_vec(),
    })
}

/// Query the driver for the first GPU's name.
pub fn detect_gpu<H: Host>(host: &H) -> Result<GpuInfo> {
    let args = ["--query-gpu=name".to_string(), "--format=csv,noheader".to_string()];
    let out = host
        .capture("nvidia-smi", &args)
        .map_err(|e| Error::GpuUnavailable(format!("nvidia-smi: {e}")))?;
    if !out.success() {
        return Err(Error::GpuUnavailable(format!(
            "nvidia-smi exited with {:?}: {}",
            out.exit_code,
            out.stderr.trim()
        )));
    }
    out.stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|name| GpuInfo {
            name: name.to_string(),
        })
        .ok_or_else(|| Error::GpuUnavailable("nvidia-smi listed no devices".into()))
}

/// Decide how the GPU reaches the container.
///
/// CDI wins whenever `nvidia.com/gpu` is advertised. Without it a present
/// GPU falls back to label-disable mode; no GPU means CPU only.
pub fn detect_gpu_exposure_mode<H: Host>(
    host: &H,
    cdi_spec_dirs: &[PathBuf],
    gpu: Option<&GpuInfo>,
) -> GpuExposure {
    if cdi_gpu_advertised(host, cdi_spec_dirs) {
        return GpuExposure::Cdi;
    }
    match gpu {
        Some(gpu) => {
            warn!(
                gpu = %gpu.name,
                "CDI does not advertise {CDI_GPU_KIND}; falling back to label=disable, run `gpuctl setup-cdi` to fix"
            );
            GpuExposure::LegacyLabel
        }
        None => GpuExposure::Unsupported,
    }
}

/// True when either `nvidia-ctk cdi list` or a spec file declares the GPU kind.
pub fn cdi_gpu_advertised<H: Host>(host: &H, cdi_spec_dirs: &[PathBuf]) -> bool {
    let args = ["cdi".to_string(), "list".to_string()];
    match host.capture("nvidia-ctk", &args) {
        Ok(out) if out.success() => {
            let prefix = format!("{CDI_GPU_KIND}=");
            if out.stdout.lines().any(|l| l.trim().starts_with(&prefix)) {
                return true;
            }
        }
        Ok(out) => debug!(stderr = %out.stderr.trim(), "nvidia-ctk cdi list failed"),
        Err(e) => debug!(error = %e, "nvidia-ctk unavailable"),
    }

    cdi_spec_dirs.iter().any(|dir| spec_dir_declares_gpu(dir))
}

fn spec_dir_declares_gpu(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    WalkDir::new(dir)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            matches!(
                e.path().extension().and_then(|x| x.to_str()),
                Some("yaml" | "yml" | "json")
            )
        })
        .any(|e| spec_file_kind(e.path()).as_deref() == Some(CDI_GPU_KIND))
}

fn spec_file_kind(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    // JSON is valid YAML, so one parser covers both spec formats.
    let value: serde_yaml::Value = match serde_yaml::from_str(&contents) {
        Ok(v) => v,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "skipping unparsable CDI spec");
            return None;
        }
    };
    value.get("kind")?.as_str().map(str::to_string)
}

fn engine_kind(binary: &str, version_output: &str) -> EngineKind {
    let output = version_output.to_ascii_lowercase();
    if output.contains("podman") {
        EngineKind::Podman
    } else if output.contains("docker") {
        EngineKind::Docker
    } else if binary.contains("podman") {
        EngineKind::Podman
    } else {
        EngineKind::Docker
    }
}

/// Pull the version token out of `podman version 5.2.0` or
/// `Docker version 27.1.1, build 6312585`.
fn parse_version(output: &str) -> String {
    let mut words = output.split_whitespace();
    while let Some(word) = words.next() {
        if word.eq_ignore_ascii_case("version")
            && let Some(v) = words.next()
        {
            return v.trim_end_matches(',').to_string();
        }
    }
    output.trim().to_string()
}
