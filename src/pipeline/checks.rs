use std::path::Path;

use walkdir::WalkDir;

use crate::engine::{detect_engine, detect_gpu};
use crate::host::Host;

use super::types::CheckResult;

pub fn engine<H: Host>(host: &H, candidates: &[String]) -> CheckResult {
    match detect_engine(host, candidates) {
        Ok(info) => CheckResult::pass(
            "engine",
            format!("{} {} ({})", info.kind.as_str(), info.version, info.binary),
        ),
        Err(e) => CheckResult::fail("engine", e.to_string()),
    }
}

/// A service profile must be YAML with a `services` mapping.
pub fn service_profile(work_dir: &Path, profile: &Path) -> CheckResult {
    let name = format!("profile:{}", profile.display());
    let path = work_dir.join(profile);
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => return CheckResult::fail(name, format!("cannot read {}: {e}", path.display())),
    };
    let doc: serde_yaml::Value = match serde_yaml::from_str(&contents) {
        Ok(v) => v,
        Err(e) => return CheckResult::fail(name, format!("invalid YAML: {e}")),
    };
    match doc.get("services") {
        Some(serde_yaml::Value::Mapping(services)) if !services.is_empty() => {
            CheckResult::pass(name, format!("{} service(s)", services.len()))
        }
        Some(_) => CheckResult::fail(name, "`services` must be a non-empty mapping"),
        None => CheckResult::fail(name, "no `services` key"),
    }
}

pub fn present(name: &str, work_dir: &Path, artifact: &Path) -> CheckResult {
    if work_dir.join(artifact).exists() {
        CheckResult::pass(name, format!("{} present", artifact.display()))
    } else {
        CheckResult::fail(name, format!("{} missing", artifact.display()))
    }
}

/// At least one workflow file under the CI directory.
pub fn ci_workflows(work_dir: &Path, dir: &Path) -> CheckResult {
    let root = work_dir.join(dir);
    if !root.is_dir() {
        return CheckResult::fail("ci-workflow", format!("{} missing", dir.display()));
    }
    let count = WalkDir::new(&root)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            matches!(
                e.path().extension().and_then(|x| x.to_str()),
                Some("yml" | "yaml")
            )
        })
        .count();
    if count == 0 {
        CheckResult::fail("ci-workflow", format!("no workflow files in {}", dir.display()))
    } else {
        CheckResult::pass("ci-workflow", format!("{count} workflow file(s)"))
    }
}

pub fn gpu<H: Host>(host: &H) -> CheckResult {
    let result = match detect_gpu(host) {
        Ok(gpu) => CheckResult::pass("gpu", gpu.name),
        Err(e) => CheckResult::fail("gpu", format!("{e}; workload will run CPU-only")),
    };
    result.optional()
}

/// Count `[submodule "..."]` sections.
pub fn submodules(work_dir: &Path, file: &Path, minimum: usize) -> CheckResult {
    let count = match std::fs::read_to_string(work_dir.join(file)) {
        Ok(contents) => count_submodules(&contents),
        Err(_) => 0,
    };
    if count < minimum {
        CheckResult::fail(
            "submodules",
            format!("{count} registered, expected at least {minimum}"),
        )
    } else if count == 0 {
        CheckResult::warn("submodules", format!("none registered in {}", file.display()))
    } else {
        CheckResult::pass("submodules", format!("{count} registered"))
    }
}

fn count_submodules(contents: &str) -> usize {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("[submodule ") && l.ends_with(']'))
        .count()
}

/// Any one of the manifests is enough.
pub fn dependency_manifest(work_dir: &Path, manifests: &[impl AsRef<Path>]) -> CheckResult {
    let found: Vec<String> = manifests
        .iter()
        .map(AsRef::as_ref)
        .filter(|m| work_dir.join(m).is_file())
        .map(|m| m.display().to_string())
        .collect();
    if found.is_empty() {
        let wanted: Vec<String> = manifests
            .iter()
            .map(|m| m.as_ref().display().to_string())
            .collect();
        CheckResult::fail(
            "dependency-manifest",
            format!("none of {} found", wanted.join(", ")),
        )
    } else {
        CheckResult::pass("dependency-manifest", found.join(", "))
    }
}
