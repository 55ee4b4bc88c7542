use std::path::Path;

use super::spec::ContainerSpec;
use super::types::{EngineKind, GpuExposure, RuntimeEnvironment};

/// CDI device name requested in `cdi` mode.
pub const CDI_GPU_DEVICE: &str = "nvidia.com/gpu=all";
/// `--security-opt` value that turns off SELinux labelling.
pub const LABEL_DISABLE: &str = "label=disable";
/// OCI hooks directory used by nvidia-container-toolkit under Podman.
pub const PODMAN_HOOKS_DIR: &str = "/usr/share/containers/oci/hooks.d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Pseudo-terminal, removed on exit, attached to the caller.
    Interactive,
    /// Detached and kept alive for later `exec` calls.
    Background,
}

/// Build the full `run` argument list for the engine.
///
/// The order is fixed: mode flags, name, device, privilege, network,
/// shared memory, environment, mounts, image, trailing command. Identical
/// inputs always produce identical output.
pub fn build_run_args(
    spec: &ContainerSpec,
    environment: &RuntimeEnvironment,
    mode: RunMode,
) -> Vec<String> {
    let mut args = vec!["run".to_string()];

    match mode {
        RunMode::Interactive => args.extend(["-it".to_string(), "--rm".to_string()]),
        RunMode::Background => args.push("-d".to_string()),
    }

    args.extend(["--name".to_string(), spec.name.clone()]);
    args.extend(device_args(environment.engine.kind, environment.exposure));

    if spec.limits.privileged {
        args.push("--privileged".to_string());
    }
    args.extend(["--network".to_string(), spec.limits.network.clone()]);
    args.extend([
        "--shm-size".to_string(),
        spec.limits.shm_size.as_str().to_string(),
    ]);

    for (key, value) in &spec.env {
        args.extend(["-e".to_string(), format!("{key}={value}")]);
    }
    for mount in &spec.mounts {
        args.extend([
            "-v".to_string(),
            format!("{}:{}:rw", mount.host.display(), mount.container.display()),
        ]);
    }

    args.push(spec.image.clone());
    match mode {
        RunMode::Interactive => args.extend(spec.interactive_command.iter().cloned()),
        RunMode::Background => args.extend(spec.background_command.iter().cloned()),
    }
    args
}

/// The interactive argument list with `create` in place of `run`, so the
/// container can be claimed under the name lock and attached afterwards
/// with [`start_attached_args`].
pub fn build_create_args(spec: &ContainerSpec, environment: &RuntimeEnvironment) -> Vec<String> {
    let mut args = build_run_args(spec, environment, RunMode::Interactive);
    args[0] = "create".to_string();
    args
}

/// Attach the caller's terminal to a created container until it exits.
pub fn start_attached_args(name: &str) -> Vec<String> {
    vec!["start".to_string(), "-ai".to_string(), name.to_string()]
}

/// Device arguments for a given engine and exposure mode.
///
/// `cdi` and `legacy-label` never share an argument.
pub fn device_args(engine: EngineKind, exposure: GpuExposure) -> Vec<String> {
    match exposure {
        GpuExposure::Cdi => vec!["--device".into(), CDI_GPU_DEVICE.into()],
        GpuExposure::LegacyLabel => {
            let mut args: Vec<String> = vec!["--security-opt".into(), LABEL_DISABLE.into()];
            match engine {
                EngineKind::Podman => args.extend(["--hooks-dir".into(), PODMAN_HOOKS_DIR.into()]),
                EngineKind::Docker => args.extend(["--gpus".into(), "all".into()]),
            }
            args
        }
        GpuExposure::Unsupported => Vec::new(),
    }
}

/// Build an image from the containerfile.
pub fn build_image_args(
    image: &str,
    containerfile: &Path,
    target: Option<&str>,
    context: &Path,
) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        "-t".to_string(),
        image.to_string(),
        "-f".to_string(),
        containerfile.display().to_string(),
    ];
    if let Some(target) = target {
        args.extend(["--target".to_string(), target.to_string()]);
    }
    args.push(context.display().to_string());
    args
}

/// Run `command` inside a running container. A pseudo-terminal is only
/// requested when `tty` is set, since engines reject `-t` on piped stdin.
pub fn exec_args(name: &str, command: &[String], tty: bool) -> Vec<String> {
    let flags = if tty { "-it" } else { "-i" };
    let mut args = vec!["exec".to_string(), flags.to_string(), name.to_string()];
    args.extend(command.iter().cloned());
    args
}

pub fn inspect_state_args(name: &str) -> Vec<String> {
    vec![
        "container".to_string(),
        "inspect".to_string(),
        "--format".to_string(),
        "{{.State.Status}}".to_string(),
        name.to_string(),
    ]
}

pub fn stop_args(name: &str) -> Vec<String> {
    vec!["stop".to_string(), name.to_string()]
}

pub fn remove_args(name: &str) -> Vec<String> {
    vec!["rm".to_string(), "-f".to_string(), name.to_string()]
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::Config;
    use crate::engine::types::{EngineInfo, GpuInfo};

    fn environment(kind: EngineKind, exposure: GpuExposure) -> RuntimeEnvironment {
        RuntimeEnvironment {
            engine: EngineInfo {
                kind,
                binary: kind.as_str().into(),
                version: "1.0".into(),
            },
            gpu: exposure.has_gpu().then(|| GpuInfo {
                name: "NVIDIA A100".into(),
            }),
            exposure,
        }
    }

    fn spec_for(environment: &RuntimeEnvironment) -> ContainerSpec {
        let mut cfg = Config::default();
        cfg.dataset_dir = "/tmp/d".into();
        cfg.experiments_dir = "/tmp/e".into();
        ContainerSpec::from_config(&cfg, environment, Path::new("/work"))
    }

    fn position(args: &[String], needle: &str) -> usize {
        args.iter()
            .position(|a| a == needle)
            .unwrap_or_else(|| panic!("`{needle}` missing from {args:?}"))
    }

    #[test]
    fn identical_inputs_give_identical_args() {
        for kind in [EngineKind::Podman, EngineKind::Docker] {
            for exposure in [
                GpuExposure::Cdi,
                GpuExposure::LegacyLabel,
                GpuExposure::Unsupported,
            ] {
                let env = environment(kind, exposure);
                let spec = spec_for(&env);
                let first = build_run_args(&spec, &env, RunMode::Interactive);
                let second = build_run_args(&spec.clone(), &env.clone(), RunMode::Interactive);
                assert_eq!(first, second);
            }
        }
    }

    #[test]
    fn cdi_and_legacy_label_are_mutually_exclusive() {
        for kind in [EngineKind::Podman, EngineKind::Docker] {
            let env = environment(kind, GpuExposure::Cdi);
            let args = build_run_args(&spec_for(&env), &env, RunMode::Background);
            assert!(args.contains(&CDI_GPU_DEVICE.to_string()));
            assert!(!args.contains(&LABEL_DISABLE.to_string()));

            let env = environment(kind, GpuExposure::LegacyLabel);
            let args = build_run_args(&spec_for(&env), &env, RunMode::Background);
            assert!(args.contains(&LABEL_DISABLE.to_string()));
            assert!(!args.contains(&CDI_GPU_DEVICE.to_string()));
            assert!(!args.contains(&"--device".to_string()));
        }
    }

    #[test]
    fn legacy_label_uses_engine_specific_hook() {
        assert!(device_args(EngineKind::Podman, GpuExposure::LegacyLabel)
            .contains(&PODMAN_HOOKS_DIR.to_string()));
        assert!(device_args(EngineKind::Docker, GpuExposure::LegacyLabel)
            .contains(&"--gpus".to_string()));
    }

    #[test]
    fn cpu_only_interactive_run() {
        let env = environment(EngineKind::Podman, GpuExposure::Unsupported);
        let args = build_run_args(&spec_for(&env), &env, RunMode::Interactive);

        assert!(!args.contains(&"--device".to_string()));
        assert!(!args.contains(&"--gpus".to_string()));
        assert!(!args.contains(&LABEL_DISABLE.to_string()));
        assert_eq!(args[position(&args, "--shm-size") + 1], "12g");
        assert!(args.contains(&"/tmp/d:/workspace/datasets:rw".to_string()));
        assert!(args.contains(&"/tmp/e:/workspace/experiments:rw".to_string()));
        assert_eq!(&args[..4], ["run", "-it", "--rm", "--name"]);
        assert_eq!(args.last().map(String::as_str), Some("bash"));
    }

    #[test]
    fn canonical_order_is_fixed() {
        let env = environment(EngineKind::Docker, GpuExposure::Cdi);
        let mut spec = spec_for(&env);
        spec.limits.privileged = true;
        let args = build_run_args(&spec, &env, RunMode::Background);

        let name = position(&args, "--name");
        let device = position(&args, "--device");
        let privileged = position(&args, "--privileged");
        let network = position(&args, "--network");
        let shm = position(&args, "--shm-size");
        let env_flag = position(&args, "-e");
        let mount = position(&args, "-v");
        let image = position(&args, &spec.image);

        assert!(name < device);
        assert!(device < privileged);
        assert!(privileged < network);
        assert!(network < shm);
        assert!(shm < env_flag);
        assert!(env_flag < mount);
        assert!(mount < image);
        assert_eq!(&args[image + 1..], ["sleep", "infinity"]);
        assert_eq!(args[1], "-d");
        assert!(!args.contains(&"--rm".to_string()));
    }

    #[test]
    fn env_vars_are_sorted_by_key() {
        let env = environment(EngineKind::Podman, GpuExposure::Cdi);
        let args = build_run_args(&spec_for(&env), &env, RunMode::Background);
        let vars: Vec<&String> = args
            .windows(2)
            .filter(|w| w[0] == "-e")
            .map(|w| &w[1])
            .collect();
        let mut sorted = vars.clone();
        sorted.sort();
        assert_eq!(vars, sorted);
    }

    #[test]
    fn build_args_include_optional_target() {
        let args = build_image_args(
            "img:1",
            &PathBuf::from("Containerfile"),
            Some("runtime"),
            Path::new("."),
        );
        assert_eq!(
            args,
            ["build", "-t", "img:1", "-f", "Containerfile", "--target", "runtime", "."]
        );

        let args = build_image_args("img:1", Path::new("Dockerfile"), None, Path::new("ctx"));
        assert!(!args.contains(&"--target".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("ctx"));
    }

    #[test]
    fn exec_args_append_command() {
        let args = exec_args("box", &["python".into(), "train.py".into()], true);
        assert_eq!(args, ["exec", "-it", "box", "python", "train.py"]);
    }

    #[test]
    fn exec_without_terminal_skips_tty_flag() {
        let args = exec_args("box", &["nvidia-smi".into()], false);
        assert_eq!(args, ["exec", "-i", "box", "nvidia-smi"]);
    }

    #[test]
    fn create_args_mirror_interactive_run() {
        let env = environment(EngineKind::Podman, GpuExposure::Cdi);
        let spec = spec_for(&env);
        let run = build_run_args(&spec, &env, RunMode::Interactive);
        let create = build_create_args(&spec, &env);

        assert_eq!(create[0], "create");
        assert_eq!(&create[1..], &run[1..]);
        assert_eq!(start_attached_args("box"), ["start", "-ai", "box"]);
    }
}
