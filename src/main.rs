mod cli;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gpuctl::config::{self, Config};
use gpuctl::host::SystemHost;
use gpuctl::lifecycle::{LifecycleManager, StartOutcome, StatusReport};
use gpuctl::pipeline::{self, CheckResult, CheckStatus, PipelineInput, ValidationReport};

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("✗ {e:#}");
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` wins; otherwise `-v` steps up from warnings. Logs go to stderr.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli, work_dir: &std::path::Path) -> Result<Config> {
    let mut cfg = config::load(work_dir)?;
    cfg.apply_env(|key| std::env::var(key).ok());
    if let Some(engine) = &cli.engine {
        cfg.engines = vec![engine.clone()];
    }
    debug!(?cfg, "effective configuration");
    Ok(cfg)
}

fn run(cli: Cli) -> Result<i32> {
    let work_dir = match &cli.dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let work_dir: PathBuf = std::fs::canonicalize(&work_dir)
        .with_context(|| format!("work directory {} is not accessible", work_dir.display()))?;

    let cfg = load_config(&cli, &work_dir)?;
    let host = SystemHost::new(Duration::from_secs(cfg.probe_timeout));
    let manager = LifecycleManager::new(&host, &cfg, &work_dir);

    match cli.command {
        Commands::Build => {
            manager.build()?;
            ok(&format!("built {}", cfg.image));
            Ok(0)
        }
        Commands::Run => Ok(manager.run()?),
        Commands::Start => {
            match manager.start()? {
                StartOutcome::Started => ok(&format!("{} running", cfg.container_name)),
                StartOutcome::AlreadyRunning => {
                    warn(&format!("{} was already running", cfg.container_name))
                }
            }
            Ok(0)
        }
        Commands::Exec { command } => Ok(manager.exec(&command)?),
        Commands::Stop => {
            manager.stop()?;
            ok(&format!("{} removed", cfg.container_name));
            Ok(0)
        }
        Commands::SetupCdi => {
            manager.setup_cdi()?;
            ok("CDI advertises nvidia.com/gpu");
            Ok(0)
        }
        Commands::Status { json } => {
            let report = manager.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_status(&report);
            }
            Ok(0)
        }
        Commands::Validate { json } => {
            let input = PipelineInput {
                config: cfg.clone(),
                work_dir,
            };
            let report = pipeline::run_pipeline(&input, &host, |check| {
                if !json {
                    print_check(check);
                }
            });
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report);
            }
            pipeline::ensure_passed(&report)?;
            Ok(0)
        }
    }
}

fn ok(message: &str) {
    println!("✓ {message}");
}

fn warn(message: &str) {
    println!("⚠ {message}");
}

fn key_value(label: &str, value: impl std::fmt::Display) {
    println!("{label:<14} {value}");
}

fn print_status(report: &StatusReport) {
    let env = &report.environment;
    key_value(
        "engine",
        format!("{} {} ({})", env.engine.kind.as_str(), env.engine.version, env.engine.binary),
    );
    key_value("gpu", env.gpu_name());
    key_value("exposure", env.exposure);
    key_value("container", &report.container);
    key_value("state", report.state);
}

fn print_check(check: &CheckResult) {
    let mark = match check.status {
        CheckStatus::Pass => "✓",
        CheckStatus::Warn => "⚠",
        CheckStatus::Fail => "✗",
    };
    println!("{mark} {:<28} {}", check.name, check.message);
}

fn print_summary(report: &ValidationReport) {
    let s = &report.summary;
    println!();
    println!(
        "{} checks: {} passed, {} warned, {} failed ({})",
        s.total, s.passed, s.warned, s.failed, report.status
    );
}
