// Container engine: capability probing, container spec and argument building.

pub mod commands;
pub mod probe;
mod spec;
mod types;

pub use commands::{RunMode, build_run_args};
pub use probe::{detect_engine, detect_gpu, detect_gpu_exposure_mode, probe};
pub use spec::{ContainerSpec, Mount, ResourceLimits};
pub use types::{EngineInfo, EngineKind, GpuExposure, GpuInfo, RuntimeEnvironment};
