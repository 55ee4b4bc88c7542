//! gpuctl - lifecycle manager for a GPU-accelerated workload container.
//!
//! The crate probes which container engine (Podman or Docker) and which
//! GPU-exposure mechanism (CDI, label-disable fallback, or none) the host
//! offers, builds a deterministic engine invocation from that, and keeps the
//! single named container consistent across repeated invocations.
//!
//! # Modules
//!
//! - [`config`] - defaults, `.gpuctl.yaml` and environment overrides
//! - [`host`] - subprocess seam used by everything that talks to the machine
//! - [`engine`] - capability probe, container spec and argument builders
//! - [`lifecycle`] - build/run/start/exec/stop/setup-cdi state machine
//! - [`pipeline`] - read-only repository and host validation
//! - [`error`] - error taxonomy

pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod pipeline;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
