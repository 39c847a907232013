//! smokepack - smoke tests for buildpacks against a builder
//!
//! A smoke run takes a builder image and a descriptor of buildpacks, then for
//! every scenario in the suite:
//!
//! 1. copies a fixture application into a fresh temporary directory
//! 2. builds an image from it with the builder and buildpacks
//! 3. starts one container from the image with a published port
//! 4. polls the container until it answers, bounded by a timeout
//! 5. checks the build output for an expected line
//! 6. removes the container, cache volumes, image and source copy
//!
//! Scenarios run concurrently and never share resource names. Teardown runs
//! exactly once per scenario, also when a step fails or panics.
//!
//! # Ports
//!
//! The build tool, container runtime and readiness check sit behind traits
//! ([`ImageBuilder`], [`ContainerRuntime`], [`ReadinessCheck`]) with real
//! adapters ([`PackCli`], [`DockerRuntime`], [`HttpCheck`]) and in-memory
//! stand-ins in [`fakes`].
//!
//! # Example Usage
//!
//! ```no_run
//! use smokepack::{SmokeConfig, Suite, Toolchain};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SmokeConfig::load("my-builder", Path::new("smoke.json"))?;
//! let toolchain = Toolchain::local()?;
//!
//! let report = Suite::buildpackless(Arc::new(config), toolchain).run().await;
//! std::process::exit(report.exit_code());
//! # }
//! ```

pub mod arch;
pub mod assertion;
pub mod cli;
pub mod config;
pub mod docker;
pub mod fakes;
pub mod fixture;
pub mod naming;
pub mod pack;
pub mod readiness;
pub mod report;
pub mod scenario;
pub mod suite;
pub mod util;

// Re-export key types for convenient access
pub use arch::{ArchError, Architecture};
pub use assertion::{AssertionFailure, BuildLogs, LogAssertion};
pub use config::{BuilderIdentity, BuildpackDescriptor, BuildpackReference, ConfigError, SmokeConfig};
pub use docker::{Container, ContainerRuntime, DockerRuntime, Image, RunSpec, RuntimeError};
pub use pack::{BuildError, BuildOutcome, BuildRequest, ImageBuilder, PackCli};
pub use readiness::{wait_until_ready, HttpCheck, NotReady, ReadinessCheck, ReadinessState};
pub use report::{
    CleanupError, CleanupStep, FailureKind, FailureReport, ScenarioReport, SuiteReport, Verdict,
};
pub use scenario::{
    Scenario, ScenarioError, ScenarioResources, ScenarioSpec, Toolchain, ToolchainError,
};
pub use suite::Suite;
pub use util::{init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
