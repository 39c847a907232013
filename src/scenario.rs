//! Build-run-verify-cleanup scenarios
//!
//! A scenario copies its fixture, builds an image from it, starts one container,
//! waits for the container to answer, and checks the build output. Everything it
//! allocates along the way is tracked in [`ScenarioResources`] and released
//! exactly once when the scenario body finishes, fails, or panics.

use crate::arch::{select_default_process, ArchError, Architecture};
use crate::assertion::{AssertionFailure, BuildLogs, LogAssertion};
use crate::config::{BuildpackReference, SmokeConfig};
use crate::docker::{ContainerRuntime, DockerRuntime, RunSpec, RuntimeError};
use crate::fixture::{self, FixtureError};
use crate::naming::{cache_volume_names, random_name};
use crate::pack::{BuildError, BuildRequest, ImageBuilder, PackCli};
use crate::readiness::{wait_until_ready, HttpCheck, NotReady, ReadinessCheck};
use crate::report::{CleanupError, CleanupStep, FailureKind, FailureReport, ScenarioReport};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Port the fixture application listens on inside the container
pub const APP_PORT: u16 = 8080;

/// Line the Procfile buildpack prints while building
pub const PROCFILE_MARKER: &str = "Paketo Buildpack for Procfile";

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Architecture(#[from] ArchError),

    #[error("Failed to prepare fixture: {0}")]
    Fixture(#[from] FixtureError),

    #[error("Build failed: {source}")]
    Build { source: BuildError, logs: BuildLogs },

    #[error("Failed to run container: {0}")]
    Run(#[from] RuntimeError),

    #[error("Container was not reachable within {timeout:?} ({attempts} polls)")]
    NotReady { timeout: Duration, attempts: u32 },

    #[error("Build logs have no line containing '{expected}'")]
    Assertion { expected: String, logs: BuildLogs },

    #[error("Scenario panicked: {0}")]
    Panicked(String),
}

impl ScenarioError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ScenarioError::Architecture(_) => FailureKind::Architecture,
            ScenarioError::Fixture(_) => FailureKind::Fixture,
            ScenarioError::Build { .. } => FailureKind::Build,
            ScenarioError::Run(_) => FailureKind::Run,
            ScenarioError::NotReady { .. } => FailureKind::NotReady,
            ScenarioError::Assertion { .. } => FailureKind::Assertion,
            ScenarioError::Panicked(_) => FailureKind::Panic,
        }
    }

    /// Build output relevant to the failure, if any was captured.
    pub fn logs(&self) -> Option<&BuildLogs> {
        match self {
            ScenarioError::Build { logs, .. } | ScenarioError::Assertion { logs, .. } => {
                Some(logs).filter(|l| !l.is_empty())
            }
            _ => None,
        }
    }

    fn to_report(&self) -> FailureReport {
        FailureReport {
            kind: self.kind(),
            message: self.to_string(),
            logs: self.logs().map(|l| l.as_str().to_string()),
        }
    }
}

impl From<BuildError> for ScenarioError {
    fn from(source: BuildError) -> Self {
        let logs = source.logs().cloned().unwrap_or_default();
        ScenarioError::Build { source, logs }
    }
}

impl From<NotReady> for ScenarioError {
    fn from(err: NotReady) -> Self {
        ScenarioError::NotReady {
            timeout: err.timeout,
            attempts: err.attempts,
        }
    }
}

impl From<AssertionFailure> for ScenarioError {
    fn from(failure: AssertionFailure) -> Self {
        ScenarioError::Assertion {
            expected: failure.expected,
            logs: failure.logs,
        }
    }
}

/// Everything a running scenario has allocated
///
/// Each scenario owns one of these exclusively. Handles are recorded as soon as
/// the underlying resource may exist, and [`release`](Self::release) consumes
/// the set so teardown cannot run twice.
#[derive(Debug)]
pub struct ScenarioResources {
    name: String,
    source: Option<PathBuf>,
    volumes: Vec<String>,
    image: Option<String>,
    container: Option<String>,
    released: bool,
}

impl ScenarioResources {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            volumes: Vec::new(),
            image: None,
            container: None,
            released: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn volumes(&self) -> &[String] {
        &self.volumes
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    pub fn track_source(&mut self, path: PathBuf) {
        self.source = Some(path);
    }

    pub fn track_volumes(&mut self, names: Vec<String>) {
        self.volumes = names;
    }

    pub fn track_image(&mut self, id: impl Into<String>) {
        self.image = Some(id.into());
    }

    pub fn track_container(&mut self, id: impl Into<String>) {
        self.container = Some(id.into());
    }

    fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.volumes.is_empty()
            && self.image.is_none()
            && self.container.is_none()
    }

    /// Tears down container, cache volumes, image and source copy, in that order.
    ///
    /// Every step runs even if an earlier one failed; failures come back as
    /// annotations. Resources that were never acquired are skipped.
    pub async fn release(mut self, runtime: &dyn ContainerRuntime) -> Vec<CleanupError> {
        self.released = true;
        let mut errors = Vec::new();

        if let Some(id) = self.container.take() {
            if let Err(e) = runtime.remove_container(&id).await {
                errors.push(cleanup_error(CleanupStep::Container, id, e));
            }
        }

        let volumes = std::mem::take(&mut self.volumes);
        if !volumes.is_empty() {
            if let Err(e) = runtime.remove_volumes(&volumes).await {
                errors.push(cleanup_error(CleanupStep::Volumes, volumes.join(", "), e));
            }
        }

        if let Some(id) = self.image.take() {
            if let Err(e) = runtime.remove_image(&id).await {
                errors.push(cleanup_error(CleanupStep::Image, id, e));
            }
        }

        if let Some(path) = self.source.take() {
            if let Err(e) = fixture::remove_source(&path) {
                errors.push(cleanup_error(
                    CleanupStep::Source,
                    path.display().to_string(),
                    e,
                ));
            }
        }

        for e in &errors {
            warn!(scenario_resource = %self.name, "{}", e);
        }

        errors
    }
}

impl Drop for ScenarioResources {
    fn drop(&mut self) {
        if !self.released && !self.is_empty() {
            error!(
                scenario_resource = %self.name,
                "Scenario resources dropped without cleanup"
            );
        }
    }
}

fn cleanup_error(step: CleanupStep, target: String, err: impl ToString) -> CleanupError {
    CleanupError {
        step,
        target,
        message: err.to_string(),
    }
}

/// What a scenario builds, how it runs it, and what it expects
#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    pub group: String,
    pub name: String,
    /// Fixture application directory, copied before every build
    pub fixture: PathBuf,
    pub buildpacks: Vec<BuildpackReference>,
    pub run: RunSpec,
    pub assertions: Vec<LogAssertion>,
}

impl ScenarioSpec {
    /// Builds the Procfile fixture with the Procfile buildpack and expects the
    /// buildpack's banner in the build output.
    pub fn procfile(config: &SmokeConfig) -> Self {
        Self {
            group: "Procfile".to_string(),
            name: "builds Procfile app successfully".to_string(),
            fixture: config.fixtures_dir.join("procfile"),
            buildpacks: vec![config.buildpacks.procfile.clone()],
            run: RunSpec::default()
                .with_env("PORT", APP_PORT.to_string())
                .with_publish(APP_PORT),
            assertions: vec![LogAssertion::contains_line(PROCFILE_MARKER)],
        }
    }

    pub fn title(&self) -> String {
        format!("{} {}", self.group, self.name)
    }
}

/// Failure to wire up the local toolchain
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// The three ports a scenario drives
#[derive(Clone)]
pub struct Toolchain {
    pub builder: Arc<dyn ImageBuilder>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub check: Arc<dyn ReadinessCheck>,
}

impl Toolchain {
    pub fn new(
        builder: Arc<dyn ImageBuilder>,
        runtime: Arc<dyn ContainerRuntime>,
        check: Arc<dyn ReadinessCheck>,
    ) -> Self {
        Self {
            builder,
            runtime,
            check,
        }
    }

    /// `pack` against the local Docker daemon, checked over HTTP.
    pub fn local() -> Result<Self, ToolchainError> {
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect()?);
        let builder = PackCli::new(Arc::clone(&runtime))
            .with_verbose()
            .with_no_color();

        Ok(Self {
            builder: Arc::new(builder),
            runtime,
            check: Arc::new(HttpCheck::for_port(APP_PORT)?),
        })
    }
}

pub struct Scenario {
    spec: ScenarioSpec,
    config: Arc<SmokeConfig>,
    toolchain: Toolchain,
    arch: Architecture,
}

impl Scenario {
    pub fn new(spec: ScenarioSpec, config: Arc<SmokeConfig>, toolchain: Toolchain) -> Self {
        Self {
            spec,
            config,
            toolchain,
            arch: Architecture::host(),
        }
    }

    /// Overrides the detected host architecture.
    pub fn with_architecture(mut self, arch: Architecture) -> Self {
        self.arch = arch;
        self
    }

    pub fn title(&self) -> String {
        self.spec.title()
    }

    /// Runs the scenario to completion and reports the verdict.
    ///
    /// Never fails: build, run, readiness and assertion errors, panics in the
    /// scenario body, and cleanup errors all end up in the report.
    pub async fn run(self) -> ScenarioReport {
        let started = Instant::now();
        let title = self.title();
        let resources = ScenarioResources::new(random_name());
        let resource_name = resources.name().to_string();
        let span = info_span!("scenario", scenario = %title, resource = %resource_name);

        async move {
            let mut resources = resources;
            info!("Starting scenario");

            let outcome = AssertUnwindSafe(self.execute(&mut resources))
                .catch_unwind()
                .await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(payload) => Some(ScenarioError::Panicked(panic_message(payload.as_ref()))),
            };

            let cleanup_errors = resources.release(self.toolchain.runtime.as_ref()).await;

            if let Some(e) = &failure {
                error!(kind = %e.kind(), "Scenario failed: {}", e);
            }

            let report = ScenarioReport::new(
                title,
                resource_name,
                failure.as_ref().map(ScenarioError::to_report),
                cleanup_errors,
                started.elapsed().as_millis() as u64,
            );
            info!(verdict = ?report.verdict, duration_ms = report.duration_ms, "Scenario finished");
            report
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, resources: &mut ScenarioResources) -> Result<(), ScenarioError> {
        let process = select_default_process(&self.arch, self.config.default_process.as_deref())?;

        let source = fixture::copy_to_temp(&self.spec.fixture)?;
        resources.track_source(source.clone());

        // pack may create cache volumes before a build fails
        resources.track_volumes(cache_volume_names(resources.name()));

        let request = BuildRequest {
            name: resources.name().to_string(),
            source,
            builder: self.config.builder.clone(),
            buildpacks: self.spec.buildpacks.clone(),
            extra_args: vec!["--default-process".to_string(), process],
        };

        let outcome = match self.toolchain.builder.build(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let BuildError::ImageLookup { name, .. } = &e {
                    resources.track_image(name.clone());
                }
                return Err(e.into());
            }
        };
        resources.track_image(outcome.image.id.clone());
        debug!(image = %outcome.image.id, "Image tracked for cleanup");

        let container = match self.toolchain.runtime.run(&outcome.image, &self.spec.run).await {
            Ok(container) => container,
            Err(e) => {
                if let Some(id) = e.container_id() {
                    resources.track_container(id);
                }
                return Err(e.into());
            }
        };
        resources.track_container(container.id.clone());

        let ready = wait_until_ready(
            self.toolchain.check.as_ref(),
            &container,
            self.config.readiness_timeout,
            self.config.poll_interval,
        )
        .await?;
        info!(attempts = ready.attempts, elapsed = ?ready.elapsed, "Container reachable");

        for assertion in &self.spec.assertions {
            assertion.evaluate(&outcome.logs)?;
        }

        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
