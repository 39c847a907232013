//! In-memory stand-ins for the build tool, container runtime and readiness check.
//!
//! They record every call so tests can check ordering and cleanup without a
//! Docker daemon or a `pack` binary.

use crate::assertion::BuildLogs;
use crate::docker::{Container, ContainerRuntime, Image, RunSpec, RuntimeError};
use crate::pack::{BuildError, BuildOutcome, BuildRequest, ImageBuilder};
use crate::readiness::ReadinessCheck;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum BuildBehavior {
    Succeed(BuildLogs),
    Fail(BuildLogs),
    Panic,
}

pub struct FakeBuilder {
    behavior: BuildBehavior,
    delay: Duration,
    requests: Mutex<Vec<BuildRequest>>,
}

impl FakeBuilder {
    /// Builds succeed and print `logs`.
    pub fn succeeding(logs: impl Into<String>) -> Self {
        Self::with_behavior(BuildBehavior::Succeed(BuildLogs::new(logs)))
    }

    /// Builds exit with status 1 after printing `logs`.
    pub fn failing(logs: impl Into<String>) -> Self {
        Self::with_behavior(BuildBehavior::Fail(BuildLogs::new(logs)))
    }

    pub fn panicking() -> Self {
        Self::with_behavior(BuildBehavior::Panic)
    }

    /// Makes every build take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_behavior(behavior: BuildBehavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageBuilder for FakeBuilder {
    async fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, BuildError> {
        self.requests.lock().unwrap().push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.behavior {
            BuildBehavior::Succeed(logs) => Ok(BuildOutcome {
                image: Image {
                    id: format!("sha256:{}", request.name),
                },
                logs: logs.clone(),
            }),
            BuildBehavior::Fail(logs) => Err(BuildError::Failed {
                status: Some(1),
                logs: logs.clone(),
            }),
            BuildBehavior::Panic => panic!("fake builder exploded"),
        }
    }
}

/// A call made against [`FakeRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Run {
        image: String,
        env: BTreeMap<String, String>,
        publish: Vec<u16>,
    },
    InspectImage(String),
    RemoveContainer(String),
    RemoveVolumes(Vec<String>),
    RemoveImage(String),
}

impl RuntimeCall {
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            RuntimeCall::RemoveContainer(_) | RuntimeCall::RemoveVolumes(_) | RuntimeCall::RemoveImage(_)
        )
    }
}

#[derive(Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<RuntimeCall>>,
    next_container: AtomicU32,
    fail_create: bool,
    fail_start: bool,
    fail_remove_container: bool,
    fail_remove_volumes: bool,
    fail_remove_image: bool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// `run` fails before any container exists.
    pub fn fail_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// `run` creates a container that then fails to start.
    pub fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn fail_remove_container(mut self) -> Self {
        self.fail_remove_container = true;
        self
    }

    pub fn fail_remove_volumes(mut self) -> Self {
        self.fail_remove_volumes = true;
        self
    }

    pub fn fail_remove_image(mut self) -> Self {
        self.fail_remove_image = true;
        self
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Removal calls, in the order they were made.
    pub fn removals(&self) -> Vec<RuntimeCall> {
        self.calls().into_iter().filter(RuntimeCall::is_removal).collect()
    }

    pub fn inspected_images(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RuntimeCall::InspectImage(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RuntimeCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn removal_error(resource: &'static str, target: String) -> RuntimeError {
        RuntimeError::Remove {
            resource,
            target,
            message: "fake removal failure".to_string(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn run(&self, image: &Image, spec: &RunSpec) -> Result<Container, RuntimeError> {
        self.record(RuntimeCall::Run {
            image: image.id.clone(),
            env: spec.env.clone(),
            publish: spec.publish.clone(),
        });

        if self.fail_create {
            return Err(RuntimeError::Create {
                image: image.id.clone(),
                message: "fake create failure".to_string(),
            });
        }

        let id = format!(
            "fake-container-{}",
            self.next_container.fetch_add(1, Ordering::SeqCst)
        );

        if self.fail_start {
            return Err(RuntimeError::Start {
                id,
                message: "fake start failure".to_string(),
            });
        }

        Ok(Container {
            id,
            host: "127.0.0.1".to_string(),
            ports: spec
                .publish
                .iter()
                .map(|&port| (port, port.saturating_add(30000)))
                .collect(),
        })
    }

    async fn inspect_image(&self, name: &str) -> Result<Image, RuntimeError> {
        self.record(RuntimeCall::InspectImage(name.to_string()));
        Ok(Image {
            id: format!("sha256:{}", name),
        })
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::RemoveContainer(id.to_string()));
        if self.fail_remove_container {
            return Err(Self::removal_error("container", id.to_string()));
        }
        Ok(())
    }

    async fn remove_volumes(&self, names: &[String]) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::RemoveVolumes(names.to_vec()));
        if self.fail_remove_volumes {
            return Err(Self::removal_error("volumes", names.join(", ")));
        }
        Ok(())
    }

    async fn remove_image(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::RemoveImage(id.to_string()));
        if self.fail_remove_image {
            return Err(Self::removal_error("image", id.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum CheckBehavior {
    ReadyAfter(u32),
    Never,
    Panic,
}

pub struct FakeCheck {
    behavior: CheckBehavior,
    polls: AtomicU32,
}

impl FakeCheck {
    /// Available from the `polls`-th poll onwards (1 = immediately).
    pub fn ready_after(polls: u32) -> Self {
        Self::with_behavior(CheckBehavior::ReadyAfter(polls))
    }

    pub fn ready() -> Self {
        Self::ready_after(1)
    }

    pub fn never() -> Self {
        Self::with_behavior(CheckBehavior::Never)
    }

    pub fn panicking() -> Self {
        Self::with_behavior(CheckBehavior::Panic)
    }

    fn with_behavior(behavior: CheckBehavior) -> Self {
        Self {
            behavior,
            polls: AtomicU32::new(0),
        }
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadinessCheck for FakeCheck {
    async fn is_available(&self, _container: &Container) -> bool {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.behavior {
            CheckBehavior::ReadyAfter(n) => poll >= n,
            CheckBehavior::Never => false,
            CheckBehavior::Panic => panic!("fake check exploded"),
        }
    }
}
