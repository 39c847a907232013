//! Image build port and the `pack` CLI adapter

use crate::assertion::BuildLogs;
use crate::config::{BuilderIdentity, BuildpackReference};
use crate::docker::{ContainerRuntime, Image, RuntimeError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to launch {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Build exited with {}", describe_status(.status))]
    Failed {
        status: Option<i32>,
        logs: BuildLogs,
    },

    #[error("Built image {name} could not be inspected: {source}")]
    ImageLookup {
        name: String,
        #[source]
        source: RuntimeError,
        logs: BuildLogs,
    },
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl BuildError {
    /// Captured build output, when the build got far enough to produce any.
    pub fn logs(&self) -> Option<&BuildLogs> {
        match self {
            BuildError::Spawn { .. } => None,
            BuildError::Failed { logs, .. } | BuildError::ImageLookup { logs, .. } => Some(logs),
        }
    }
}

/// One build invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Image name, also the basis for cache volume names
    pub name: String,
    pub source: PathBuf,
    pub builder: BuilderIdentity,
    pub buildpacks: Vec<BuildpackReference>,
    /// Passed through to the build tool verbatim
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub image: Image,
    pub logs: BuildLogs,
}

#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, BuildError>;
}

/// Runs `pack build` and resolves the resulting image ID through the runtime
pub struct PackCli {
    binary: String,
    verbose: bool,
    no_color: bool,
    runtime: Arc<dyn ContainerRuntime>,
}

impl PackCli {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            binary: "pack".to_string(),
            verbose: false,
            no_color: false,
            runtime,
        }
    }

    /// Use a `pack` binary other than the one on `PATH`.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub fn with_no_color(mut self) -> Self {
        self.no_color = true;
        self
    }

    /// Command-line arguments for a request, without the binary.
    pub fn args(&self, request: &BuildRequest) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            request.name.clone(),
            "--path".to_string(),
            request.source.to_string_lossy().into_owned(),
            "--builder".to_string(),
            request.builder.to_string(),
        ];

        for buildpack in &request.buildpacks {
            args.push("--buildpack".to_string());
            args.push(buildpack.to_string());
        }

        if self.verbose {
            args.push("--verbose".to_string());
        }
        if self.no_color {
            args.push("--no-color".to_string());
        }

        args.extend(request.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl ImageBuilder for PackCli {
    async fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, BuildError> {
        let start = Instant::now();
        let args = self.args(request);
        debug!(binary = %self.binary, ?args, "Invoking build tool");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| BuildError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let logs = BuildLogs::from_output(&output.stdout, &output.stderr);

        if !output.status.success() {
            return Err(BuildError::Failed {
                status: output.status.code(),
                logs,
            });
        }

        let image = match self.runtime.inspect_image(&request.name).await {
            Ok(image) => image,
            Err(source) => {
                return Err(BuildError::ImageLookup {
                    name: request.name.clone(),
                    source,
                    logs,
                })
            }
        };

        info!(
            image = %image.id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Image built"
        );

        Ok(BuildOutcome { image, logs })
    }
}
