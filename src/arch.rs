//! Host architecture detection
//!
//! The Procfile fixture declares one process per CPU architecture, and the build
//! is told which one to make the default. This keeps the same suite runnable on
//! amd64 and arm64 hosts.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArchError {
    #[error("No default process is mapped for architecture '{0}'. Pass --default-process to choose one")]
    Unsupported(String),
}

/// CPU architecture, named the way container platforms name it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
    Other(String),
}

impl Architecture {
    /// Architecture of the machine running the suite.
    pub fn host() -> Self {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    /// Maps a Rust target architecture (`x86_64`, `aarch64`, ...) to its
    /// container platform name.
    pub fn from_rust_arch(arch: &str) -> Self {
        match arch {
            "x86_64" | "amd64" => Architecture::Amd64,
            "aarch64" | "arm64" => Architecture::Arm64,
            other => Architecture::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
            Architecture::Other(name) => name,
        }
    }

    /// Procfile process type to pass as `--default-process`.
    pub fn default_process(&self) -> Result<&'static str, ArchError> {
        match self {
            Architecture::Amd64 => Ok("amd64-process"),
            Architecture::Arm64 => Ok("arm64-process"),
            Architecture::Other(name) => Err(ArchError::Unsupported(name.clone())),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Picks the default process for a scenario.
///
/// An explicit override wins; otherwise the architecture lookup decides.
pub fn select_default_process(
    arch: &Architecture,
    override_process: Option<&str>,
) -> Result<String, ArchError> {
    info!(
        arch = %arch,
        "Running on {} architecture",
        arch.name().to_uppercase()
    );

    if let Some(process) = override_process {
        return Ok(process.to_string());
    }

    arch.default_process().map(str::to_string)
}
