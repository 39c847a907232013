//! Configuration management for smokepack
//!
//! A smoke run is configured from three places, in increasing precedence:
//!
//! 1. Built-in defaults
//! 2. Environment variables
//! 3. Command-line arguments
//!
//! The builder name and the buildpack descriptor are mandatory. Both are
//! checked before any scenario is scheduled, and a bad value aborts the run.
//!
//! # Environment Variables
//!
//! - `SMOKEPACK_READINESS_TIMEOUT`: Seconds to wait for a container to become reachable - default: "60"
//! - `SMOKEPACK_POLL_INTERVAL_MS`: Delay between readiness polls - default: "1000"
//! - `SMOKEPACK_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Descriptor
//!
//! The descriptor is a flat JSON record mapping logical buildpack names to
//! references the build tool can resolve:
//!
//! ```json
//! { "procfile": "paketo-buildpacks/procfile" }
//! ```
//!
//! # Example
//!
//! ```no_run
//! use smokepack::SmokeConfig;
//! use std::path::Path;
//!
//! let config = SmokeConfig::load("paketobuildpacks/builder-jammy-buildpackless-base", Path::new("smoke.json"))
//!     .expect("Invalid configuration");
//! println!("{}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Descriptor path, relative to the directory the suite is started from
pub const DEFAULT_DESCRIPTOR_PATH: &str = "smoke.json";

/// Directory holding the fixture applications
pub const DEFAULT_FIXTURES_DIR: &str = "smoke/testdata";

const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 60;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Upper bound accepted for the readiness timeout
pub const MAX_READINESS_TIMEOUT_SECS: u64 = 600;
const MIN_POLL_INTERVAL_MS: u64 = 10;
const MAX_POLL_INTERVAL_MS: u64 = 10_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Builder name missing or blank
    #[error("Builder not specified. Pass the builder image with --name <BUILDER>")]
    EmptyBuilder,

    /// Descriptor file could not be read
    #[error("Failed to read descriptor {path}: {source}")]
    DescriptorRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Descriptor file is not valid JSON or has the wrong shape
    #[error("Failed to parse descriptor {path}: {source}")]
    DescriptorParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A required buildpack entry is empty
    #[error("Descriptor field '{0}' must name a buildpack")]
    MissingBuildpack(String),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Name of the builder image every scenario builds with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BuilderIdentity(String);

impl BuilderIdentity {
    /// Rejects empty and whitespace-only names.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyBuilder);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuilderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A buildpack the build tool can resolve (registry image, URN, path or URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildpackReference(String);

impl BuildpackReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for BuildpackReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parsed `smoke.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildpackDescriptor {
    /// The Procfile buildpack under test
    pub procfile: BuildpackReference,

    /// Any other entries in the descriptor, kept for lookup by name
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl BuildpackDescriptor {
    /// Reads and parses a descriptor file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::DescriptorRead {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_json(&content).map_err(|err| match err {
            ConfigError::DescriptorParse { source, .. } => ConfigError::DescriptorParse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let descriptor: Self =
            serde_json::from_str(content).map_err(|source| ConfigError::DescriptorParse {
                path: PathBuf::new(),
                source,
            })?;

        if descriptor.procfile.is_blank() {
            return Err(ConfigError::MissingBuildpack("procfile".to_string()));
        }

        Ok(descriptor)
    }
}

/// Process-wide, read-only configuration for a smoke run
///
/// Built once before any scenario is scheduled and then shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SmokeConfig {
    /// Builder image passed to every build
    pub builder: BuilderIdentity,

    /// Buildpacks under test
    pub buildpacks: BuildpackDescriptor,

    /// Root directory of the fixture applications
    pub fixtures_dir: PathBuf,

    /// Upper bound on the readiness wait
    pub readiness_timeout: Duration,

    /// Delay between two readiness polls
    pub poll_interval: Duration,

    /// Replaces the architecture-derived default process when set
    pub default_process: Option<String>,
}

impl SmokeConfig {
    /// Loads the builder name and descriptor, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the builder name is blank, the descriptor cannot
    /// be read or parsed, or the resulting configuration fails validation.
    pub fn load(builder: &str, descriptor_path: &Path) -> Result<Self, ConfigError> {
        let config = Self::from_sources(builder, descriptor_path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load) but without validation, for callers that
    /// layer further overrides on top and validate once at the end.
    pub fn from_sources(builder: &str, descriptor_path: &Path) -> Result<Self, ConfigError> {
        let builder = BuilderIdentity::new(builder)?;
        let buildpacks = BuildpackDescriptor::from_file(descriptor_path)?;

        let mut config = Self::new(builder, buildpacks);
        config.apply_env()?;
        Ok(config)
    }

    /// Builds a configuration with default timings and no environment lookup.
    pub fn new(builder: BuilderIdentity, buildpacks: BuildpackDescriptor) -> Self {
        Self {
            builder,
            buildpacks,
            fixtures_dir: PathBuf::from(DEFAULT_FIXTURES_DIR),
            readiness_timeout: Duration::from_secs(DEFAULT_READINESS_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            default_process: None,
        }
    }

    pub fn with_fixtures_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fixtures_dir = dir.into();
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_default_process(mut self, process: impl Into<String>) -> Self {
        self.default_process = Some(process.into());
        self
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("SMOKEPACK_READINESS_TIMEOUT") {
            let secs = value.parse::<u64>().map_err(|e| ConfigError::ParseError {
                field: "SMOKEPACK_READINESS_TIMEOUT".to_string(),
                error: e.to_string(),
            })?;
            self.readiness_timeout = Duration::from_secs(secs);
        }

        if let Ok(value) = env::var("SMOKEPACK_POLL_INTERVAL_MS") {
            let millis = value.parse::<u64>().map_err(|e| ConfigError::ParseError {
                field: "SMOKEPACK_POLL_INTERVAL_MS".to_string(),
                error: e.to_string(),
            })?;
            self.poll_interval = Duration::from_millis(millis);
        }

        Ok(())
    }

    /// Validates the timing parameters
    ///
    /// Checks that the readiness timeout is between 1 second and 10 minutes,
    /// that the poll interval is between 10 ms and 10 s, and that at least one
    /// poll fits inside the timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.readiness_timeout < Duration::from_secs(1) {
            return Err(ConfigError::ValidationFailed(
                "Readiness timeout must be at least 1 second".to_string(),
            ));
        }
        if self.readiness_timeout > Duration::from_secs(MAX_READINESS_TIMEOUT_SECS) {
            return Err(ConfigError::ValidationFailed(
                "Readiness timeout cannot exceed 10 minutes".to_string(),
            ));
        }

        if self.poll_interval < Duration::from_millis(MIN_POLL_INTERVAL_MS)
            || self.poll_interval > Duration::from_millis(MAX_POLL_INTERVAL_MS)
        {
            return Err(ConfigError::ValidationFailed(format!(
                "Poll interval must be between {}ms and {}ms",
                MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS
            )));
        }
        if self.poll_interval >= self.readiness_timeout {
            return Err(ConfigError::ValidationFailed(
                "Poll interval must be shorter than the readiness timeout".to_string(),
            ));
        }

        if let Some(process) = &self.default_process {
            if process.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "Default process override cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Converts configuration to a display map for the JSON report
    pub fn to_display_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();

        map.insert("builder".to_string(), self.builder.to_string());
        map.insert("procfile".to_string(), self.buildpacks.procfile.to_string());
        map.insert(
            "fixtures_dir".to_string(),
            self.fixtures_dir.display().to_string(),
        );
        map.insert(
            "readiness_timeout_secs".to_string(),
            self.readiness_timeout.as_secs().to_string(),
        );
        map.insert(
            "poll_interval_ms".to_string(),
            self.poll_interval.as_millis().to_string(),
        );
        if let Some(ref process) = self.default_process {
            map.insert("default_process".to_string(), process.clone());
        }

        map
    }
}

impl fmt::Display for SmokeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Smokepack Configuration:")?;
        writeln!(f, "  Builder: {}", self.builder)?;
        writeln!(f, "  Procfile Buildpack: {}", self.buildpacks.procfile)?;
        writeln!(f, "  Fixtures: {}", self.fixtures_dir.display())?;
        writeln!(f, "  Readiness Timeout: {}s", self.readiness_timeout.as_secs())?;
        writeln!(f, "  Poll Interval: {}ms", self.poll_interval.as_millis())?;
        if let Some(ref process) = self.default_process {
            writeln!(f, "  Default Process: {}", process)?;
        }
        Ok(())
    }
}
