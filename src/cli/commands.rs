use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ConfigError, SmokeConfig, DEFAULT_DESCRIPTOR_PATH, MAX_READINESS_TIMEOUT_SECS};

/// Smallest `--timeout` that still fits one default-interval poll
const MIN_CLI_TIMEOUT_SECS: u64 = 2;

/// Smoke tests for buildpacks against a builder
#[derive(Parser, Debug)]
#[command(
    name = "smokepack",
    about = "Smoke tests for buildpacks against a builder",
    version,
    author,
    long_about = "smokepack builds fixture applications with a builder and the buildpacks \
                  listed in the descriptor, runs each resulting image, waits until it \
                  answers over HTTP, and checks the build output. Every image, container, \
                  cache volume and source copy it creates is removed afterwards.\n\n\
                  Examples:\n  \
                  smokepack --name paketobuildpacks/builder-jammy-buildpackless-base\n  \
                  smokepack --name my-builder --descriptor smoke.json --format json\n  \
                  smokepack --name my-builder --default-process web --timeout 120"
)]
pub struct CliArgs {
    #[arg(long, value_name = "BUILDER", help = "Builder image to test against")]
    pub name: String,

    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_DESCRIPTOR_PATH,
        help = "Buildpack descriptor file"
    )]
    pub descriptor: PathBuf,

    #[arg(
        long,
        value_name = "DIR",
        help = "Fixture applications directory (defaults to smoke/testdata)"
    )]
    pub fixtures: Option<PathBuf>,

    #[arg(
        long,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(MIN_CLI_TIMEOUT_SECS..=MAX_READINESS_TIMEOUT_SECS),
        help = "Readiness timeout in seconds (defaults to 60)"
    )]
    pub timeout: Option<u64>,

    #[arg(
        long,
        value_name = "PROCESS",
        help = "Default process type, overriding the architecture-derived one"
    )]
    pub default_process: Option<String>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Report format"
    )]
    pub format: OutputFormatArg,

    #[arg(long, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, help = "Verbose logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        conflicts_with = "verbose",
        help = "Quiet mode - only errors are logged"
    )]
    pub quiet: bool,
}

impl CliArgs {
    /// Loads the configuration and layers the command-line overrides on top.
    ///
    /// Validation runs once, after every layer has been applied.
    pub fn load_config(&self) -> Result<SmokeConfig, ConfigError> {
        let mut config = SmokeConfig::from_sources(&self.name, &self.descriptor)?;

        if let Some(ref dir) = self.fixtures {
            config = config.with_fixtures_dir(dir);
        }
        if let Some(secs) = self.timeout {
            config = config.with_readiness_timeout(Duration::from_secs(secs));
        }
        if let Some(ref process) = self.default_process {
            config = config.with_default_process(process);
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
