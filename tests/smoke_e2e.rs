//! End-to-end smoke run against a real builder
//!
//! Needs `pack` on the PATH and a Docker daemon. Trials are registered but
//! ignored unless `SMOKEPACK_BUILDER` names the builder to test.

use anyhow::{bail, Context, Result};
use libtest_mimic::{Arguments, Trial};
use smokepack::{Scenario, ScenarioSpec, SmokeConfig, Toolchain};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type SpecFn = fn(&SmokeConfig) -> ScenarioSpec;

fn main() {
    let args = Arguments::from_args();
    let builder = env::var("SMOKEPACK_BUILDER").ok();
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

    let scenarios: Vec<(&str, SpecFn)> = vec![("buildpackless::procfile", ScenarioSpec::procfile)];

    let tests = scenarios
        .into_iter()
        .map(|(name, spec)| {
            let builder = builder.clone();
            let manifest_dir = manifest_dir.clone();
            let ignored = builder.is_none();

            Trial::test(name, move || {
                let builder = builder.unwrap_or_default();
                run_trial(&builder, &manifest_dir, spec)
                    .map_err(|e| libtest_mimic::Failed::from(format!("{:#}", e)))
            })
            .with_ignored_flag(ignored)
        })
        .collect();

    libtest_mimic::run(&args, tests).exit();
}

fn run_trial(builder: &str, manifest_dir: &Path, spec: SpecFn) -> Result<()> {
    let config = SmokeConfig::load(builder, &manifest_dir.join("smoke.json"))
        .context("Failed to load smoke configuration")?
        .with_fixtures_dir(manifest_dir.join("smoke").join("testdata"));
    let config = Arc::new(config);

    let toolchain = Toolchain::local().context("Failed to connect to Docker")?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let report = runtime.block_on(async {
        let spec = spec(&config);
        Scenario::new(spec, config, toolchain).run().await
    });

    if !report.passed() {
        bail!(
            "{} failed:\n{}",
            report.scenario,
            serde_json::to_string_pretty(&report)?
        );
    }

    Ok(())
}
