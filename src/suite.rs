//! Concurrent suite execution

use crate::arch::Architecture;
use crate::config::SmokeConfig;
use crate::report::{FailureKind, FailureReport, ScenarioReport, SuiteReport};
use crate::scenario::{Scenario, ScenarioSpec, Toolchain};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{error, info};

pub const BUILDPACKLESS_SUITE: &str = "Buildpackless Smoke";

/// A named set of independent scenarios sharing one configuration
pub struct Suite {
    name: String,
    config: Arc<SmokeConfig>,
    toolchain: Toolchain,
    arch: Option<Architecture>,
    specs: Vec<ScenarioSpec>,
}

impl Suite {
    pub fn new(name: impl Into<String>, config: Arc<SmokeConfig>, toolchain: Toolchain) -> Self {
        Self {
            name: name.into(),
            config,
            toolchain,
            arch: None,
            specs: Vec::new(),
        }
    }

    /// The buildpackless suite: a single Procfile scenario.
    pub fn buildpackless(config: Arc<SmokeConfig>, toolchain: Toolchain) -> Self {
        let procfile = ScenarioSpec::procfile(&config);
        Self::new(BUILDPACKLESS_SUITE, config, toolchain).add(procfile)
    }

    pub fn add(mut self, spec: ScenarioSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Runs every scenario as if on `arch` instead of the host.
    pub fn with_architecture(mut self, arch: Architecture) -> Self {
        self.arch = Some(arch);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Runs all scenarios concurrently and collects their reports in
    /// registration order.
    pub async fn run(self) -> SuiteReport {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(suite = %self.name, scenarios = self.specs.len(), "Starting suite");

        let mut titles = Vec::with_capacity(self.specs.len());
        let mut set = JoinSet::new();

        for (index, spec) in self.specs.into_iter().enumerate() {
            titles.push(spec.title());
            let mut scenario = Scenario::new(spec, Arc::clone(&self.config), self.toolchain.clone());
            if let Some(arch) = &self.arch {
                scenario = scenario.with_architecture(arch.clone());
            }
            set.spawn(async move { (index, scenario.run().await) });
        }

        let mut slots: Vec<Option<ScenarioReport>> = vec![None; titles.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => error!("Scenario task did not complete: {}", e),
            }
        }

        let reports = slots
            .into_iter()
            .zip(titles)
            .map(|(slot, title)| slot.unwrap_or_else(|| aborted(title)))
            .collect();

        let report = SuiteReport {
            suite: self.name,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            config: self.config.to_display_map(),
            reports,
        };
        info!(
            passed = report.passed_count(),
            failed = report.failed_count(),
            "Suite finished"
        );
        report
    }
}

fn aborted(title: String) -> ScenarioReport {
    ScenarioReport::new(
        title,
        String::new(),
        Some(FailureReport {
            kind: FailureKind::Aborted,
            message: "Scenario task was cancelled before reporting".to_string(),
            logs: None,
        }),
        Vec::new(),
        0,
    )
}
