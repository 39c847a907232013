//! Scenario and suite results

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Why a scenario failed, one variant per failing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Architecture,
    Fixture,
    Build,
    Run,
    NotReady,
    Assertion,
    Panic,
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Architecture => "architecture",
            FailureKind::Fixture => "fixture",
            FailureKind::Build => "build",
            FailureKind::Run => "run",
            FailureKind::NotReady => "not ready",
            FailureKind::Assertion => "assertion",
            FailureKind::Panic => "panic",
            FailureKind::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub kind: FailureKind,
    pub message: String,
    /// Build output, attached when it helps explain the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

/// Teardown steps, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStep {
    Container,
    Volumes,
    Image,
    Source,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CleanupStep::Container => "container",
            CleanupStep::Volumes => "volumes",
            CleanupStep::Image => "image",
            CleanupStep::Source => "source",
        };
        f.write_str(s)
    }
}

/// A teardown step that did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupError {
    pub step: CleanupStep,
    pub target: String,
    pub message: String,
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cleanup of {} {} failed: {}", self.step, self.target, self.message)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    /// Random name the scenario's image and volumes were derived from
    pub resource_name: String,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleanup_errors: Vec<CleanupError>,
    pub duration_ms: u64,
}

impl ScenarioReport {
    /// Builds a report; the verdict is `Fail` if either a failure or any
    /// cleanup error is present.
    pub fn new(
        scenario: impl Into<String>,
        resource_name: impl Into<String>,
        failure: Option<FailureReport>,
        cleanup_errors: Vec<CleanupError>,
        duration_ms: u64,
    ) -> Self {
        let verdict = if failure.is_none() && cleanup_errors.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        Self {
            scenario: scenario.into(),
            resource_name: resource_name.into(),
            verdict,
            failure,
            cleanup_errors,
            duration_ms,
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Effective configuration the suite ran with
    pub config: BTreeMap<String, String>,
    pub reports: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.reports.iter().all(ScenarioReport::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.reports.iter().filter(|s| s.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.reports.iter().filter(|s| !s.passed()).count()
    }

    /// 0 when every scenario passed, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}
