//! Report rendering
//!
//! Reports go to stdout, either as pretty-printed JSON or as a short
//! human-readable summary. Diagnostics logged during the run go to stderr.

use anyhow::{Context, Result};

use crate::report::{ScenarioReport, SuiteReport};

/// Build log lines shown under a failed scenario in human output
const LOG_TAIL_LINES: usize = 40;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self, report: &SuiteReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report)
                .context("Failed to serialize suite report to JSON"),
            OutputFormat::Human => Ok(self.format_human(report)),
        }
    }

    fn format_human(&self, report: &SuiteReport) -> String {
        let mut output = String::new();

        output.push_str(&format!("{}\n{}\n", report.suite, RULE));
        output.push_str(&format!(
            "Started {}\n\n",
            report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        if let Some(builder) = report.config.get("builder") {
            output.push_str(&format!("Builder: {}\n\n", builder));
        }

        for scenario in &report.reports {
            format_scenario(&mut output, scenario);
        }

        let mark = if report.passed() { "\u{2713}" } else { "\u{2717}" };
        output.push_str(&format!(
            "\n{} {} passed, {} failed in {}ms\n",
            mark,
            report.passed_count(),
            report.failed_count(),
            report.duration_ms
        ));

        output
    }
}

fn format_scenario(output: &mut String, scenario: &ScenarioReport) {
    let mark = if scenario.passed() { "\u{2713}" } else { "\u{2717}" };
    output.push_str(&format!(
        "{} {} ({}ms)\n",
        mark, scenario.scenario, scenario.duration_ms
    ));

    if let Some(ref failure) = scenario.failure {
        output.push_str(&format!(
            "\u{251C}\u{2500} {} failure: {}\n",
            failure.kind, failure.message
        ));

        if let Some(ref logs) = failure.logs {
            let lines: Vec<&str> = logs.lines().collect();
            let skipped = lines.len().saturating_sub(LOG_TAIL_LINES);
            output.push_str("\u{251C}\u{2500} Build logs:\n");
            if skipped > 0 {
                output.push_str(&format!("\u{2502}    ... {} lines omitted\n", skipped));
            }
            for line in &lines[skipped..] {
                output.push_str(&format!("\u{2502}    {}\n", line));
            }
        }
    }

    for cleanup in &scenario.cleanup_errors {
        output.push_str(&format!("\u{251C}\u{2500} \u{26A0} {}\n", cleanup));
    }

    if !scenario.resource_name.is_empty() {
        output.push_str(&format!("\u{2514}\u{2500} Resources: {}\n", scenario.resource_name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{CleanupError, CleanupStep, FailureKind, FailureReport};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn suite(reports: Vec<ScenarioReport>) -> SuiteReport {
        SuiteReport {
            suite: "Buildpackless Smoke".to_string(),
            started_at: Utc::now(),
            duration_ms: 1500,
            config: BTreeMap::from([
                ("builder".to_string(), "test-builder".to_string()),
                ("procfile".to_string(), "some/procfile-buildpack".to_string()),
            ]),
            reports,
        }
    }

    fn failing() -> ScenarioReport {
        ScenarioReport::new(
            "Procfile builds Procfile app successfully",
            "smokepack-abc",
            Some(FailureReport {
                kind: FailureKind::Assertion,
                message: "Build logs have no line containing 'Paketo Buildpack for Procfile'"
                    .to_string(),
                logs: Some("===> DETECTING\n===> BUILDING".to_string()),
            }),
            vec![CleanupError {
                step: CleanupStep::Image,
                target: "sha256:abc".to_string(),
                message: "image is in use".to_string(),
            }],
            1200,
        )
    }

    #[test]
    fn test_json_format() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format(&suite(vec![failing()])).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["suite"], "Buildpackless Smoke");
        assert_eq!(parsed["reports"][0]["verdict"], "fail");
        assert_eq!(parsed["reports"][0]["failure"]["kind"], "assertion");
        assert_eq!(parsed["config"]["builder"], "test-builder");
        assert_eq!(parsed["config"]["procfile"], "some/procfile-buildpack");
    }

    #[test]
    fn test_human_format_passing() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let report = suite(vec![ScenarioReport::new(
            "Procfile builds Procfile app successfully",
            "smokepack-abc",
            None,
            vec![],
            900,
        )]);
        let output = formatter.format(&report).unwrap();

        assert!(output.starts_with("Buildpackless Smoke\n"));
        assert!(output.contains("Builder: test-builder"));
        assert!(output.contains("\u{2713} Procfile builds Procfile app successfully (900ms)"));
        assert!(output.contains("1 passed, 0 failed"));
        assert!(!output.contains("failure:"));
    }

    #[test]
    fn test_human_format_failure_details() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter.format(&suite(vec![failing()])).unwrap();

        assert!(output.contains("\u{2717} Procfile builds Procfile app successfully"));
        assert!(output.contains("assertion failure:"));
        assert!(output.contains("\u{2502}    ===> BUILDING"));
        assert!(output.contains("cleanup of image sha256:abc failed: image is in use"));
        assert!(output.contains("0 passed, 1 failed"));
    }

    #[test]
    fn test_human_format_truncates_long_logs() {
        let logs = (0..100).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let mut report = failing();
        if let Some(ref mut failure) = report.failure {
            failure.logs = Some(logs);
        }

        let output = OutputFormatter::new(OutputFormat::Human)
            .format(&suite(vec![report]))
            .unwrap();

        assert!(output.contains("60 lines omitted"));
        assert!(output.contains("line 99"));
        assert!(!output.contains("line 59\n"));
    }
}
