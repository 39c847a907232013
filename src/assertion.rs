//! Build log capture and content assertions

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Everything the build tool printed, stdout first, then stderr.
///
/// Kept intact after the build so it can be asserted on once the container is up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BuildLogs(String);

impl BuildLogs {
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    /// Joins raw process output into one log.
    pub fn from_output(stdout: &[u8], stderr: &[u8]) -> Self {
        let mut content = String::from_utf8_lossy(stdout).into_owned();
        if !stderr.is_empty() {
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(&String::from_utf8_lossy(stderr));
        }
        Self(content)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.0.lines()
    }

    /// True when at least one line contains `needle`.
    pub fn contains_line(&self, needle: &str) -> bool {
        self.lines().any(|line| line.contains(needle))
    }
}

impl fmt::Display for BuildLogs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Build logs have no line containing '{expected}'")]
pub struct AssertionFailure {
    pub expected: String,
    pub logs: BuildLogs,
}

/// An expectation over captured build logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LogAssertion {
    /// Some line must contain the substring
    ContainsLine(String),
}

impl LogAssertion {
    pub fn contains_line(needle: impl Into<String>) -> Self {
        LogAssertion::ContainsLine(needle.into())
    }

    /// Evaluates the assertion. Pure: the same logs always give the same result.
    pub fn evaluate(&self, logs: &BuildLogs) -> Result<(), AssertionFailure> {
        match self {
            LogAssertion::ContainsLine(needle) => {
                if logs.contains_line(needle) {
                    Ok(())
                } else {
                    Err(AssertionFailure {
                        expected: needle.clone(),
                        logs: logs.clone(),
                    })
                }
            }
        }
    }
}
