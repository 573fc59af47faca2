//! Error types and case outcomes for forkcase.

use std::fmt;
use thiserror::Error;

/// Main error type for forkcase.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForkcaseError {
    /// A lookup asked the context for a key nothing recorded.
    #[error("context has no binding for key '{key}'")]
    MissingBinding { key: String },

    /// A binding exists but holds a value of another type.
    #[error("binding '{key}' does not hold a value of type {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// A strict container slot resolved to the empty default.
    #[error("required slot {index} resolved to the empty default")]
    EmptySlot { index: usize },

    /// Two actions in the same scope share a name.
    #[error("duplicated action name: {name}")]
    DuplicateAction { name: String },

    /// The test program used the kit incorrectly.
    #[error("invalid usage: {message}")]
    Usage { message: String },

    /// The execute phase did not visit the same call sites as the build phase.
    #[error("replay out of sync: {message}")]
    Desync { message: String },

    /// A checked expectation did not hold.
    #[error("assertion failed: {message}")]
    Assertion { message: String },

    /// A generation pick met an empty forker, so the current path yields nothing.
    #[error("path pruned by a pick over an empty forker")]
    Pruned,

    /// A side-effect result was read before any side effect ran.
    #[error("result '{key}' is only available while executing a case")]
    Unresolved { key: String },

    /// A format template and its arguments do not line up.
    #[error("invalid template: {message}")]
    Template { message: String },

    /// The database collaborator reported an error.
    #[error("database error {code}: {message}")]
    Database { code: u16, message: String },

    /// A model action failed.
    #[error("action '{action}' failed: {message}")]
    Action { action: String, message: String },

    /// Anything else.
    #[error("{message}")]
    Failed { message: String },
}

impl ForkcaseError {
    pub fn usage(message: impl Into<String>) -> Self {
        ForkcaseError::Usage {
            message: message.into(),
        }
    }

    pub fn desync(message: impl Into<String>) -> Self {
        ForkcaseError::Desync {
            message: message.into(),
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        ForkcaseError::Assertion {
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        ForkcaseError::Failed {
            message: message.into(),
        }
    }

    /// Wrap any foreign error as a free-form failure.
    pub fn other<E: std::error::Error>(error: E) -> Self {
        ForkcaseError::Failed {
            message: error.to_string(),
        }
    }

    /// Whether this is a database error carrying the given code.
    pub fn is_database_code(&self, expected: u16) -> bool {
        matches!(self, ForkcaseError::Database { code, .. } if *code == expected)
    }
}

/// Result type for forkcase operations.
pub type Result<T> = std::result::Result<T, ForkcaseError>;

/// One entry of a case's execute path: which topic produced which message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub topic: String,
    pub message: String,
}

impl PathEntry {
    pub fn new(topic: impl Into<String>, message: impl Into<String>) -> Self {
        PathEntry {
            topic: topic.into(),
            message: message.into(),
        }
    }
}

/// Render an execute path with topics padded to a common width.
pub fn render_path(path: &[PathEntry]) -> String {
    let width = path.iter().map(|entry| entry.topic.len()).max().unwrap_or(0) + 2;
    let mut out = String::from("Execute path:");
    for entry in path {
        let topic = format!("[{}]", entry.topic);
        out.push_str(&format!("\n  {:<width$} {}", topic, entry.message, width = width));
    }
    out
}

/// Outcome of one generated case.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseOutcome {
    /// The case ran to completion.
    Pass { index: usize, name: String },

    /// The case failed; `path` is the decision path that produced it.
    Fail {
        index: usize,
        name: String,
        error: String,
        path: Vec<PathEntry>,
    },

    /// The case was suppressed by configuration.
    Skipped { index: usize, name: String },
}

impl CaseOutcome {
    pub fn index(&self) -> usize {
        match self {
            CaseOutcome::Pass { index, .. }
            | CaseOutcome::Fail { index, .. }
            | CaseOutcome::Skipped { index, .. } => *index,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CaseOutcome::Pass { name, .. }
            | CaseOutcome::Fail { name, .. }
            | CaseOutcome::Skipped { name, .. } => name,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CaseOutcome::Fail { .. })
    }
}

impl fmt::Display for CaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseOutcome::Pass { index, name } => write!(f, "  ✓ #{} {} passed.", index, name),
            CaseOutcome::Skipped { index, name } => write!(f, "  ⚐ #{} {} skipped.", index, name),
            CaseOutcome::Fail {
                index,
                name,
                error,
                path,
            } => {
                writeln!(f, "  ✗ #{} {} failed.", index, name)?;
                let mut lines = error.lines();
                if let Some(first) = lines.next() {
                    writeln!(f, "    {}", first)?;
                }
                for line in lines {
                    writeln!(f, "    {}", line)?;
                }
                writeln!(f)?;
                for line in render_path(path).lines() {
                    writeln!(f, "    {}", line)?;
                }
                Ok(())
            }
        }
    }
}

/// All outcomes of one forked test.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub name: String,
    pub outcomes: Vec<CaseOutcome>,
}

impl Report {
    pub fn new(name: impl Into<String>) -> Self {
        Report {
            name: name.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn passed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CaseOutcome::Pass { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Panic with the rendered report if any case failed.
    pub fn assert_success(&self) {
        if !self.is_success() {
            panic!("{}", self);
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "━━━ {} ━━━", self.name)?;
        for outcome in &self.outcomes {
            writeln!(f, "{}", outcome)?;
        }
        let failed = self.failures().count();
        if failed == 0 {
            write!(f, "  {} cases passed.", self.passed())
        } else {
            write!(
                f,
                "  {} of {} cases failed.",
                failed,
                self.outcomes.len()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_path_pads_topics() {
        let path = vec![
            PathEntry::new("pick", "1"),
            PathEntry::new("sql@conn#1", "select 1"),
        ];
        let rendered = render_path(&path);
        assert_eq!(
            rendered,
            "Execute path:\n  [pick]       1\n  [sql@conn#1] select 1"
        );
    }

    #[test]
    fn test_failed_outcome_shows_path() {
        let outcome = CaseOutcome::Fail {
            index: 2,
            name: "c_2".to_string(),
            error: "assertion failed: 1 != 2".to_string(),
            path: vec![PathEntry::new("pick", "\"tb\"")],
        };
        let text = outcome.to_string();
        assert!(text.contains("✗ #2 c_2 failed."));
        assert!(text.contains("assertion failed: 1 != 2"));
        assert!(text.contains("[pick] \"tb\""));
    }

    #[test]
    fn test_report_success() {
        let mut report = Report::new("demo");
        report.outcomes.push(CaseOutcome::Pass {
            index: 1,
            name: "c_1".to_string(),
        });
        report.outcomes.push(CaseOutcome::Skipped {
            index: 2,
            name: "c_2".to_string(),
        });
        assert!(report.is_success());
        assert_eq!(report.passed(), 1);
        assert!(report.to_string().contains("1 cases passed"));
    }

    #[test]
    fn test_database_code() {
        let err = ForkcaseError::Database {
            code: 1062,
            message: "duplicate entry".to_string(),
        };
        assert!(err.is_database_code(1062));
        assert!(!err.is_database_code(1064));
    }
}
