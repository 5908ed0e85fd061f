//! Structured failure detail stored on failed jobs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The executor returned an error.
    Executor,
    /// Execution exceeded the configured timeout.
    Timeout,
    /// The job was cancelled before execution.
    Cancelled,
    /// The owning worker died while the job was running; applied by the
    /// staleness reaper.
    StaleWorker,
    /// Pre-execution validation failed.
    Validation,
}

impl FailureKind {
    /// Returns the kind as a stable string for persistence.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Executor => "executor",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::StaleWorker => "stale_worker",
            Self::Validation => "validation",
        }
    }

    /// Parses a kind from its persisted string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "executor" => Some(Self::Executor),
            "timeout" => Some(Self::Timeout),
            "cancelled" => Some(Self::Cancelled),
            "stale_worker" => Some(Self::StaleWorker),
            "validation" => Some(Self::Validation),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure detail, set only on FAILED jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Error text, stored verbatim.
    pub message: String,
}

impl JobFailure {
    /// Creates a new failure record.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an executor failure.
    #[must_use]
    pub fn executor(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Executor, message)
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timeout(secs: u64) -> Self {
        Self::new(FailureKind::Timeout, format!("timed out after {secs}s"))
    }

    /// Creates a cancellation failure.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, reason)
    }

    /// Creates a stale worker failure.
    #[must_use]
    pub fn stale_worker() -> Self {
        Self::new(FailureKind::StaleWorker, "worker lost while job was running")
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
