//! Failure classification for retry eligibility.
//!
//! Classification is a pure function over the stored failure kind and text.
//! Permanent failures are excluded from bulk transient retry so unfixable
//! errors do not loop forever through the dead-letter queue.

use beacon_core::{FailureKind, JobFailure};

/// Whether a failure is worth retrying without operator intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Likely to succeed on retry (rate limits, timeouts, lost workers).
    Transient,
    /// Will fail again until something is fixed (misconfiguration,
    /// authorization, validation).
    Permanent,
}

impl FailureClass {
    /// True for [`FailureClass::Transient`].
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Pluggable failure classifier.
pub trait FailureClassifier: Send + Sync {
    /// Classifies a stored failure.
    fn classify(&self, failure: &JobFailure) -> FailureClass;
}

/// Default classifier: decides by failure kind first, then by scanning the
/// error text for permanent-failure markers.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

/// Substrings marking an executor error as permanent.
const PERMANENT_MARKERS: &[&str] = &[
    "forbidden",
    "unauthorized",
    "permission denied",
    "invalid",
    "validation",
    "misconfig",
    "missing config",
    "not found",
    "unsupported",
];

impl KeywordClassifier {
    /// Creates the default classifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FailureClassifier for KeywordClassifier {
    fn classify(&self, failure: &JobFailure) -> FailureClass {
        match failure.kind {
            // a reaped job never even finished; always worth retrying
            FailureKind::StaleWorker | FailureKind::Timeout => FailureClass::Transient,
            FailureKind::Cancelled | FailureKind::Validation => FailureClass::Permanent,
            FailureKind::Executor => {
                let message = failure.message.to_lowercase();
                if PERMANENT_MARKERS.iter().any(|m| message.contains(m)) {
                    FailureClass::Permanent
                } else {
                    FailureClass::Transient
                }
            }
        }
    }
}
