//! Job type value object.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumerated job kinds.
///
/// The type discriminates which executor handles the job and which
/// per-type timeout applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Research collection (scraping, source gathering).
    Research,
    /// Analysis over collected material.
    Analysis,
    /// Media generation and rendering.
    Media,
}

impl JobType {
    /// Returns the type as a stable string for persistence.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Analysis => "analysis",
            Self::Media => "media",
        }
    }

    /// Parses a job type from its persisted string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "research" => Some(Self::Research),
            "analysis" => Some(Self::Analysis),
            "media" => Some(Self::Media),
            _ => None,
        }
    }

    /// All known job types.
    pub const ALL: [Self; 3] = [Self::Research, Self::Analysis, Self::Media];
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for ty in JobType::ALL {
            assert_eq!(JobType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(JobType::parse("unknown"), None);
    }

    #[test]
    fn test_serde_form() {
        let json = serde_json::to_string(&JobType::Research).unwrap();
        assert_eq!(json, "\"research\"");
    }
}
