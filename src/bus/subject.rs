//! Subject patterns for subscriptions.

use serde::{Deserialize, Serialize};

/// A subscription pattern.
///
/// `*` matches every subject, `prefix.*` matches exactly one further
/// dot-free segment under `prefix`, anything else must match exactly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectPattern {
    /// Every subject
    All,
    /// One level below a prefix
    Prefix(String),
    /// A single subject
    Exact(String),
}

impl SubjectPattern {
    /// Parse a pattern string.
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            SubjectPattern::All
        } else if let Some(prefix) = pattern.strip_suffix(".*") {
            SubjectPattern::Prefix(prefix.to_string())
        } else {
            SubjectPattern::Exact(pattern.to_string())
        }
    }

    /// Check a subject against the pattern.
    pub fn matches(&self, subject: &str) -> bool {
        match self {
            SubjectPattern::All => true,
            SubjectPattern::Exact(exact) => exact == subject,
            SubjectPattern::Prefix(prefix) => subject
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|segment| !segment.is_empty() && !segment.contains('.'))
                .unwrap_or(false),
        }
    }
}

impl From<&str> for SubjectPattern {
    fn from(pattern: &str) -> Self {
        Self::parse(pattern)
    }
}

impl std::fmt::Display for SubjectPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectPattern::All => write!(f, "*"),
            SubjectPattern::Prefix(prefix) => write!(f, "{}.*", prefix),
            SubjectPattern::Exact(exact) => write!(f, "{}", exact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(SubjectPattern::parse("*"), SubjectPattern::All);
        assert_eq!(
            SubjectPattern::parse("pentarchy.*"),
            SubjectPattern::Prefix("pentarchy".to_string())
        );
        assert_eq!(
            SubjectPattern::parse("pentarchy.evaluate"),
            SubjectPattern::Exact("pentarchy.evaluate".to_string())
        );
    }

    #[test]
    fn test_exact_match() {
        let pattern = SubjectPattern::parse("pentarchy.evaluate");
        assert!(pattern.matches("pentarchy.evaluate"));
        assert!(!pattern.matches("pentarchy.evaluated"));
        assert!(!pattern.matches("pentarchy"));
    }

    #[test]
    fn test_single_level_wildcard() {
        let pattern = SubjectPattern::parse("governance.*");
        assert!(pattern.matches("governance.resolved"));
        assert!(!pattern.matches("governance"));
        assert!(!pattern.matches("governance."));
        assert!(!pattern.matches("governance.proposal.resolved"));
        assert!(!pattern.matches("governancex.resolved"));
    }

    #[test]
    fn test_display_roundtrip() {
        for raw in ["*", "agents.*", "agents.heartbeat"] {
            assert_eq!(SubjectPattern::parse(raw).to_string(), raw);
        }
    }
}
