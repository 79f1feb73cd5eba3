//! Free-text action analysis.
//!
//! Estimates the cost of an action described in natural language so callers
//! can decide whether it needs a vote before anything is spent.

use crate::core::{Error, Result};
use crate::governance::risk::{GovernancePolicy, RiskLevel};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default cost per action keyword. Earlier entries win.
const ACTION_COSTS: &[(&str, f64)] = &[
    ("purchase", 75.0),
    ("buy", 75.0),
    ("subscribe", 60.0),
    ("deploy", 80.0),
    ("provision", 100.0),
    ("scale", 70.0),
    ("upgrade", 85.0),
    ("migrate", 150.0),
    ("delete", 50.0),
    ("remove", 40.0),
    ("transfer", 90.0),
    ("payment", 100.0),
    ("invoice", 50.0),
    ("hire", 200.0),
    ("contract", 150.0),
];

const SECURITY_KEYWORDS: &[&str] = &[
    "security",
    "access",
    "permission",
    "credential",
    "secret",
    "key",
    "password",
];

const LEGAL_KEYWORDS: &[&str] = &["legal", "compliance", "gdpr", "contract", "agreement", "terms"];

const COST_PATTERNS: &[&str] = &[
    r"\$(\d+(?:,\d{3})*(?:\.\d{2})?)",
    r"(\d+(?:,\d{3})*(?:\.\d{2})?)\s*(?:dollars?|usd)",
    r"cost(?:s|ing)?\s*(?:about|around|approximately)?\s*\$?(\d+)",
];

/// What the analyzer concluded about a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionAnalysis {
    /// Whether the estimated cost reaches the auto-approve limit
    pub requires_voting: bool,
    pub estimated_cost: f64,
    pub risk_level: RiskLevel,
    /// Matched keyword, `security`, `legal` or `general`
    pub action_type: String,
    pub description: String,
}

/// Keyword and amount based cost estimator.
pub struct ActionAnalyzer {
    policy: GovernancePolicy,
    patterns: Vec<Regex>,
}

impl ActionAnalyzer {
    /// Create an analyzer bound to a policy.
    pub fn new(policy: GovernancePolicy) -> Result<Self> {
        let patterns = COST_PATTERNS
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| Error::Internal(format!("invalid cost pattern {}: {}", pattern, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { policy, patterns })
    }

    /// Largest explicit amount mentioned in the message.
    pub fn extract_cost(&self, message: &str) -> Option<f64> {
        let lower = message.to_lowercase();
        self.patterns
            .iter()
            .flat_map(|pattern| pattern.captures_iter(&lower))
            .filter_map(|captures| captures.get(1))
            .filter_map(|amount| amount.as_str().replace(',', "").parse::<f64>().ok())
            .fold(None, |max: Option<f64>, cost| Some(max.map_or(cost, |m| m.max(cost))))
    }

    /// Analyze a message.
    pub fn analyze(&self, message: &str) -> ActionAnalysis {
        let lower = message.to_lowercase();
        let mut estimated_cost = self.extract_cost(message).unwrap_or(0.0);
        let mut action_type = "general".to_string();

        if let Some((keyword, default_cost)) = ACTION_COSTS.iter().find(|(k, _)| lower.contains(k)) {
            action_type = keyword.to_string();
            if estimated_cost == 0.0 {
                estimated_cost = *default_cost;
            }
        }

        let sensitive = if SECURITY_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Some("security")
        } else if LEGAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Some("legal")
        } else {
            None
        };
        if let Some(kind) = sensitive {
            action_type = kind.to_string();
            estimated_cost = estimated_cost.max(self.policy.human_review_limit);
        }

        ActionAnalysis {
            requires_voting: estimated_cost >= self.policy.auto_approve_limit,
            estimated_cost,
            risk_level: self.policy.classify(estimated_cost),
            description: format!("Action '{}' with estimated cost ${:.2}", action_type, estimated_cost),
            action_type,
        }
    }
}

/// Title used for proposals created from an analysis.
pub fn auto_title(analysis: &ActionAnalysis) -> String {
    let mut chars = analysis.action_type.chars();
    let action = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    format!("Auto-generated: {} Action", action)
}
