//! Risk classification and the cost gate.
//!
//! One policy holds both tables: the gate that decides whether a proposal is
//! voted on at all, and the tier bands that pick the approval threshold once
//! it is.

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Highest score a single voter may give.
pub const MAX_SCORE: f64 = 3.0;

/// Risk tier of a proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for RiskLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(Error::Validation(format!("Unknown risk level: {}", other))),
        }
    }
}

/// Lower cost bound of each tier above LOW.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskBands {
    /// Costs from here are MEDIUM
    pub medium_from: f64,
    /// Costs from here are HIGH
    pub high_from: f64,
    /// Costs from here are CRITICAL
    pub critical_from: f64,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            medium_from: 50.0,
            high_from: 100.0,
            critical_from: 1000.0,
        }
    }
}

/// Minimum aggregate score required for approval, per tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            low: 1.5,
            medium: 2.0,
            high: 2.5,
            critical: 2.8,
        }
    }
}

impl ThresholdTable {
    /// Threshold of a tier.
    pub fn get(&self, level: RiskLevel) -> f64 {
        match level {
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }

    /// Tier to threshold map.
    pub fn to_map(&self) -> BTreeMap<RiskLevel, f64> {
        RiskLevel::ALL.iter().map(|level| (*level, self.get(*level))).collect()
    }
}

/// What the cost gate decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostGate {
    /// Below the auto-approve limit
    AutoApprove,
    /// Between the limits, inclusive
    Vote,
    /// Above the human-review limit
    HumanReview,
}

/// Cost gate plus tier tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GovernancePolicy {
    /// Costs strictly below this are approved without a vote
    pub auto_approve_limit: f64,
    /// Costs strictly above this are escalated without a vote
    pub human_review_limit: f64,
    /// Cost bands for classification
    pub bands: RiskBands,
    /// Approval thresholds per tier
    pub thresholds: ThresholdTable,
}

impl Default for GovernancePolicy {
    fn default() -> Self {
        Self {
            auto_approve_limit: 50.0,
            human_review_limit: 100.0,
            bands: RiskBands::default(),
            thresholds: ThresholdTable::default(),
        }
    }
}

impl GovernancePolicy {
    /// Map a cost to its risk tier. Total: anything that is not at least
    /// the MEDIUM bound (including NaN) is LOW.
    pub fn classify(&self, cost: f64) -> RiskLevel {
        if cost >= self.bands.critical_from {
            RiskLevel::Critical
        } else if cost >= self.bands.high_from {
            RiskLevel::High
        } else if cost >= self.bands.medium_from {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Approval threshold of a tier.
    pub fn threshold_for(&self, level: RiskLevel) -> f64 {
        self.thresholds.get(level)
    }

    /// Decide whether a cost is voted on.
    pub fn gate(&self, cost: f64) -> CostGate {
        if cost < self.auto_approve_limit {
            CostGate::AutoApprove
        } else if cost > self.human_review_limit {
            CostGate::HumanReview
        } else {
            CostGate::Vote
        }
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        let limits = [self.auto_approve_limit, self.human_review_limit];
        if limits.iter().any(|limit| !limit.is_finite() || *limit < 0.0) {
            return Err(Error::Config(
                "cost limits must be finite and non-negative".to_string(),
            ));
        }
        if self.auto_approve_limit > self.human_review_limit {
            return Err(Error::Config(format!(
                "auto-approve limit {} exceeds human-review limit {}",
                self.auto_approve_limit, self.human_review_limit
            )));
        }

        let bands = [self.bands.medium_from, self.bands.high_from, self.bands.critical_from];
        if bands.iter().any(|bound| !bound.is_finite() || *bound < 0.0) {
            return Err(Error::Config("risk bands must be finite and non-negative".to_string()));
        }
        if !strictly_increasing(&bands) {
            return Err(Error::Config("risk bands must be strictly increasing".to_string()));
        }

        let thresholds: Vec<f64> = RiskLevel::ALL.iter().map(|l| self.threshold_for(*l)).collect();
        if thresholds.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(Error::Config("thresholds must be finite and non-negative".to_string()));
        }
        if !strictly_increasing(&thresholds) {
            return Err(Error::Config(
                "thresholds must strictly increase with risk".to_string(),
            ));
        }
        Ok(())
    }
}

fn strictly_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|pair| pair[0] < pair[1])
}
