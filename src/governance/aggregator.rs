//! Consensus aggregation.
//!
//! Scores are summed first. When the sum is inconclusive, raw approve and
//! reject counts break the tie against the configured panel size.

use crate::governance::vote::{Decision, Vote, VoteOrigin};
use serde::{Deserialize, Serialize};

/// Width of the marginal-pass band below the threshold.
pub const REVIEW_MARGIN: f64 = 0.5;

/// Result of aggregating a set of votes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Approved,
    Rejected,
    /// Passed within the review margin; needs human sign-off
    ApprovedWithReview,
    Escalated,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Approved => write!(f, "APPROVED"),
            Outcome::Rejected => write!(f, "REJECTED"),
            Outcome::ApprovedWithReview => write!(f, "APPROVED_WITH_REVIEW"),
            Outcome::Escalated => write!(f, "ESCALATED"),
        }
    }
}

/// How much an APPROVE contributes to the sum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Solicited approvals add their score; manual approvals add 1.0
    #[default]
    Weighted,
    /// Every approval adds 1.0
    Count,
}

/// Aggregation result with its inputs, for audit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    /// Decision
    pub outcome: Outcome,
    /// Summed contributions
    pub score: f64,
    /// Threshold the score was compared against
    pub threshold: f64,
    /// APPROVE votes
    pub approvals: usize,
    /// REJECT votes
    pub rejections: usize,
    /// ABSTAIN votes
    pub abstentions: usize,
}

impl Tally {
    /// Total votes counted.
    pub fn vote_count(&self) -> usize {
        self.approvals + self.rejections + self.abstentions
    }

    /// Score to record on the proposal; None when nothing was counted.
    pub fn final_score(&self) -> Option<f64> {
        if self.vote_count() == 0 {
            None
        } else {
            Some(self.score)
        }
    }
}

/// Reduces votes to an outcome.
#[derive(Clone, Debug)]
pub struct ConsensusAggregator {
    panel_size: usize,
    mode: ScoringMode,
}

impl ConsensusAggregator {
    /// Create an aggregator for a panel of `panel_size` voters.
    pub fn new(panel_size: usize, mode: ScoringMode) -> Self {
        Self { panel_size, mode }
    }

    /// Votes needed for an absolute panel majority.
    pub fn majority(&self) -> usize {
        self.panel_size / 2 + 1
    }

    /// Scoring mode.
    pub fn mode(&self) -> ScoringMode {
        self.mode
    }

    /// What a single vote adds to the sum.
    pub fn contribution(&self, vote: &Vote) -> f64 {
        match vote.decision {
            Decision::Approve => match (self.mode, vote.origin) {
                (ScoringMode::Count, _) | (ScoringMode::Weighted, VoteOrigin::Manual) => 1.0,
                (ScoringMode::Weighted, _) => vote.score,
            },
            Decision::Reject => -1.0,
            Decision::Abstain => 0.0,
        }
    }

    /// Aggregate votes against a threshold.
    pub fn aggregate(&self, votes: &[Vote], threshold: f64) -> Tally {
        let mut contributions: Vec<f64> = votes.iter().map(|v| self.contribution(v)).collect();
        // Summation order is fixed so the result does not depend on vote order.
        contributions.sort_by(|a, b| a.total_cmp(b));
        let score: f64 = contributions.iter().sum();

        let count = |decision: Decision| votes.iter().filter(|v| v.decision == decision).count();
        let approvals = count(Decision::Approve);
        let rejections = count(Decision::Reject);
        let abstentions = count(Decision::Abstain);

        let outcome = if votes.is_empty() {
            Outcome::Escalated
        } else if score >= threshold {
            Outcome::Approved
        } else if score >= threshold - REVIEW_MARGIN && score > 0.0 {
            Outcome::ApprovedWithReview
        } else if rejections > approvals {
            Outcome::Rejected
        } else if approvals >= self.majority() {
            Outcome::Approved
        } else {
            Outcome::Escalated
        };

        Tally {
            outcome,
            score,
            threshold,
            approvals,
            rejections,
            abstentions,
        }
    }
}
