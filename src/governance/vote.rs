//! Votes cast on proposals.

use crate::core::{now, Error, Result, Timestamp};
use crate::governance::risk::MAX_SCORE;
use serde::{Deserialize, Serialize};

/// A voter's decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Approve the proposal
    Approve,
    /// Reject the proposal
    Reject,
    /// Abstain from voting
    Abstain,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Approve => write!(f, "APPROVE"),
            Decision::Reject => write!(f, "REJECT"),
            Decision::Abstain => write!(f, "ABSTAIN"),
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APPROVE" => Ok(Decision::Approve),
            "REJECT" => Ok(Decision::Reject),
            "ABSTAIN" => Ok(Decision::Abstain),
            other => Err(Error::Validation(format!(
                "Vote must be APPROVE, REJECT, or ABSTAIN, got {}",
                other
            ))),
        }
    }
}

/// How a vote came to be recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOrigin {
    /// Returned by the voter during solicitation
    Solicited,
    /// Stands in for a voter that failed or timed out
    Synthesized,
    /// Recorded through the manual override path
    Manual,
}

/// A single vote on a proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Panel member name
    pub voter: String,
    /// Decision
    pub decision: Decision,
    /// Score in [0, 3]
    pub score: f64,
    /// Human-readable reasons
    pub reasoning: Vec<String>,
    /// When the vote was cast
    pub cast_at: Timestamp,
    /// Where the vote came from
    pub origin: VoteOrigin,
    /// Arrival order on the owning proposal
    #[serde(default)]
    pub sequence: u64,
}

impl Vote {
    /// Create a solicited vote.
    pub fn new(voter: &str, decision: Decision, score: f64) -> Self {
        Self {
            voter: voter.to_string(),
            decision,
            score,
            reasoning: Vec::new(),
            cast_at: now(),
            origin: VoteOrigin::Solicited,
            sequence: 0,
        }
    }

    /// Create a manually recorded vote.
    pub fn manual(voter: &str, decision: Decision, score: f64) -> Self {
        Self {
            origin: VoteOrigin::Manual,
            ..Self::new(voter, decision, score)
        }
    }

    /// ABSTAIN recorded in place of a voter that failed.
    pub fn failure(voter: &str, penalty_score: f64, reason: &str) -> Self {
        Self {
            origin: VoteOrigin::Synthesized,
            reasoning: vec![reason.to_string()],
            ..Self::new(voter, Decision::Abstain, penalty_score)
        }
    }

    /// Set the reasoning.
    pub fn with_reasoning(mut self, reasoning: Vec<String>) -> Self {
        self.reasoning = reasoning;
        self
    }

    /// Whether this vote stands in for a failed voter.
    pub fn is_synthesized(&self) -> bool {
        self.origin == VoteOrigin::Synthesized
    }

    /// Check the score range.
    pub fn validate(&self) -> Result<()> {
        check_score(self.score)
    }
}

/// A score must be finite and within [0, 3].
pub fn check_score(score: f64) -> Result<()> {
    if score.is_finite() && (0.0..=MAX_SCORE).contains(&score) {
        Ok(())
    } else {
        Err(Error::ScoreOutOfRange(score))
    }
}
