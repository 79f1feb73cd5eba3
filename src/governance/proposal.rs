//! Proposals and their lifecycle.
//!
//! PENDING is the only non-terminal status. Every transition out of it goes
//! through `finish`, which fixes status, score and `resolved_at` together
//! and refuses to run twice.

use crate::core::{now, Error, ProposalId, Result, Timestamp};
use crate::governance::aggregator::{Outcome, Tally};
use crate::governance::risk::RiskLevel;
use crate::governance::vote::Vote;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Persisted proposal status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Escalated,
}

impl ProposalStatus {
    /// Whether the status can no longer change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::Pending)
    }
}

impl From<Outcome> for ProposalStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Approved | Outcome::ApprovedWithReview => ProposalStatus::Approved,
            Outcome::Rejected => ProposalStatus::Rejected,
            Outcome::Escalated => ProposalStatus::Escalated,
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProposalStatus::Pending => write!(f, "PENDING"),
            ProposalStatus::Approved => write!(f, "APPROVED"),
            ProposalStatus::Rejected => write!(f, "REJECTED"),
            ProposalStatus::Escalated => write!(f, "ESCALATED"),
        }
    }
}

/// Why a proposal reached its terminal status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Cost below the auto-approve limit
    AutoApproved { limit: f64 },
    /// Cost above the human-review limit
    HumanReviewRequired { limit: f64 },
    /// Votes were aggregated
    Consensus { outcome: Outcome },
    /// Resolution ran with no votes recorded
    NoVotes,
    /// The vote round died before it could resolve
    RoundFailed { reason: String },
}

/// Input for creating a proposal.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProposalRequest {
    /// Caller-assigned id; generated when absent
    pub id: Option<ProposalId>,
    pub title: String,
    pub description: String,
    pub cost: f64,
    /// Overrides the tier derived from cost
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub initiated_by: Option<String>,
}

impl ProposalRequest {
    /// Create a request.
    pub fn new(title: &str, description: &str, cost: f64) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            cost,
            ..Default::default()
        }
    }

    /// Use a caller-assigned id.
    pub fn with_id(mut self, id: impl Into<ProposalId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Override the risk tier.
    pub fn with_risk_level(mut self, level: RiskLevel) -> Self {
        self.risk_level = Some(level);
        self
    }

    /// Attach a context value.
    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    /// Record who initiated the proposal.
    pub fn initiated_by(mut self, initiator: &str) -> Self {
        self.initiated_by = Some(initiator.to_string());
        self
    }

    /// Check the cost. NaN, infinities and negatives are rejected.
    pub fn validate(&self) -> Result<()> {
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err(Error::InvalidCost(self.cost));
        }
        if self.title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".to_string()));
        }
        Ok(())
    }
}

/// A governance proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub title: String,
    pub description: String,
    pub cost: f64,
    /// Tier used for the threshold
    pub risk_level: RiskLevel,
    /// Whether `risk_level` was overridden by the submitter
    pub risk_overridden: bool,
    pub status: ProposalStatus,
    /// Aggregate score; set only when resolved by votes
    pub final_score: Option<f64>,
    /// Approval threshold applied
    pub threshold: f64,
    /// Aggregator outcome, kept to distinguish approvals needing review
    pub outcome: Option<Outcome>,
    pub resolution: Option<Resolution>,
    pub context: HashMap<String, serde_json::Value>,
    pub initiated_by: Option<String>,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    votes: HashMap<String, Vote>,
    #[serde(default)]
    next_sequence: u64,
}

impl Proposal {
    /// Create a PENDING proposal.
    pub fn new(request: ProposalRequest, risk_level: RiskLevel, threshold: f64) -> Self {
        Self {
            id: request.id.unwrap_or_else(ProposalId::generate),
            title: request.title,
            description: request.description,
            cost: request.cost,
            risk_level,
            risk_overridden: request.risk_level.is_some(),
            status: ProposalStatus::Pending,
            final_score: None,
            threshold,
            outcome: None,
            resolution: None,
            context: request.context,
            initiated_by: request.initiated_by,
            created_at: now(),
            resolved_at: None,
            votes: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Whether the proposal reached a terminal status.
    pub fn is_resolved(&self) -> bool {
        self.status.is_terminal()
    }

    /// Approved, but only within the review margin.
    pub fn requires_review(&self) -> bool {
        self.outcome == Some(Outcome::ApprovedWithReview)
    }

    /// Votes in arrival order.
    pub fn votes(&self) -> Vec<&Vote> {
        let mut votes: Vec<&Vote> = self.votes.values().collect();
        votes.sort_by_key(|vote| vote.sequence);
        votes
    }

    /// Votes in arrival order, cloned for aggregation.
    pub fn collect_votes(&self) -> Vec<Vote> {
        self.votes().into_iter().cloned().collect()
    }

    /// Vote cast by a voter, if any.
    pub fn vote_of(&self, voter: &str) -> Option<&Vote> {
        self.votes.get(voter)
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// Record a vote, replacing the voter's previous one. Returns the replaced vote.
    pub fn record_vote(&mut self, mut vote: Vote) -> Result<Option<Vote>> {
        if self.is_resolved() {
            return Err(Error::InvalidState {
                id: self.id.to_string(),
                status: self.status.to_string(),
            });
        }
        vote.sequence = self.next_sequence;
        self.next_sequence += 1;
        Ok(self.votes.insert(vote.voter.clone(), vote))
    }

    /// Resolve without a vote. No-op when already resolved.
    pub fn auto_resolve(&mut self, status: ProposalStatus, resolution: Resolution) -> bool {
        self.finish(status, None, None, resolution)
    }

    /// Resolve from an aggregation. No-op when already resolved.
    pub fn apply_tally(&mut self, tally: &Tally) -> bool {
        if self.is_resolved() {
            return false;
        }
        let resolution = match tally.final_score() {
            Some(_) => Resolution::Consensus {
                outcome: tally.outcome,
            },
            None => Resolution::NoVotes,
        };
        self.threshold = tally.threshold;
        self.finish(
            tally.outcome.into(),
            tally.final_score(),
            Some(tally.outcome),
            resolution,
        )
    }

    fn finish(
        &mut self,
        status: ProposalStatus,
        final_score: Option<f64>,
        outcome: Option<Outcome>,
        resolution: Resolution,
    ) -> bool {
        if self.is_resolved() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.final_score = final_score;
        self.outcome = outcome;
        self.resolution = Some(resolution);
        self.resolved_at = Some(now());
        true
    }

    /// Listing view.
    pub fn summary(&self) -> ProposalSummary {
        ProposalSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            status: self.status,
            final_score: self.final_score,
            vote_count: self.vote_count(),
            created_at: self.created_at,
        }
    }
}

/// Compact listing entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposalSummary {
    pub id: ProposalId,
    pub title: String,
    pub status: ProposalStatus,
    pub final_score: Option<f64>,
    pub vote_count: usize,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::aggregator::{ConsensusAggregator, ScoringMode};
    use crate::governance::vote::Decision;

    fn pending() -> Proposal {
        Proposal::new(
            ProposalRequest::new("Buy GPUs", "Two GPUs for training", 75.0),
            RiskLevel::Medium,
            2.0,
        )
    }

    #[test]
    fn test_request_validation() {
        assert!(ProposalRequest::new("t", "d", 0.0).validate().is_ok());
        assert!(matches!(
            ProposalRequest::new("t", "d", -1.0).validate(),
            Err(Error::InvalidCost(_))
        ));
        assert!(ProposalRequest::new("t", "d", f64::NAN).validate().is_err());
        assert!(ProposalRequest::new("  ", "d", 1.0).validate().is_err());
    }

    #[test]
    fn test_vote_replaces_previous() {
        let mut proposal = pending();
        proposal.record_vote(Vote::new("athena", Decision::Reject, 0.0)).unwrap();
        proposal.record_vote(Vote::new("hermes", Decision::Approve, 2.0)).unwrap();
        let replaced = proposal
            .record_vote(Vote::new("athena", Decision::Approve, 3.0))
            .unwrap();

        assert_eq!(replaced.map(|v| v.decision), Some(Decision::Reject));
        assert_eq!(proposal.vote_count(), 2);
        let voters: Vec<&str> = proposal.votes().iter().map(|v| v.voter.as_str()).collect();
        assert_eq!(voters, vec!["hermes", "athena"]);
    }

    #[test]
    fn test_resolution_is_final() {
        let mut proposal = pending();
        proposal.record_vote(Vote::new("athena", Decision::Approve, 3.0)).unwrap();
        let tally = ConsensusAggregator::new(5, ScoringMode::Weighted)
            .aggregate(&proposal.collect_votes(), proposal.threshold);
        assert!(proposal.apply_tally(&tally));

        let snapshot = proposal.clone();
        assert!(!proposal.apply_tally(&tally));
        assert!(!proposal.auto_resolve(
            ProposalStatus::Rejected,
            Resolution::HumanReviewRequired { limit: 100.0 }
        ));
        assert_eq!(proposal, snapshot);
        assert_eq!(proposal.status, ProposalStatus::Approved);
        assert_eq!(proposal.final_score, Some(3.0));

        let late = proposal.record_vote(Vote::new("hermes", Decision::Reject, 0.0));
        assert!(matches!(late, Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_late_tally_keeps_threshold() {
        let mut proposal = pending();
        proposal.record_vote(Vote::new("athena", Decision::Approve, 3.0)).unwrap();
        let aggregator = ConsensusAggregator::new(5, ScoringMode::Weighted);
        assert!(proposal.apply_tally(&aggregator.aggregate(&proposal.collect_votes(), 2.0)));

        let stricter = aggregator.aggregate(&proposal.collect_votes(), 2.8);
        assert!(!proposal.apply_tally(&stricter));
        assert_eq!(proposal.threshold, 2.0);
        assert_eq!(proposal.status, ProposalStatus::Approved);
    }

    #[test]
    fn test_auto_resolution_has_no_score() {
        let mut proposal = pending();
        assert!(proposal.auto_resolve(
            ProposalStatus::Approved,
            Resolution::AutoApproved { limit: 50.0 }
        ));
        assert!(proposal.final_score.is_none());
        assert!(proposal.resolved_at.is_some());
        assert!(!proposal.requires_review());
    }

    #[test]
    fn test_marginal_approval_requires_review() {
        let mut proposal = pending();
        proposal.record_vote(Vote::new("athena", Decision::Approve, 1.7)).unwrap();
        let tally = ConsensusAggregator::new(5, ScoringMode::Weighted)
            .aggregate(&proposal.collect_votes(), proposal.threshold);
        proposal.apply_tally(&tally);

        assert_eq!(proposal.status, ProposalStatus::Approved);
        assert!(proposal.requires_review());
    }

    #[test]
    fn test_empty_tally_records_no_votes() {
        let mut proposal = pending();
        let tally = ConsensusAggregator::new(5, ScoringMode::Weighted).aggregate(&[], 2.0);
        proposal.apply_tally(&tally);
        assert_eq!(proposal.status, ProposalStatus::Escalated);
        assert_eq!(proposal.resolution, Some(Resolution::NoVotes));
        assert!(proposal.final_score.is_none());
    }
}
