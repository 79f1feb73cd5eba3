//! Voter interface.
//!
//! A panel member is anything that can turn an evaluation request into a
//! verdict. Failures are returned as `VoterError` values and never escape
//! the coordinator.

use crate::core::ProposalId;
use crate::governance::proposal::Proposal;
use crate::governance::risk::{RiskLevel, MAX_SCORE};
use crate::governance::vote::{Decision, Vote};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// What a voter is asked to evaluate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub proposal_id: ProposalId,
    pub title: String,
    pub description: String,
    pub cost: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl EvaluationRequest {
    /// Build a request from a proposal.
    pub fn from_proposal(proposal: &Proposal) -> Self {
        Self {
            proposal_id: proposal.id.clone(),
            title: proposal.title.clone(),
            description: proposal.description.clone(),
            cost: proposal.cost,
            risk_level: proposal.risk_level,
            context: proposal.context.clone(),
        }
    }
}

/// A voter's answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(alias = "vote")]
    pub decision: Decision,
    pub score: f64,
    #[serde(default)]
    pub reasoning: Vec<String>,
}

impl Verdict {
    pub fn new(decision: Decision, score: f64) -> Self {
        Self {
            decision,
            score,
            reasoning: Vec::new(),
        }
    }

    /// Add a reason.
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reasoning.push(reason.to_string());
        self
    }

    /// Reject scores that are not finite or fall outside [0, 3].
    pub fn validate(&self) -> Result<(), VoterError> {
        if self.score.is_finite() && (0.0..=MAX_SCORE).contains(&self.score) {
            Ok(())
        } else {
            Err(VoterError::Malformed(format!(
                "score {} outside [0, {}]",
                self.score, MAX_SCORE
            )))
        }
    }

    /// Turn into a solicited vote from `voter`.
    pub fn into_vote(self, voter: &str) -> Vote {
        Vote::new(voter, self.decision, self.score).with_reasoning(self.reasoning)
    }
}

/// Why a voter produced no verdict.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoterError {
    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("voter failed: {0}")]
    Failed(String),
}

impl VoterError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, VoterError::Timeout(_))
    }
}

/// A panel member.
#[async_trait]
pub trait Voter: Send + Sync {
    /// Panel name.
    fn name(&self) -> &str;

    /// Evaluate a proposal.
    async fn evaluate_proposal(&self, request: &EvaluationRequest) -> Result<Verdict, VoterError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::proposal::ProposalRequest;
    use crate::governance::vote::VoteOrigin;

    #[test]
    fn test_request_from_proposal() {
        let proposal = Proposal::new(
            ProposalRequest::new("Buy GPUs", "Two GPUs", 75.0).with_context("team", "ml".into()),
            RiskLevel::Medium,
            2.0,
        );
        let request = EvaluationRequest::from_proposal(&proposal);
        assert_eq!(request.proposal_id, proposal.id);
        assert_eq!(request.cost, 75.0);
        assert_eq!(request.context["team"], "ml");
    }

    #[test]
    fn test_verdict_validation() {
        assert!(Verdict::new(Decision::Approve, 3.0).validate().is_ok());
        assert!(matches!(
            Verdict::new(Decision::Approve, 3.5).validate(),
            Err(VoterError::Malformed(_))
        ));
        assert!(Verdict::new(Decision::Reject, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_verdict_accepts_vote_alias() {
        let verdict: Verdict =
            serde_json::from_str(r#"{"vote": "APPROVE", "score": 2, "reasoning": ["ok"]}"#).unwrap();
        assert_eq!(verdict.decision, Decision::Approve);
        assert_eq!(verdict.score, 2.0);

        let vote = verdict.into_vote("athena");
        assert_eq!(vote.voter, "athena");
        assert_eq!(vote.origin, VoteOrigin::Solicited);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(VoterError::Timeout(30000).to_string(), "timed out after 30000ms");
        assert!(VoterError::Timeout(1).is_timeout());
        assert!(!VoterError::Failed("x".to_string()).is_timeout());
    }
}
