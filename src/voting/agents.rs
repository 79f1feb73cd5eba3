//! Rule-based panel members.
//!
//! Deterministic stand-ins for the five governance agents. They evaluate
//! in-process, or can be hosted on the bus with `VoterService`.

use crate::core::{Error, Result};
use crate::governance::vote::Decision;
use crate::voting::voter::{EvaluationRequest, Verdict, Voter, VoterError};
use async_trait::async_trait;

/// Budget the financial reviewer measures cost against.
const BUDGET_REMAINING: f64 = 1000.0;

/// Descriptions shorter than this lack detail for the communications reviewer.
const MIN_DESCRIPTION_LEN: usize = 20;

const SECURITY_TERMS: &[&str] = &[
    "security",
    "credential",
    "password",
    "secret",
    "permission",
    "firewall",
    "root access",
];

/// The five reference panel members.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceVoter {
    /// Compliance and legal risk
    Athena,
    /// Technical feasibility
    Hephaestus,
    /// Communication clarity
    Hermes,
    /// Financial impact
    NurPrometheus,
    /// Security
    Aegis,
}

impl ReferenceVoter {
    pub const ALL: [ReferenceVoter; 5] = [
        ReferenceVoter::Athena,
        ReferenceVoter::Hephaestus,
        ReferenceVoter::Hermes,
        ReferenceVoter::NurPrometheus,
        ReferenceVoter::Aegis,
    ];

    /// Look up a panel member by name.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|voter| voter.as_str() == name)
            .ok_or_else(|| Error::UnknownVoter(name.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceVoter::Athena => "athena",
            ReferenceVoter::Hephaestus => "hephaestus",
            ReferenceVoter::Hermes => "hermes",
            ReferenceVoter::NurPrometheus => "nur_prometheus",
            ReferenceVoter::Aegis => "aegis",
        }
    }

    fn evaluate(&self, request: &EvaluationRequest) -> Verdict {
        let description = request.description.to_lowercase();
        match self {
            ReferenceVoter::Athena => {
                let mut verdict = Verdict::new(Decision::Approve, 1.0)
                    .with_reason("Compliant with internal policies");
                if description.contains("gdpr") {
                    verdict = verdict.with_reason("GDPR implications detected - requiring review");
                } else {
                    verdict.score += 1.0;
                    verdict = verdict.with_reason("No immediate legal risks found");
                }
                approve_from_score(verdict)
            }
            ReferenceVoter::Hephaestus => {
                let mut verdict =
                    Verdict::new(Decision::Approve, 1.0).with_reason("Resources available");
                if description.contains("complex") {
                    verdict = verdict.with_reason("High complexity detected");
                } else {
                    verdict.score += 1.0;
                    verdict = verdict.with_reason("Low implementation risk");
                }
                approve_from_score(verdict)
            }
            ReferenceVoter::NurPrometheus => {
                let score = if request.cost < BUDGET_REMAINING * 0.1 { 2.0 } else { 1.0 };
                Verdict::new(Decision::Approve, score)
                    .with_reason("Cost within budget parameters")
                    .with_reason("ROI analysis positive")
            }
            ReferenceVoter::Aegis => match SECURITY_TERMS.iter().find(|t| description.contains(*t)) {
                Some(term) => Verdict::new(Decision::Reject, 0.0)
                    .with_reason(&format!("Security-sensitive change detected ({})", term)),
                None => Verdict::new(Decision::Approve, 2.0).with_reason("No security concerns"),
            },
            ReferenceVoter::Hermes => {
                if request.description.trim().chars().count() < MIN_DESCRIPTION_LEN {
                    Verdict::new(Decision::Abstain, 1.0).with_reason("Insufficient detail to evaluate")
                } else {
                    Verdict::new(Decision::Approve, 2.0).with_reason("Proposal is clearly communicated")
                }
            }
        }
    }
}

fn approve_from_score(mut verdict: Verdict) -> Verdict {
    verdict.decision = if verdict.score >= 2.0 {
        Decision::Approve
    } else {
        Decision::Reject
    };
    verdict
}

impl std::fmt::Display for ReferenceVoter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[async_trait]
impl Voter for ReferenceVoter {
    fn name(&self) -> &str {
        self.as_str()
    }

    async fn evaluate_proposal(&self, request: &EvaluationRequest) -> std::result::Result<Verdict, VoterError> {
        tracing::debug!(voter = %self, proposal_id = %request.proposal_id, "Evaluating proposal");
        Ok(self.evaluate(request))
    }
}
