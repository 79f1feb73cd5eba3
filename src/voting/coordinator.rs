//! Vote solicitation.
//!
//! Asks every panel member at once and waits for all of them, each bounded
//! by its own timeout. A voter that fails never costs the others anything:
//! its slot is filled with an ABSTAIN carrying the penalty score.

use crate::core::{Error, Result};
use crate::governance::risk::MAX_SCORE;
use crate::governance::vote::Vote;
use crate::monitoring::GovernanceMetrics;
use crate::voting::panel::VoterPanel;
use crate::voting::voter::{EvaluationRequest, Voter, VoterError};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Solicitation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Per-voter wait in milliseconds
    pub voter_timeout_ms: u64,
    /// Score recorded for a voter that failed
    pub failure_score: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            voter_timeout_ms: 30_000,
            failure_score: 1.5,
        }
    }
}

impl CoordinatorConfig {
    pub fn voter_timeout(&self) -> Duration {
        Duration::from_millis(self.voter_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.voter_timeout_ms == 0 {
            return Err(Error::Config("voter timeout must be positive".to_string()));
        }
        if !self.failure_score.is_finite() || !(0.0..=MAX_SCORE).contains(&self.failure_score) {
            return Err(Error::Config(format!(
                "failure score {} outside [0, {}]",
                self.failure_score, MAX_SCORE
            )));
        }
        Ok(())
    }
}

/// Fans evaluation requests out to the panel.
pub struct SolicitationCoordinator {
    panel: Arc<VoterPanel>,
    config: CoordinatorConfig,
    metrics: Arc<GovernanceMetrics>,
}

impl SolicitationCoordinator {
    pub fn new(panel: Arc<VoterPanel>, config: CoordinatorConfig, metrics: Arc<GovernanceMetrics>) -> Self {
        Self { panel, config, metrics }
    }

    pub fn panel(&self) -> &VoterPanel {
        &self.panel
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// One vote per panel member, in panel order.
    ///
    /// Each voter runs in its own task, so a voter that panics is recorded
    /// as an abstention like any other failure.
    pub async fn solicit(&self, request: &EvaluationRequest) -> Vec<Vote> {
        let started = Instant::now();
        let _in_flight = self.metrics.solicitations_in_flight.enter();
        tracing::info!(
            proposal_id = %request.proposal_id,
            voters = self.panel.len(),
            "Soliciting votes"
        );

        let request = Arc::new(request.clone());
        let tasks = self.panel.iter().map(|voter| {
            tokio::spawn(ask(
                voter.clone(),
                request.clone(),
                self.config.clone(),
                self.metrics.clone(),
            ))
        });
        let joined = join_all(tasks).await;

        let votes: Vec<Vote> = self
            .panel
            .iter()
            .zip(joined)
            .map(|(voter, joined)| match joined {
                Ok(vote) => vote,
                Err(e) => {
                    let what = if e.is_panic() { "panicked" } else { "was cancelled" };
                    self.metrics.voter_panics.inc();
                    tracing::error!(
                        proposal_id = %request.proposal_id,
                        voter = %voter.name(),
                        "Voter evaluation {}, recording abstention",
                        what
                    );
                    Vote::failure(
                        voter.name(),
                        self.config.failure_score,
                        &format!("{} did not vote: evaluation {}", voter.name(), what),
                    )
                }
            })
            .collect();

        let elapsed = started.elapsed();
        self.metrics.solicitation_latency.observe(elapsed);
        tracing::info!(
            proposal_id = %request.proposal_id,
            elapsed_ms = elapsed.as_millis() as u64,
            failed = votes.iter().filter(|v| v.is_synthesized()).count(),
            "Solicitation complete"
        );
        votes
    }
}

async fn ask(
    voter: Arc<dyn Voter>,
    request: Arc<EvaluationRequest>,
    config: CoordinatorConfig,
    metrics: Arc<GovernanceMetrics>,
) -> Vote {
    metrics.votes_solicited.inc();

    let verdict = match tokio::time::timeout(config.voter_timeout(), voter.evaluate_proposal(&request)).await {
        Ok(Ok(verdict)) => verdict.validate().map(|_| verdict),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(VoterError::Timeout(config.voter_timeout_ms)),
    };

    match verdict {
        Ok(verdict) => {
            tracing::debug!(
                proposal_id = %request.proposal_id,
                voter = %voter.name(),
                decision = %verdict.decision,
                score = verdict.score,
                "Vote received"
            );
            verdict.into_vote(voter.name())
        }
        Err(e) => {
            if e.is_timeout() {
                metrics.voter_timeouts.inc();
            } else {
                metrics.voter_failures.inc();
            }
            tracing::warn!(
                proposal_id = %request.proposal_id,
                voter = %voter.name(),
                error = %e,
                "Voter failed, recording abstention"
            );
            Vote::failure(
                voter.name(),
                config.failure_score,
                &format!("{} did not vote: {}", voter.name(), e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::risk::RiskLevel;
    use crate::governance::vote::{Decision, VoteOrigin};
    use crate::voting::voter::Verdict;
    use async_trait::async_trait;
    use std::collections::HashMap;

    enum Behavior {
        Answer(Decision, f64),
        Sleep(Duration),
        Fail,
        Panic,
    }

    struct ScriptedVoter {
        name: &'static str,
        behavior: Behavior,
    }

    #[async_trait]
    impl Voter for ScriptedVoter {
        fn name(&self) -> &str {
            self.name
        }

        async fn evaluate_proposal(&self, _request: &EvaluationRequest) -> std::result::Result<Verdict, VoterError> {
            match &self.behavior {
                Behavior::Answer(decision, score) => Ok(Verdict::new(*decision, *score)),
                Behavior::Sleep(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(Verdict::new(Decision::Approve, 3.0))
                }
                Behavior::Fail => Err(VoterError::Failed("model unavailable".to_string())),
                Behavior::Panic => panic!("evaluator crashed"),
            }
        }
    }

    fn coordinator(voters: Vec<ScriptedVoter>, timeout_ms: u64) -> (SolicitationCoordinator, Arc<GovernanceMetrics>) {
        let voters = voters.into_iter().map(|v| Arc::new(v) as Arc<dyn Voter>).collect();
        let metrics = Arc::new(GovernanceMetrics::new());
        let config = CoordinatorConfig {
            voter_timeout_ms: timeout_ms,
            failure_score: 1.5,
        };
        let coordinator = SolicitationCoordinator::new(Arc::new(VoterPanel::new(voters).unwrap()), config, metrics.clone());
        (coordinator, metrics)
    }

    fn request() -> EvaluationRequest {
        EvaluationRequest {
            proposal_id: "p1".into(),
            title: "t".to_string(),
            description: "d".to_string(),
            cost: 75.0,
            risk_level: RiskLevel::Medium,
            context: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_votes_in_panel_order() {
        let (coordinator, metrics) = coordinator(
            vec![
                ScriptedVoter { name: "slow", behavior: Behavior::Sleep(Duration::from_millis(30)) },
                ScriptedVoter { name: "fast", behavior: Behavior::Answer(Decision::Reject, 0.0) },
            ],
            1000,
        );
        let votes = coordinator.solicit(&request()).await;
        let voters: Vec<&str> = votes.iter().map(|v| v.voter.as_str()).collect();
        assert_eq!(voters, vec!["slow", "fast"]);
        assert_eq!(metrics.votes_solicited.get(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_isolated_and_bounded() {
        let (coordinator, metrics) = coordinator(
            vec![
                ScriptedVoter { name: "a", behavior: Behavior::Answer(Decision::Approve, 2.0) },
                ScriptedVoter { name: "b", behavior: Behavior::Sleep(Duration::from_secs(10)) },
                ScriptedVoter { name: "c", behavior: Behavior::Sleep(Duration::from_secs(10)) },
                ScriptedVoter { name: "d", behavior: Behavior::Answer(Decision::Approve, 2.0) },
                ScriptedVoter { name: "e", behavior: Behavior::Sleep(Duration::from_secs(10)) },
            ],
            100,
        );

        let started = Instant::now();
        let votes = coordinator.solicit(&request()).await;
        let elapsed = started.elapsed();

        assert_eq!(votes.len(), 5);
        assert!(elapsed < Duration::from_millis(1000), "took {:?}", elapsed);
        let timed_out: Vec<&Vote> = votes.iter().filter(|v| v.is_synthesized()).collect();
        assert_eq!(timed_out.len(), 3);
        for vote in timed_out {
            assert_eq!(vote.decision, Decision::Abstain);
            assert_eq!(vote.score, 1.5);
            assert!(vote.reasoning[0].contains("timed out"));
        }
        assert_eq!(metrics.voter_timeouts.get(), 3);
    }

    #[tokio::test]
    async fn test_failures_become_abstentions() {
        let (coordinator, metrics) = coordinator(
            vec![
                ScriptedVoter { name: "broken", behavior: Behavior::Fail },
                ScriptedVoter { name: "liar", behavior: Behavior::Answer(Decision::Approve, 9.0) },
                ScriptedVoter { name: "ok", behavior: Behavior::Answer(Decision::Approve, 3.0) },
            ],
            1000,
        );
        let votes = coordinator.solicit(&request()).await;

        assert_eq!(votes[0].origin, VoteOrigin::Synthesized);
        assert!(votes[0].reasoning[0].contains("model unavailable"));
        assert_eq!(votes[1].origin, VoteOrigin::Synthesized);
        assert!(votes[1].reasoning[0].contains("malformed"));
        assert_eq!(votes[2].origin, VoteOrigin::Solicited);
        assert_eq!(metrics.voter_failures.get(), 2);
    }

    #[tokio::test]
    async fn test_panicking_voter_becomes_abstention() {
        let (coordinator, metrics) = coordinator(
            vec![
                ScriptedVoter { name: "fine", behavior: Behavior::Answer(Decision::Approve, 3.0) },
                ScriptedVoter { name: "panicky", behavior: Behavior::Panic },
            ],
            1000,
        );
        let votes = coordinator.solicit(&request()).await;

        assert_eq!(votes.len(), 2);
        assert_eq!(votes[0].voter, "fine");
        assert_eq!(votes[0].origin, VoteOrigin::Solicited);
        assert_eq!(votes[0].score, 3.0);
        assert_eq!(votes[1].voter, "panicky");
        assert_eq!(votes[1].decision, Decision::Abstain);
        assert_eq!(votes[1].score, 1.5);
        assert!(votes[1].reasoning[0].contains("panicked"));
        assert_eq!(metrics.voter_panics.get(), 1);
        assert_eq!(metrics.solicitations_in_flight.get(), 0);
        assert_eq!(metrics.solicitation_latency.count(), 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(CoordinatorConfig::default().validate().is_ok());
        let zero = CoordinatorConfig { voter_timeout_ms: 0, ..Default::default() };
        assert!(zero.validate().is_err());
        let bad_score = CoordinatorConfig { failure_score: 4.0, ..Default::default() };
        assert!(bad_score.validate().is_err());
    }
}
