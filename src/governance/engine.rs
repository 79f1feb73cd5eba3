//! Governance engine.
//!
//! Owns the proposal lifecycle: cost gate on submission, concurrent vote
//! solicitation for proposals that need a vote, aggregation on resolution,
//! plus the query surface operators use.

use crate::bus::{AgentMessage, MessageBus};
use crate::core::{Config, Error, ProposalId, Result};
use crate::governance::aggregator::{ConsensusAggregator, ScoringMode};
use crate::governance::analysis::{auto_title, ActionAnalysis, ActionAnalyzer};
use crate::governance::events::{EventChannel, GovernanceEvent, RESOLVED_SUBJECT};
use crate::governance::proposal::{Proposal, ProposalRequest, ProposalStatus, ProposalSummary, Resolution};
use crate::governance::registry::{ProposalFilter, ProposalRegistry};
use crate::governance::risk::{CostGate, GovernancePolicy, RiskLevel, MAX_SCORE};
use crate::governance::vote::{check_score, Decision, Vote, VoteOrigin};
use crate::monitoring::{GovernanceMetrics, MetricsSnapshot};
use crate::voting::coordinator::{CoordinatorConfig, SolicitationCoordinator};
use crate::voting::panel::VoterPanel;
use crate::voting::voter::EvaluationRequest;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Read-only view of the decision tables and panel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub thresholds: BTreeMap<RiskLevel, f64>,
    pub max_score: f64,
    pub panel: Vec<String>,
    pub auto_approve_limit: f64,
    pub human_review_limit: f64,
}

/// A proposal still waiting on votes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingProposal {
    #[serde(flatten)]
    pub summary: ProposalSummary,
    pub votes_collected: usize,
    pub votes_needed: usize,
}

/// Aggregate governance statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GovernanceStats {
    pub total_proposals: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub escalated: usize,
    /// Approved within the review margin
    pub requires_review: usize,
    /// Mean final score; proposals without one count as 0
    pub average_score: f64,
    pub total_votes: usize,
    pub metrics: MetricsSnapshot,
}

/// The proposal state machine.
#[derive(Clone)]
pub struct GovernanceEngine {
    policy: GovernancePolicy,
    panel: Arc<VoterPanel>,
    coordinator: Arc<SolicitationCoordinator>,
    aggregator: ConsensusAggregator,
    registry: Arc<ProposalRegistry>,
    events: Arc<EventChannel>,
    analyzer: Arc<ActionAnalyzer>,
    metrics: Arc<GovernanceMetrics>,
    bus: Option<Arc<dyn MessageBus>>,
}

impl GovernanceEngine {
    /// Create a new engine with its own empty registry.
    pub fn new(policy: GovernancePolicy, panel: VoterPanel, coordinator: CoordinatorConfig) -> Result<Self> {
        policy.validate()?;
        coordinator.validate()?;
        if panel.is_empty() {
            return Err(Error::EmptyPanel);
        }

        let panel = Arc::new(panel);
        let metrics = Arc::new(GovernanceMetrics::new());
        Ok(Self {
            analyzer: Arc::new(ActionAnalyzer::new(policy.clone())?),
            aggregator: ConsensusAggregator::new(panel.len(), ScoringMode::Weighted),
            coordinator: Arc::new(SolicitationCoordinator::new(panel.clone(), coordinator, metrics.clone())),
            registry: Arc::new(ProposalRegistry::new()),
            events: Arc::new(EventChannel::default()),
            policy,
            panel,
            metrics,
            bus: None,
        })
    }

    /// Create from process configuration.
    pub fn from_config(config: &Config, panel: VoterPanel) -> Result<Self> {
        Self::new(config.governance.clone(), panel, config.coordinator.clone())
    }

    /// Announce resolutions on `bus`.
    pub fn with_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn policy(&self) -> &GovernancePolicy {
        &self.policy
    }

    pub fn panel(&self) -> &VoterPanel {
        &self.panel
    }

    pub fn metrics(&self) -> &Arc<GovernanceMetrics> {
        &self.metrics
    }

    /// Create a proposal. Votes, when needed, are solicited in the background.
    pub async fn submit(&self, request: ProposalRequest) -> Result<ProposalId> {
        let (id, gate) = self.admit(request).await?;
        if gate == CostGate::Vote {
            let round = self.spawn_vote(&id);
            tokio::spawn(self.clone().escalate_on_failure(id.clone(), round));
        }
        Ok(id)
    }

    fn spawn_vote(&self, id: &ProposalId) -> JoinHandle<Result<Proposal>> {
        let engine = self.clone();
        let id = id.clone();
        tokio::spawn(async move { engine.run_vote(&id).await })
    }

    /// Wait for a background vote round. If it errors or panics the proposal
    /// is escalated so it never stays PENDING.
    async fn escalate_on_failure(self, id: ProposalId, round: JoinHandle<Result<Proposal>>) {
        let reason = match round.await {
            Ok(Ok(_)) => return,
            Ok(Err(e)) => e.to_string(),
            Err(e) if e.is_panic() => "vote round panicked".to_string(),
            Err(_) => "vote round was cancelled".to_string(),
        };

        self.metrics.failed_rounds.inc();
        tracing::error!(proposal_id = %id, reason = %reason, "Vote round failed, escalating");
        if let Err(e) = self
            .finish_without_vote(&id, ProposalStatus::Escalated, Resolution::RoundFailed { reason })
            .await
        {
            tracing::error!(proposal_id = %id, error = %e, "Could not escalate failed round");
        }
    }

    /// Create a proposal and wait for it to reach a terminal status.
    pub async fn submit_and_resolve(&self, request: ProposalRequest) -> Result<Proposal> {
        let (id, gate) = self.admit(request).await?;
        if gate == CostGate::Vote {
            let round = self.spawn_vote(&id);
            self.clone().escalate_on_failure(id.clone(), round).await;
        }
        self.registry.get(&id).await
    }

    async fn admit(&self, request: ProposalRequest) -> Result<(ProposalId, CostGate)> {
        request.validate()?;

        // 1. Classify, honoring an explicit override
        let risk_level = request
            .risk_level
            .unwrap_or_else(|| self.policy.classify(request.cost));
        let threshold = self.policy.threshold_for(risk_level);
        let proposal = Proposal::new(request, risk_level, threshold);
        let id = proposal.id.clone();
        let (title, cost) = (proposal.title.clone(), proposal.cost);

        // 2. Store as PENDING
        self.registry.insert(proposal).await?;
        self.metrics.proposals_submitted.inc();
        tracing::info!(
            proposal_id = %id,
            cost,
            risk_level = %risk_level,
            threshold,
            "Proposal submitted"
        );
        self.events.emit(GovernanceEvent::ProposalSubmitted {
            id: id.clone(),
            title,
            cost,
        });

        // 3. Cost gate, always on cost regardless of the tier override
        let gate = self.policy.gate(cost);
        match gate {
            CostGate::AutoApprove => {
                self.metrics.auto_approved.inc();
                self.finish_without_vote(
                    &id,
                    ProposalStatus::Approved,
                    Resolution::AutoApproved {
                        limit: self.policy.auto_approve_limit,
                    },
                )
                .await?;
            }
            CostGate::HumanReview => {
                self.metrics.auto_escalated.inc();
                self.finish_without_vote(
                    &id,
                    ProposalStatus::Escalated,
                    Resolution::HumanReviewRequired {
                        limit: self.policy.human_review_limit,
                    },
                )
                .await?;
            }
            CostGate::Vote => {}
        }
        Ok((id, gate))
    }

    async fn finish_without_vote(&self, id: &ProposalId, status: ProposalStatus, resolution: Resolution) -> Result<()> {
        let resolved = self
            .registry
            .update(id, |proposal| {
                Ok(proposal.auto_resolve(status, resolution).then(|| proposal.clone()))
            })
            .await?;
        if let Some(proposal) = resolved {
            self.announce(&proposal).await;
        }
        Ok(())
    }

    /// Solicit the panel, record its votes, then resolve.
    async fn run_vote(&self, id: &ProposalId) -> Result<Proposal> {
        let request = EvaluationRequest::from_proposal(&self.registry.get(id).await?);
        let votes = self.coordinator.solicit(&request).await;

        // Synthesized abstentions are recorded like real votes
        let recorded = self
            .registry
            .update(id, |proposal| {
                let mut recorded = Vec::with_capacity(votes.len());
                for vote in votes {
                    match proposal.record_vote(vote.clone()) {
                        Ok(_) => recorded.push(vote),
                        Err(Error::InvalidState { .. }) => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(recorded)
            })
            .await?;
        for vote in &recorded {
            self.vote_recorded(id, vote);
        }

        self.resolve(id).await
    }

    /// Record or replace a vote by hand. Resolves once every panel member has voted.
    pub async fn record_vote(&self, id: &ProposalId, voter: &str, decision: Decision, score: f64) -> Result<Proposal> {
        check_score(score)?;
        if !self.panel.contains(voter) {
            return Err(Error::UnknownVoter(voter.to_string()));
        }

        let vote = Vote::manual(voter, decision, score);
        let panel = self.panel.names();
        let complete = self
            .registry
            .update(id, |proposal| {
                proposal.record_vote(vote.clone())?;
                Ok(panel.iter().all(|name| proposal.vote_of(name).is_some()))
            })
            .await?;
        self.vote_recorded(id, &vote);

        if complete {
            self.resolve(id).await
        } else {
            self.registry.get(id).await
        }
    }

    fn vote_recorded(&self, id: &ProposalId, vote: &Vote) {
        tracing::debug!(
            proposal_id = %id,
            voter = %vote.voter,
            decision = %vote.decision,
            score = vote.score,
            manual = vote.origin == VoteOrigin::Manual,
            "Vote recorded"
        );
        self.events.emit(GovernanceEvent::VoteRecorded {
            id: id.clone(),
            voter: vote.voter.clone(),
            decision: vote.decision,
            score: vote.score,
        });
    }

    /// Aggregate the recorded votes. A no-op on a resolved proposal.
    pub async fn resolve(&self, id: &ProposalId) -> Result<Proposal> {
        let aggregator = &self.aggregator;
        let (proposal, changed) = self
            .registry
            .update(id, |proposal| {
                if proposal.is_resolved() {
                    return Ok((proposal.clone(), false));
                }
                let tally = aggregator.aggregate(&proposal.collect_votes(), proposal.threshold);
                let changed = proposal.apply_tally(&tally);
                Ok((proposal.clone(), changed))
            })
            .await?;

        if changed {
            if let Some(outcome) = proposal.outcome {
                self.metrics.record_outcome(outcome);
            }
            self.announce(&proposal).await;
        }
        Ok(proposal)
    }

    async fn announce(&self, proposal: &Proposal) {
        let Some(resolved_at) = proposal.resolved_at else {
            return;
        };
        tracing::info!(
            proposal_id = %proposal.id,
            status = %proposal.status,
            final_score = ?proposal.final_score,
            threshold = proposal.threshold,
            votes = proposal.vote_count(),
            "Proposal resolved"
        );

        let event = GovernanceEvent::ProposalResolved {
            id: proposal.id.clone(),
            status: proposal.status,
            outcome: proposal.outcome,
            final_score: proposal.final_score,
            resolved_at,
        };

        if let Some(bus) = &self.bus {
            match serde_json::to_value(&event) {
                Ok(payload) => {
                    let message = AgentMessage::event(bus.agent_id(), RESOLVED_SUBJECT, payload);
                    if let Err(e) = bus.publish(message).await {
                        tracing::warn!(proposal_id = %proposal.id, error = %e, "Failed to announce resolution");
                    }
                }
                Err(e) => tracing::warn!(proposal_id = %proposal.id, error = %e, "Failed to encode resolution"),
            }
        }
        self.events.emit(event);
    }

    /// Analyze a free-form action and submit a proposal if it needs a vote.
    pub async fn auto_propose(
        &self,
        message: &str,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<(ActionAnalysis, Option<ProposalId>)> {
        let analysis = self.analyzer.analyze(message);
        if !analysis.requires_voting {
            tracing::debug!(
                action_type = %analysis.action_type,
                estimated_cost = analysis.estimated_cost,
                "Action below voting limit"
            );
            return Ok((analysis, None));
        }

        let mut request = ProposalRequest::new(&auto_title(&analysis), message, analysis.estimated_cost)
            .with_context("auto_generated", serde_json::Value::Bool(true));
        for (key, value) in context {
            if key != "auto_generated" {
                request = request.with_context(&key, value);
            }
        }

        let id = self.submit(request).await?;
        Ok((analysis, Some(id)))
    }

    /// Analyze a message without submitting anything.
    pub fn analyze_action(&self, message: &str) -> ActionAnalysis {
        self.analyzer.analyze(message)
    }

    pub async fn get_proposal(&self, id: &ProposalId) -> Result<Proposal> {
        self.registry.get(id).await
    }

    pub async fn list_proposals(&self, filter: &ProposalFilter) -> Vec<ProposalSummary> {
        self.registry.list(filter).await
    }

    /// Pending proposals with their vote progress, newest first.
    pub async fn pending_proposals(&self) -> Vec<PendingProposal> {
        let mut pending: Vec<Proposal> = self
            .registry
            .all()
            .await
            .into_iter()
            .filter(|p| !p.is_resolved())
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        pending
            .iter()
            .map(|p| PendingProposal {
                summary: p.summary(),
                votes_collected: p.vote_count(),
                votes_needed: self.panel.len().saturating_sub(p.vote_count()),
            })
            .collect()
    }

    pub async fn stats(&self) -> GovernanceStats {
        let proposals = self.registry.all().await;
        let count = |status: ProposalStatus| proposals.iter().filter(|p| p.status == status).count();
        let total_score: f64 = proposals.iter().filter_map(|p| p.final_score).sum();

        GovernanceStats {
            total_proposals: proposals.len(),
            pending: count(ProposalStatus::Pending),
            approved: count(ProposalStatus::Approved),
            rejected: count(ProposalStatus::Rejected),
            escalated: count(ProposalStatus::Escalated),
            requires_review: proposals.iter().filter(|p| p.requires_review()).count(),
            average_score: if proposals.is_empty() {
                0.0
            } else {
                total_score / proposals.len() as f64
            },
            total_votes: proposals.iter().map(Proposal::vote_count).sum(),
            metrics: self.metrics.snapshot(),
        }
    }

    pub fn thresholds(&self) -> ThresholdReport {
        ThresholdReport {
            thresholds: self.policy.thresholds.to_map(),
            max_score: MAX_SCORE,
            panel: self.panel.names(),
            auto_approve_limit: self.policy.auto_approve_limit,
            human_review_limit: self.policy.human_review_limit,
        }
    }

    /// Receive governance events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.events.subscribe()
    }

    /// Wait until a proposal reaches a terminal status.
    pub async fn wait_for_resolution(&self, id: &ProposalId, timeout: Duration) -> Result<Proposal> {
        let events = self.subscribe();
        tokio::time::timeout(timeout, self.resolved(id, events))
            .await
            .map_err(|_| Error::ResolutionTimeout(id.to_string()))?
    }

    async fn resolved(&self, id: &ProposalId, mut events: broadcast::Receiver<GovernanceEvent>) -> Result<Proposal> {
        loop {
            let proposal = self.registry.get(id).await?;
            if proposal.is_resolved() {
                return Ok(proposal);
            }
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::Internal("governance event channel closed".to_string()));
                }
            }
        }
    }
}

impl std::fmt::Debug for GovernanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernanceEngine")
            .field("policy", &self.policy)
            .field("panel", &self.panel)
            .field("bus", &self.bus.as_ref().map(|bus| bus.agent_id().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{create_memory_bus, InMemoryHub, Subscription};
    use crate::governance::aggregator::Outcome;
    use crate::voting::voter::{Verdict, Voter, VoterError};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct FixedVoter {
        name: String,
        verdict: Option<Verdict>,
        delay: Duration,
    }

    #[async_trait]
    impl Voter for FixedVoter {
        fn name(&self) -> &str {
            &self.name
        }

        async fn evaluate_proposal(&self, _request: &EvaluationRequest) -> std::result::Result<Verdict, VoterError> {
            tokio::time::sleep(self.delay).await;
            self.verdict
                .clone()
                .ok_or_else(|| VoterError::Transport("unreachable".to_string()))
        }
    }

    fn voter(name: &str, decision: Decision, score: f64) -> Arc<dyn Voter> {
        Arc::new(FixedVoter {
            name: name.to_string(),
            verdict: Some(Verdict::new(decision, score)),
            delay: Duration::ZERO,
        })
    }

    fn failing(name: &str) -> Arc<dyn Voter> {
        Arc::new(FixedVoter {
            name: name.to_string(),
            verdict: None,
            delay: Duration::ZERO,
        })
    }

    fn engine(voters: Vec<Arc<dyn Voter>>) -> GovernanceEngine {
        let config = CoordinatorConfig {
            voter_timeout_ms: 200,
            failure_score: 1.5,
        };
        GovernanceEngine::new(GovernancePolicy::default(), VoterPanel::new(voters).unwrap(), config).unwrap()
    }

    fn request(cost: f64) -> ProposalRequest {
        ProposalRequest::new("Team monitors", "Buy two monitors for the design team", cost)
    }

    #[tokio::test]
    async fn test_below_floor_auto_approves() {
        let engine = engine(vec![voter("a", Decision::Reject, 0.0)]);
        let proposal = engine.submit_and_resolve(request(49.99)).await.unwrap();

        assert_eq!(proposal.status, ProposalStatus::Approved);
        assert_eq!(proposal.vote_count(), 0);
        assert_eq!(proposal.final_score, None);
        assert_eq!(proposal.resolution, Some(Resolution::AutoApproved { limit: 50.0 }));
        assert_eq!(engine.metrics().auto_approved.get(), 1);
    }

    #[tokio::test]
    async fn test_above_ceiling_escalates() {
        let engine = engine(vec![voter("a", Decision::Approve, 3.0)]);
        let id = engine.submit(request(150.0)).await.unwrap();
        let proposal = engine.get_proposal(&id).await.unwrap();

        assert_eq!(proposal.status, ProposalStatus::Escalated);
        assert_eq!(proposal.vote_count(), 0);
        assert_eq!(proposal.final_score, None);
        assert_eq!(proposal.risk_level, RiskLevel::High);
    }

    #[tokio::test]
    async fn test_medium_scenario_approves() {
        let engine = engine(vec![
            voter("athena", Decision::Approve, 2.0),
            voter("hephaestus", Decision::Approve, 2.0),
            voter("hermes", Decision::Approve, 2.0),
            voter("nur_prometheus", Decision::Reject, 0.0),
            voter("aegis", Decision::Abstain, 1.5),
        ]);
        let proposal = engine.submit_and_resolve(request(75.0)).await.unwrap();

        assert_eq!(proposal.risk_level, RiskLevel::Medium);
        assert_eq!(proposal.threshold, 2.0);
        assert_eq!(proposal.status, ProposalStatus::Approved);
        assert_eq!(proposal.final_score, Some(5.0));
        assert_eq!(proposal.vote_count(), 5);
        assert!(proposal.resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_all_voters_failing_escalates() {
        let engine = engine(vec![failing("a"), failing("b"), failing("c")]);
        let proposal = engine.submit_and_resolve(request(75.0)).await.unwrap();

        assert_eq!(proposal.status, ProposalStatus::Escalated);
        assert_eq!(
            proposal.resolution,
            Some(Resolution::Consensus {
                outcome: Outcome::Escalated
            })
        );
        assert_eq!(proposal.final_score, Some(0.0));
        assert_eq!(proposal.vote_count(), 3);
        for vote in proposal.votes() {
            assert!(vote.is_synthesized());
            assert_eq!(vote.decision, Decision::Abstain);
            assert!(vote.reasoning[0].contains("unreachable"));
        }
        assert_eq!(engine.metrics().voter_failures.get(), 3);
    }

    struct PanickingVoter;

    #[async_trait]
    impl Voter for PanickingVoter {
        fn name(&self) -> &str {
            "panicky"
        }

        async fn evaluate_proposal(&self, _request: &EvaluationRequest) -> std::result::Result<Verdict, VoterError> {
            panic!("evaluator crashed")
        }
    }

    #[tokio::test]
    async fn test_panicking_voter_does_not_stall_proposal() {
        let engine = engine(vec![voter("fine", Decision::Approve, 3.0), Arc::new(PanickingVoter)]);
        let id = engine.submit(request(75.0)).await.unwrap();
        let proposal = engine.wait_for_resolution(&id, Duration::from_secs(2)).await.unwrap();

        assert!(proposal.status.is_terminal());
        assert_eq!(proposal.status, ProposalStatus::Approved);
        assert_eq!(proposal.vote_count(), 2);
        assert_eq!(proposal.final_score, Some(3.0));
        let panicky = proposal.vote_of("panicky").unwrap();
        assert!(panicky.is_synthesized());
        assert!(panicky.reasoning[0].contains("panicked"));
        assert_eq!(engine.metrics().voter_panics.get(), 1);
    }

    async fn crashed_round() -> Result<Proposal> {
        panic!("round crashed")
    }

    async fn failed_round() -> Result<Proposal> {
        Err(Error::Internal("registry offline".to_string()))
    }

    #[tokio::test]
    async fn test_failed_round_escalates() {
        let engine = engine(vec![voter("a", Decision::Approve, 3.0)]);

        let (crashed, _) = engine.admit(request(75.0)).await.unwrap();
        engine
            .clone()
            .escalate_on_failure(crashed.clone(), tokio::spawn(crashed_round()))
            .await;
        let proposal = engine.get_proposal(&crashed).await.unwrap();
        assert_eq!(proposal.status, ProposalStatus::Escalated);
        assert_eq!(
            proposal.resolution,
            Some(Resolution::RoundFailed {
                reason: "vote round panicked".to_string()
            })
        );

        let (failed, _) = engine.admit(request(75.0)).await.unwrap();
        engine
            .clone()
            .escalate_on_failure(failed.clone(), tokio::spawn(failed_round()))
            .await;
        let proposal = engine.get_proposal(&failed).await.unwrap();
        assert_eq!(proposal.status, ProposalStatus::Escalated);
        assert!(matches!(
            proposal.resolution,
            Some(Resolution::RoundFailed { ref reason }) if reason.contains("registry offline")
        ));
        assert_eq!(engine.metrics().failed_rounds.get(), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_records_abstention() {
        let engine = engine(vec![voter("a", Decision::Approve, 1.6), failing("b")]);
        let proposal = engine.submit_and_resolve(request(75.0)).await.unwrap();

        let abstained = proposal.vote_of("b").unwrap();
        assert_eq!(abstained.decision, Decision::Abstain);
        assert!(abstained.is_synthesized());
        assert_eq!(proposal.final_score, Some(1.6));
        assert_eq!(proposal.outcome, Some(Outcome::ApprovedWithReview));
        assert!(proposal.requires_review());
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let engine = engine(vec![voter("a", Decision::Reject, 0.0)]);
        let first = engine.submit_and_resolve(request(75.0)).await.unwrap();
        assert_eq!(first.status, ProposalStatus::Rejected);

        let second = engine.resolve(&first.id).await.unwrap();
        assert_eq!(second.status, first.status);
        assert_eq!(second.final_score, first.final_score);
        assert_eq!(second.resolved_at, first.resolved_at);
        assert_eq!(engine.metrics().resolved.get(Outcome::Rejected), 1);
    }

    #[tokio::test]
    async fn test_manual_votes_resolve_when_panel_complete() {
        let slow = |name: &str| -> Arc<dyn Voter> {
            Arc::new(FixedVoter {
                name: name.to_string(),
                verdict: Some(Verdict::new(Decision::Approve, 3.0)),
                delay: Duration::from_secs(60),
            })
        };
        let engine = GovernanceEngine::new(
            GovernancePolicy::default(),
            VoterPanel::new(vec![slow("a"), slow("b")]).unwrap(),
            CoordinatorConfig::default(),
        )
        .unwrap();
        let id = engine.submit(request(75.0)).await.unwrap();

        let after_one = engine.record_vote(&id, "a", Decision::Approve, 3.0).await.unwrap();
        assert_eq!(after_one.status, ProposalStatus::Pending);

        let replaced = engine.record_vote(&id, "a", Decision::Reject, 0.0).await.unwrap();
        assert_eq!(replaced.vote_of("a").unwrap().decision, Decision::Reject);
        assert_eq!(replaced.vote_count(), 1);

        let done = engine.record_vote(&id, "b", Decision::Reject, 0.0).await.unwrap();
        assert_eq!(done.status, ProposalStatus::Rejected);

        let late = engine.record_vote(&id, "b", Decision::Approve, 3.0).await;
        assert!(matches!(late, Err(Error::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_record_vote_validation() {
        let engine = engine(vec![voter("a", Decision::Approve, 3.0)]);
        let id = engine.submit(request(40.0)).await.unwrap();

        assert!(matches!(
            engine.record_vote(&id, "a", Decision::Approve, 3.5).await,
            Err(Error::ScoreOutOfRange(_))
        ));
        assert!(matches!(
            engine.record_vote(&id, "zeus", Decision::Approve, 1.0).await,
            Err(Error::UnknownVoter(_))
        ));
        assert!(matches!(
            engine.record_vote(&"missing".into(), "a", Decision::Approve, 1.0).await,
            Err(Error::ProposalNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_cost_creates_nothing() {
        let engine = engine(vec![voter("a", Decision::Approve, 3.0)]);
        assert!(matches!(engine.submit(request(-1.0)).await, Err(Error::InvalidCost(_))));
        assert_eq!(engine.stats().await.total_proposals, 0);
    }

    #[tokio::test]
    async fn test_risk_override_changes_threshold_not_gate() {
        let engine = engine(vec![voter("a", Decision::Approve, 2.6)]);
        let proposal = engine
            .submit_and_resolve(request(75.0).with_risk_level(RiskLevel::Critical))
            .await
            .unwrap();
        assert!(proposal.risk_overridden);
        assert_eq!(proposal.threshold, 2.8);
        assert_eq!(proposal.vote_count(), 1);
        assert!(proposal.requires_review());

        let cheap = engine
            .submit_and_resolve(request(10.0).with_risk_level(RiskLevel::Critical))
            .await
            .unwrap();
        assert_eq!(cheap.resolution, Some(Resolution::AutoApproved { limit: 50.0 }));
    }

    #[tokio::test]
    async fn test_wait_for_background_resolution() {
        let engine = engine(vec![voter("a", Decision::Approve, 3.0)]);
        let mut events = engine.subscribe();
        let id = engine.submit(request(75.0)).await.unwrap();

        let proposal = engine.wait_for_resolution(&id, Duration::from_secs(2)).await.unwrap();
        assert_eq!(proposal.status, ProposalStatus::Approved);

        let first = events.recv().await.unwrap();
        assert!(matches!(first, GovernanceEvent::ProposalSubmitted { .. }));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let engine = GovernanceEngine::new(
            GovernancePolicy::default(),
            VoterPanel::new(vec![Arc::new(FixedVoter {
                name: "a".to_string(),
                verdict: None,
                delay: Duration::from_secs(60),
            }) as Arc<dyn Voter>])
            .unwrap(),
            CoordinatorConfig::default(),
        )
        .unwrap();
        let id = engine.submit(request(75.0)).await.unwrap();
        let result = engine.wait_for_resolution(&id, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::ResolutionTimeout(_))));
    }

    #[tokio::test]
    async fn test_queries() {
        let engine = engine(vec![voter("a", Decision::Approve, 3.0), voter("b", Decision::Approve, 3.0)]);
        engine.submit_and_resolve(request(10.0)).await.unwrap();
        engine.submit_and_resolve(request(75.0)).await.unwrap();
        engine.submit_and_resolve(request(500.0)).await.unwrap();

        let stats = engine.stats().await;
        assert_eq!(stats.total_proposals, 3);
        assert_eq!(stats.approved, 2);
        assert_eq!(stats.escalated, 1);
        assert_eq!(stats.total_votes, 2);
        assert_eq!(stats.average_score, 2.0);
        assert_eq!(stats.metrics.proposals_submitted, 3);

        let escalated = engine.list_proposals(&ProposalFilter::status(ProposalStatus::Escalated)).await;
        assert_eq!(escalated.len(), 1);
        assert!(engine.pending_proposals().await.is_empty());

        let report = engine.thresholds();
        assert_eq!(report.thresholds[&RiskLevel::Medium], 2.0);
        assert_eq!(report.max_score, 3.0);
        assert_eq!(report.panel, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_auto_propose() {
        let engine = engine(vec![voter("a", Decision::Approve, 3.0)]);

        let (analysis, id) = engine.auto_propose("remove a stale label", HashMap::new()).await.unwrap();
        assert!(!analysis.requires_voting);
        assert!(id.is_none());

        let (analysis, id) = engine
            .auto_propose("purchase a license for $75", HashMap::new())
            .await
            .unwrap();
        assert!(analysis.requires_voting);
        let proposal = engine.get_proposal(&id.unwrap()).await.unwrap();
        assert_eq!(proposal.title, "Auto-generated: Purchase Action");
        assert_eq!(proposal.cost, 75.0);
        assert_eq!(proposal.context["auto_generated"], serde_json::Value::Bool(true));
    }

    #[tokio::test]
    async fn test_resolution_announced_on_bus() {
        let hub = InMemoryHub::new();
        let bus = create_memory_bus("coordinator", &hub).await.unwrap();
        let observer = create_memory_bus("observer", &hub).await.unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        observer
            .subscribe(Subscription::new(RESOLVED_SUBJECT, move |message: AgentMessage| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(message).await;
                    Ok::<_, Error>(None::<serde_json::Value>)
                }
            }))
            .await
            .unwrap();

        let engine = engine(vec![voter("a", Decision::Approve, 3.0)]).with_bus(bus);
        let proposal = engine.submit_and_resolve(request(20.0)).await.unwrap();

        let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let event: GovernanceEvent = serde_json::from_value(message.payload).unwrap();
        assert_eq!(event.proposal_id(), &proposal.id);
    }
}
