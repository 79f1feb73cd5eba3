//! Governance Module
//!
//! The proposal side of the engine:
//! - Risk tiers, approval thresholds and the cost gate
//! - Vote aggregation with a count-based tie-break
//! - Proposal lifecycle, registry and events
//! - Keyword-based action analysis for auto-generated proposals

pub mod aggregator;
pub mod analysis;
pub mod engine;
pub mod events;
pub mod proposal;
pub mod registry;
pub mod risk;
pub mod vote;

pub use aggregator::{ConsensusAggregator, Outcome, ScoringMode, Tally};
pub use analysis::{ActionAnalysis, ActionAnalyzer};
pub use engine::{GovernanceEngine, GovernanceStats, PendingProposal, ThresholdReport};
pub use events::{EventChannel, GovernanceEvent, RESOLVED_SUBJECT};
pub use proposal::{Proposal, ProposalRequest, ProposalStatus, ProposalSummary, Resolution};
pub use registry::{ProposalFilter, ProposalRegistry};
pub use risk::{CostGate, GovernancePolicy, RiskLevel, ThresholdTable, MAX_SCORE};
pub use vote::{Decision, Vote, VoteOrigin};
