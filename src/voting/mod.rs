//! Voting Module
//!
//! Panel members and how they are asked:
//! - `Voter` trait with explicit `VoterError` results
//! - Reference rule-based panel members
//! - Bus-backed remote voters and the service that hosts them
//! - Concurrent solicitation with per-voter timeouts

pub mod agents;
pub mod coordinator;
pub mod panel;
pub mod remote;
pub mod voter;

pub use agents::ReferenceVoter;
pub use coordinator::{CoordinatorConfig, SolicitationCoordinator};
pub use panel::{VoterPanel, DEFAULT_PANEL};
pub use remote::{RemoteVoter, VoterService, EVALUATE_SUBJECT};
pub use voter::{EvaluationRequest, Verdict, Voter, VoterError};
