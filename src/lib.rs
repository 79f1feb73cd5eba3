//! # Pentarchy - multi-agent governance consensus
//!
//! Decides whether a costed action may proceed:
//! - **Cost gate**: cheap actions are approved and expensive ones escalated without a vote
//! - **Panel vote**: everything in between is put to a fixed panel of voters, concurrently
//! - **Aggregation**: weighted scores against a risk-tiered threshold, with a count tie-break
//! - **Message bus**: voters can run as separate processes over Redis Streams
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pentarchy::governance::{GovernanceEngine, GovernancePolicy, ProposalRequest};
//! use pentarchy::voting::{CoordinatorConfig, VoterPanel};
//!
//! #[tokio::main]
//! async fn main() -> pentarchy::Result<()> {
//!     let engine = GovernanceEngine::new(
//!         GovernancePolicy::default(),
//!         VoterPanel::default_reference(),
//!         CoordinatorConfig::default(),
//!     )?;
//!     let proposal = engine
//!         .submit_and_resolve(ProposalRequest::new("Monitors", "Two monitors for the design team", 75.0))
//!         .await?;
//!     println!("{}: {:?}", proposal.status, proposal.final_score);
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod core;
pub mod governance;
pub mod monitoring;
pub mod voting;

pub use core::error::{Error, Result};
pub use governance::{GovernanceEngine, Proposal, ProposalRequest, ProposalStatus};
pub use voting::{Voter, VoterPanel};
