//! Governance event channel.

use crate::core::{ProposalId, Timestamp};
use crate::governance::aggregator::Outcome;
use crate::governance::proposal::ProposalStatus;
use crate::governance::vote::Decision;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Subject resolutions are announced on when a bus is attached.
pub const RESOLVED_SUBJECT: &str = "governance.proposal.resolved";

/// Something that happened to a proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GovernanceEvent {
    ProposalSubmitted {
        id: ProposalId,
        title: String,
        cost: f64,
    },
    VoteRecorded {
        id: ProposalId,
        voter: String,
        decision: Decision,
        score: f64,
    },
    ProposalResolved {
        id: ProposalId,
        status: ProposalStatus,
        outcome: Option<Outcome>,
        final_score: Option<f64>,
        resolved_at: Timestamp,
    },
}

impl GovernanceEvent {
    /// Proposal the event is about.
    pub fn proposal_id(&self) -> &ProposalId {
        match self {
            GovernanceEvent::ProposalSubmitted { id, .. }
            | GovernanceEvent::VoteRecorded { id, .. }
            | GovernanceEvent::ProposalResolved { id, .. } => id,
        }
    }
}

/// Broadcast channel for governance events.
pub struct EventChannel {
    sender: broadcast::Sender<GovernanceEvent>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event. Having no receivers is not an error.
    pub fn emit(&self, event: GovernanceEvent) {
        match self.sender.send(event) {
            Ok(receivers) => tracing::trace!(receivers, "Governance event emitted"),
            Err(_) => tracing::trace!("Governance event emitted with no receivers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let channel = EventChannel::default();
        let mut rx = channel.subscribe();
        channel.emit(GovernanceEvent::ProposalSubmitted {
            id: "p1".into(),
            title: "Buy GPUs".to_string(),
            cost: 75.0,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.proposal_id().as_str(), "p1");
    }

    #[test]
    fn test_emit_without_receivers() {
        let channel = EventChannel::new(4);
        channel.emit(GovernanceEvent::VoteRecorded {
            id: "p1".into(),
            voter: "athena".to_string(),
            decision: Decision::Approve,
            score: 2.0,
        });
    }

    #[test]
    fn test_event_wire_format() {
        let event = GovernanceEvent::VoteRecorded {
            id: "p1".into(),
            voter: "aegis".to_string(),
            decision: Decision::Reject,
            score: 0.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "vote_recorded");
        assert_eq!(json["decision"], "REJECT");
    }
}
