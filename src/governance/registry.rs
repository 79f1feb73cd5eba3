//! Proposal storage.

use crate::core::{Error, ProposalId, Result};
use crate::governance::proposal::{Proposal, ProposalStatus, ProposalSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Listing filter.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProposalFilter {
    /// Only this status
    pub status: Option<ProposalStatus>,
    /// Page size (None = all)
    pub limit: Option<usize>,
    /// Entries to skip
    pub offset: usize,
}

impl ProposalFilter {
    /// Filter by status.
    pub fn status(status: ProposalStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Set page size and offset.
    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

/// In-memory proposal store, owned by one engine.
#[derive(Default)]
pub struct ProposalRegistry {
    proposals: RwLock<HashMap<ProposalId, Proposal>>,
}

impl ProposalRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new proposal. Ids must be unique.
    pub async fn insert(&self, proposal: Proposal) -> Result<()> {
        let mut proposals = self.proposals.write().await;
        if proposals.contains_key(&proposal.id) {
            return Err(Error::Validation(format!(
                "Proposal {} already exists",
                proposal.id
            )));
        }
        proposals.insert(proposal.id.clone(), proposal);
        Ok(())
    }

    /// Snapshot of a proposal.
    pub async fn get(&self, id: &ProposalId) -> Result<Proposal> {
        self.proposals
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ProposalNotFound(id.to_string()))
    }

    /// Mutate a proposal under the write lock.
    pub async fn update<T>(
        &self,
        id: &ProposalId,
        f: impl FnOnce(&mut Proposal) -> Result<T>,
    ) -> Result<T> {
        let mut proposals = self.proposals.write().await;
        let proposal = proposals
            .get_mut(id)
            .ok_or_else(|| Error::ProposalNotFound(id.to_string()))?;
        f(proposal)
    }

    /// Summaries matching a filter, newest first.
    pub async fn list(&self, filter: &ProposalFilter) -> Vec<ProposalSummary> {
        let proposals = self.proposals.read().await;
        let mut matching: Vec<&Proposal> = proposals
            .values()
            .filter(|p| filter.status.map_or(true, |status| p.status == status))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .map(Proposal::summary)
            .collect()
    }

    /// Snapshots of every proposal.
    pub async fn all(&self) -> Vec<Proposal> {
        self.proposals.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.proposals.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.proposals.read().await.is_empty()
    }
}
