//! The fixed voter panel.

use crate::bus::RequestClient;
use crate::core::{Error, Result};
use crate::voting::agents::ReferenceVoter;
use crate::voting::remote::RemoteVoter;
use crate::voting::voter::Voter;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Default panel, in solicitation order.
pub const DEFAULT_PANEL: &[&str] = &["athena", "hephaestus", "hermes", "nur_prometheus", "aegis"];

/// Ordered set of voters, fixed at construction.
#[derive(Clone)]
pub struct VoterPanel {
    voters: Vec<Arc<dyn Voter>>,
}

impl VoterPanel {
    /// Build a panel. Names must be unique and the panel non-empty.
    pub fn new(voters: Vec<Arc<dyn Voter>>) -> Result<Self> {
        if voters.is_empty() {
            return Err(Error::EmptyPanel);
        }
        let mut seen = HashSet::new();
        for voter in &voters {
            if !seen.insert(voter.name().to_string()) {
                return Err(Error::Validation(format!(
                    "voter {} appears twice in the panel",
                    voter.name()
                )));
            }
        }
        Ok(Self { voters })
    }

    /// In-process reference voters for `names`.
    pub fn reference(names: &[String]) -> Result<Self> {
        let voters = names
            .iter()
            .map(|name| ReferenceVoter::from_name(name).map(|v| Arc::new(v) as Arc<dyn Voter>))
            .collect::<Result<Vec<_>>>()?;
        Self::new(voters)
    }

    /// The default five reference voters.
    pub fn default_reference() -> Self {
        Self {
            voters: ReferenceVoter::ALL
                .iter()
                .map(|v| Arc::new(*v) as Arc<dyn Voter>)
                .collect(),
        }
    }

    /// Voters reached over the bus through `client`.
    pub fn remote(names: &[String], client: Arc<RequestClient>, timeout: Duration) -> Result<Self> {
        let voters = names
            .iter()
            .map(|name| Arc::new(RemoteVoter::new(name, client.clone(), timeout)) as Arc<dyn Voter>)
            .collect();
        Self::new(voters)
    }

    /// Voter names, in order.
    pub fn names(&self) -> Vec<String> {
        self.voters.iter().map(|v| v.name().to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.voters.iter().any(|v| v.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Voter>> {
        self.voters.iter().find(|v| v.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Voter>> {
        self.voters.iter()
    }

    pub fn len(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }
}

impl std::fmt::Debug for VoterPanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoterPanel").field("voters", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_reference_order() {
        let panel = VoterPanel::default_reference();
        assert_eq!(panel.names(), names(DEFAULT_PANEL));
        assert!(panel.contains("aegis"));
        assert!(!panel.contains("zeus"));
    }

    #[test]
    fn test_reference_subset() {
        let panel = VoterPanel::reference(&names(&["hermes", "athena"])).unwrap();
        assert_eq!(panel.len(), 2);
        assert_eq!(panel.names(), names(&["hermes", "athena"]));
    }

    #[test]
    fn test_invalid_panels() {
        assert!(matches!(VoterPanel::new(Vec::new()), Err(Error::EmptyPanel)));
        assert!(matches!(
            VoterPanel::reference(&names(&["athena", "zeus"])),
            Err(Error::UnknownVoter(_))
        ));
        assert!(matches!(
            VoterPanel::reference(&names(&["athena", "athena"])),
            Err(Error::Validation(_))
        ));
    }
}
