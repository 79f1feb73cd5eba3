//! Message bus configuration.
//!
//! Configuration-driven backend selection.

use crate::bus::backend::BusType;
use serde::{Deserialize, Serialize};

/// Message bus configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusConfig {
    /// Backend type to use
    pub backend: BusType,
    /// Local agent identity
    pub agent_id: String,
    /// In-memory specific config
    pub memory: Option<MemoryBusConfig>,
    /// Redis specific config
    pub redis: Option<RedisBusConfig>,
}

impl BusConfig {
    /// In-process bus for `agent_id`.
    pub fn memory(agent_id: &str) -> Self {
        Self {
            backend: BusType::Memory,
            agent_id: agent_id.to_string(),
            memory: Some(MemoryBusConfig::default()),
            redis: None,
        }
    }

    /// Redis Streams bus for `agent_id`.
    pub fn redis(agent_id: &str, url: &str) -> Self {
        Self {
            backend: BusType::Redis,
            agent_id: agent_id.to_string(),
            memory: None,
            redis: Some(RedisBusConfig {
                url: url.to_string(),
                ..Default::default()
            }),
        }
    }

    /// Same settings for another agent identity.
    pub fn for_agent(&self, agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            ..self.clone()
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::memory("coordinator")
    }
}

/// In-memory backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryBusConfig {
    /// Per-endpoint inbox capacity
    pub inbox_capacity: usize,
}

impl Default for MemoryBusConfig {
    fn default() -> Self {
        Self { inbox_capacity: 1024 }
    }
}

/// Redis Streams backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedisBusConfig {
    /// Connection URL
    pub url: String,
    /// Stream key shared by all agents
    pub stream: String,
    /// Consumer group prefix; each agent owns `{prefix}:{agent_id}`
    pub group_prefix: String,
    /// Consumer name inside the group (None = agent id). Replicas of one
    /// agent need distinct names to share work.
    pub consumer: Option<String>,
    /// Approximate stream length cap (bounded retention)
    pub max_len: usize,
    /// Entries fetched per read
    pub batch_size: usize,
    /// Blocking read timeout in milliseconds
    pub block_ms: usize,
    /// Back-off after a failed read, in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for RedisBusConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            stream: "pentarchy:agents:messages".to_string(),
            group_prefix: "pentarchy-agents".to_string(),
            consumer: None,
            max_len: 10_000,
            batch_size: 10,
            block_ms: 1000,
            retry_backoff_ms: 1000,
        }
    }
}

impl RedisBusConfig {
    /// Consumer group owned by an agent.
    pub fn group_for(&self, agent_id: &str) -> String {
        format!("{}:{}", self.group_prefix, agent_id)
    }

    /// Consumer name used by an agent.
    pub fn consumer_for(&self, agent_id: &str) -> String {
        self.consumer.clone().unwrap_or_else(|| agent_id.to_string())
    }
}
