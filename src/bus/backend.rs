//! MessageBus trait definition.
//!
//! Core trait that all bus backends must implement.

use crate::bus::handler::{Subscription, SubscriptionId};
use crate::bus::message::AgentMessage;
use crate::core::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Backend type identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    /// In-process dispatch table
    Memory,
    /// Redis Streams with consumer groups
    Redis,
}

impl std::fmt::Display for BusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusType::Memory => write!(f, "memory"),
            BusType::Redis => write!(f, "redis"),
        }
    }
}

impl FromStr for BusType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BusType::Memory),
            "redis" => Ok(BusType::Redis),
            other => Err(Error::Config(format!("Unknown bus type: {}", other))),
        }
    }
}

/// Core trait for message bus backends.
///
/// A bus instance is the endpoint of one agent identity. It is opened once
/// with `connect`, shared behind an `Arc` by every caller, and closed with
/// `disconnect`.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Identity of the local agent.
    fn agent_id(&self) -> &str;

    /// Open the transport and start delivering to subscriptions.
    async fn connect(&self) -> Result<()>;

    /// Stop delivery and release the transport.
    async fn disconnect(&self) -> Result<()>;

    /// Publish a message.
    async fn publish(&self, message: AgentMessage) -> Result<()>;

    /// Register a subscription for inbound messages.
    async fn subscribe(&self, subscription: Subscription) -> Result<SubscriptionId>;

    /// Remove a subscription.
    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<bool>;

    /// Whether `connect` has completed and `disconnect` has not been called.
    fn is_connected(&self) -> bool;

    /// Get the backend type.
    fn backend_type(&self) -> BusType;
}
