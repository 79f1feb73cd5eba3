//! Subscription table and message dispatch.
//!
//! Shared by every backend so that target filtering, TTL enforcement and the
//! automatic request/response wrapping behave identically regardless of the
//! transport.

use crate::bus::message::{AgentMessage, MessageType};
use crate::bus::subject::SubjectPattern;
use crate::core::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Handles messages delivered to a subscription.
///
/// Returning `Some(payload)` for a REQUEST makes the bus publish a RESPONSE
/// carrying that payload back to the requester. Return values for other
/// message types are ignored.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: AgentMessage) -> Result<Option<serde_json::Value>>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(AgentMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<serde_json::Value>>> + Send + 'static,
{
    async fn handle(&self, message: AgentMessage) -> Result<Option<serde_json::Value>> {
        (self)(message).await
    }
}

/// Identifier returned by `subscribe`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A subject pattern bound to a handler.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    /// Subject pattern
    pub pattern: SubjectPattern,
    /// Accepted message types (None = all)
    pub message_types: Option<Vec<MessageType>>,
    handler: Arc<dyn MessageHandler>,
}

impl Subscription {
    /// Subscribe `handler` to every message type on `pattern`.
    pub fn new(pattern: impl Into<SubjectPattern>, handler: impl MessageHandler + 'static) -> Self {
        Self {
            id: SubscriptionId::generate(),
            pattern: pattern.into(),
            message_types: None,
            handler: Arc::new(handler),
        }
    }

    /// Restrict the subscription to some message types.
    pub fn only(mut self, types: &[MessageType]) -> Self {
        self.message_types = Some(types.to_vec());
        self
    }

    /// Subscription id.
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Check if the subscription wants a message.
    pub fn matches(&self, message: &AgentMessage) -> bool {
        if let Some(types) = &self.message_types {
            if !types.contains(&message.message_type) {
                return false;
            }
        }
        self.pattern.matches(&message.subject)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("message_types", &self.message_types)
            .finish()
    }
}

/// Per-agent subscription table.
pub struct Dispatcher {
    agent_id: String,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl Dispatcher {
    /// Create a dispatcher for a local agent identity.
    pub fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Local agent identity.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Register a subscription.
    pub async fn add(&self, subscription: Subscription) -> SubscriptionId {
        let id = subscription.id().clone();
        tracing::debug!(
            agent = %self.agent_id,
            pattern = %subscription.pattern,
            "Registered handler"
        );
        self.subscriptions.write().await.push(subscription);
        id
    }

    /// Remove a subscription. Returns false when unknown.
    pub async fn remove(&self, id: &SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id() != id);
        subscriptions.len() != before
    }

    /// Number of active subscriptions.
    pub async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Whether there are no subscriptions.
    pub async fn is_empty(&self) -> bool {
        self.subscriptions.read().await.is_empty()
    }

    /// Whether an inbound message should reach local handlers at all.
    pub fn accepts(&self, message: &AgentMessage) -> bool {
        if message.source == self.agent_id {
            return false;
        }
        if !message.is_addressed_to(&self.agent_id) {
            return false;
        }
        if message.is_expired() {
            tracing::debug!(
                agent = %self.agent_id,
                message_id = %message.id,
                subject = %message.subject,
                "Dropping expired message"
            );
            return false;
        }
        true
    }

    /// Run every matching handler and collect the responses to publish.
    pub async fn dispatch(&self, message: AgentMessage) -> Vec<AgentMessage> {
        if !self.accepts(&message) {
            return Vec::new();
        }

        let handlers: Vec<Arc<dyn MessageHandler>> = self
            .subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.matches(&message))
            .map(|s| s.handler.clone())
            .collect();

        let mut responses = Vec::new();
        for handler in handlers {
            match handler.handle(message.clone()).await {
                Ok(Some(payload)) if message.message_type == MessageType::Request => {
                    responses.push(AgentMessage::response_to(&message, &self.agent_id, payload));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        agent = %self.agent_id,
                        message_id = %message.id,
                        subject = %message.subject,
                        error = %e,
                        "Handler error"
                    );
                    if message.message_type == MessageType::Request {
                        responses.push(AgentMessage::response_to(
                            &message,
                            &self.agent_id,
                            serde_json::json!({ "error": e.to_string() }),
                        ));
                    }
                }
            }
        }
        responses
    }
}
