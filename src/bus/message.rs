//! Agent message envelope.
//!
//! The envelope is the only cross-process contract of the bus; every
//! backend carries it unchanged.

use crate::core::{now, Result, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default time-to-live for messages, in seconds.
pub const DEFAULT_TTL_SECONDS: u64 = 300;

/// Message types exchanged between agents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Point-to-point request expecting a response
    Request,
    /// Response to a request, correlated by message id
    Response,
    /// Fire-and-forget notification
    Event,
    /// Message for every agent on the bus
    Broadcast,
    /// Liveness signal
    Heartbeat,
}

impl MessageType {
    /// All message types.
    pub const ALL: [MessageType; 5] = [
        MessageType::Request,
        MessageType::Response,
        MessageType::Event,
        MessageType::Broadcast,
        MessageType::Heartbeat,
    ];
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Request => write!(f, "request"),
            MessageType::Response => write!(f, "response"),
            MessageType::Event => write!(f, "event"),
            MessageType::Broadcast => write!(f, "broadcast"),
            MessageType::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

/// Delivery priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessagePriority {
    Low = 1,
    Normal = 5,
    High = 8,
    Critical = 10,
}

impl Default for MessagePriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl From<MessagePriority> for u8 {
    fn from(priority: MessagePriority) -> Self {
        priority as u8
    }
}

impl TryFrom<u8> for MessagePriority {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(MessagePriority::Low),
            5 => Ok(MessagePriority::Normal),
            8 => Ok(MessagePriority::High),
            10 => Ok(MessagePriority::Critical),
            other => Err(format!("unknown message priority {}", other)),
        }
    }
}

/// An inter-agent message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Message ID
    pub id: String,
    /// Message type
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Sending agent
    pub source: String,
    /// Receiving agent (None = every agent)
    pub target: Option<String>,
    /// Routable subject
    pub subject: String,
    /// Opaque structured payload
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Id of the request this message answers
    pub correlation_id: Option<String>,
    /// Priority level
    #[serde(default)]
    pub priority: MessagePriority,
    /// Creation timestamp
    pub timestamp: Timestamp,
    /// Time-to-live in seconds
    pub ttl_seconds: u64,
}

impl AgentMessage {
    /// Create a message of any type.
    pub fn new(message_type: MessageType, source: &str, subject: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type,
            source: source.to_string(),
            target: None,
            subject: subject.to_string(),
            payload: serde_json::Value::Null,
            correlation_id: None,
            priority: MessagePriority::Normal,
            timestamp: now(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }

    /// Create a request addressed to one agent.
    pub fn request(source: &str, target: &str, subject: &str, payload: serde_json::Value) -> Self {
        Self::new(MessageType::Request, source, subject)
            .with_target(target)
            .with_payload(payload)
    }

    /// Create the response to `original`.
    ///
    /// The response is addressed to the request's source and carries the
    /// request's id as correlation id.
    pub fn response_to(original: &AgentMessage, source: &str, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type: MessageType::Response,
            source: source.to_string(),
            target: Some(original.source.clone()),
            subject: original.subject.clone(),
            payload,
            correlation_id: Some(original.id.clone()),
            priority: original.priority,
            timestamp: now(),
            ttl_seconds: original.ttl_seconds,
        }
    }

    /// Create an event.
    pub fn event(source: &str, subject: &str, payload: serde_json::Value) -> Self {
        Self::new(MessageType::Event, source, subject).with_payload(payload)
    }

    /// Create a broadcast for every agent.
    pub fn broadcast(source: &str, subject: &str, payload: serde_json::Value) -> Self {
        Self::new(MessageType::Broadcast, source, subject).with_payload(payload)
    }

    /// Create a heartbeat.
    pub fn heartbeat(source: &str, subject: &str, payload: serde_json::Value) -> Self {
        Self::new(MessageType::Heartbeat, source, subject).with_payload(payload)
    }

    /// Set the target agent.
    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the time-to-live.
    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Whether the message has outlived its TTL at `at`.
    pub fn is_expired_at(&self, at: Timestamp) -> bool {
        let age = at.signed_duration_since(self.timestamp);
        age.num_milliseconds() > (self.ttl_seconds as i64).saturating_mul(1000)
    }

    /// Whether the message has outlived its TTL.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now())
    }

    /// Whether an agent should see this message.
    pub fn is_addressed_to(&self, agent_id: &str) -> bool {
        match &self.target {
            Some(target) => target == agent_id,
            None => true,
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
