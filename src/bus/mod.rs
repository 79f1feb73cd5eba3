//! Agent Message Bus
//!
//! Transport-agnostic messaging between the coordinator and panel members:
//! - Subject routing with exact and single-level wildcard patterns
//! - Point-to-point requests with correlated responses
//! - Broadcasts and heartbeats
//! - In-memory and Redis Streams backends behind one trait

pub mod backend;
pub mod config;
pub mod factory;
pub mod handler;
pub mod heartbeat;
pub mod memory;
pub mod message;
pub mod redis_stream;
pub mod rpc;
pub mod subject;

pub use backend::{BusType, MessageBus};
pub use config::{BusConfig, MemoryBusConfig, RedisBusConfig};
pub use factory::{create_memory_bus, create_message_bus};
pub use handler::{Dispatcher, MessageHandler, Subscription, SubscriptionId};
pub use heartbeat::{HeartbeatEmitter, HeartbeatHandle, LivenessMonitor, HEARTBEAT_SUBJECT};
pub use memory::{InMemoryBus, InMemoryHub};
pub use message::{AgentMessage, MessagePriority, MessageType, DEFAULT_TTL_SECONDS};
pub use redis_stream::RedisStreamBus;
pub use rpc::RequestClient;
pub use subject::SubjectPattern;
