//! Bus factory.
//!
//! Creates and connects message bus endpoints based on configuration.

use crate::bus::backend::{BusType, MessageBus};
use crate::bus::config::BusConfig;
use crate::bus::memory::{InMemoryBus, InMemoryHub};
use crate::bus::redis_stream::RedisStreamBus;
use crate::core::Result;
use std::sync::Arc;

/// Create a connected bus endpoint from configuration.
///
/// In-memory endpoints join `hub` when given; otherwise they get a private hub
/// and can only talk to themselves.
pub async fn create_message_bus(
    config: &BusConfig,
    hub: Option<&InMemoryHub>,
) -> Result<Arc<dyn MessageBus>> {
    let bus: Arc<dyn MessageBus> = match config.backend {
        BusType::Memory => {
            let hub = hub.cloned().unwrap_or_default();
            let memory_config = config.memory.clone().unwrap_or_default();
            Arc::new(InMemoryBus::new(&config.agent_id, hub, memory_config))
        }
        BusType::Redis => {
            let redis_config = config.redis.clone().unwrap_or_default();
            Arc::new(RedisStreamBus::new(&config.agent_id, redis_config))
        }
    };

    bus.connect().await?;
    tracing::info!(
        agent = %config.agent_id,
        backend = %config.backend,
        "Message bus ready"
    );
    Ok(bus)
}

/// Create a connected in-memory endpoint on `hub` (convenience function).
pub async fn create_memory_bus(agent_id: &str, hub: &InMemoryHub) -> Result<Arc<dyn MessageBus>> {
    create_message_bus(&BusConfig::memory(agent_id), Some(hub)).await
}
