//! Redis Streams message bus.
//!
//! All agents append to one stream. Each agent reads it through its own
//! consumer group, `{group_prefix}:{agent_id}`, so every agent sees every
//! entry and filters by target locally. On connect the consumer first drains
//! entries it read but never acknowledged, then follows new entries.

use crate::bus::backend::{BusType, MessageBus};
use crate::bus::config::RedisBusConfig;
use crate::bus::handler::{Dispatcher, Subscription, SubscriptionId};
use crate::bus::message::AgentMessage;
use crate::core::{Error, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

const PAYLOAD_FIELD: &str = "message";
const PENDING_CURSOR: &str = "0";
const NEW_CURSOR: &str = ">";

/// Bus backed by a Redis stream.
#[derive(Clone)]
pub struct RedisStreamBus {
    inner: Arc<RedisInner>,
}

struct RedisInner {
    agent_id: String,
    config: RedisBusConfig,
    dispatcher: Arc<Dispatcher>,
    publisher: RwLock<Option<MultiplexedConnection>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    connected: AtomicBool,
}

impl RedisStreamBus {
    /// Create a bus for `agent_id`. No connection is opened until `connect`.
    pub fn new(agent_id: &str, config: RedisBusConfig) -> Self {
        Self {
            inner: Arc::new(RedisInner {
                agent_id: agent_id.to_string(),
                config,
                dispatcher: Arc::new(Dispatcher::new(agent_id)),
                publisher: RwLock::new(None),
                shutdown: Mutex::new(None),
                worker: Mutex::new(None),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Consumer group this agent reads through.
    pub fn group(&self) -> String {
        self.inner.config.group_for(&self.inner.agent_id)
    }

    /// Backend configuration.
    pub fn config(&self) -> &RedisBusConfig {
        &self.inner.config
    }

    async fn ensure_group(conn: &mut MultiplexedConnection, stream: &str, group: &str) -> Result<()> {
        let created: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "$").await;
        match created {
            Ok(()) => {
                tracing::info!(stream = %stream, group = %group, "Created consumer group");
                Ok(())
            }
            Err(e) if is_busy_group(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_busy_group(err: &redis::RedisError) -> bool {
    err.code() == Some("BUSYGROUP") || err.to_string().contains("BUSYGROUP")
}

async fn append(
    conn: &mut MultiplexedConnection,
    config: &RedisBusConfig,
    message: &AgentMessage,
) -> Result<String> {
    let json = message.to_json()?;
    let message_type = message.message_type.to_string();
    let fields: [(&str, &str); 4] = [
        (PAYLOAD_FIELD, json.as_str()),
        ("type", message_type.as_str()),
        ("source", message.source.as_str()),
        ("subject", message.subject.as_str()),
    ];
    let entry_id: String = conn
        .xadd_maxlen(&config.stream, StreamMaxlen::Approx(config.max_len), "*", &fields)
        .await?;
    Ok(entry_id)
}

/// Everything the read loop needs, detached from the bus handle.
struct Consumer {
    agent_id: String,
    config: RedisBusConfig,
    group: String,
    consumer: String,
    dispatcher: Arc<Dispatcher>,
    publisher: MultiplexedConnection,
}

impl Consumer {
    async fn run(self, mut reader: MultiplexedConnection, mut shutdown: watch::Receiver<bool>) {
        let consumer = Arc::new(self);
        // Some(id) while replaying our own unacknowledged entries after `id`.
        let mut replay_from: Option<String> = Some(PENDING_CURSOR.to_string());

        loop {
            if *shutdown.borrow() {
                break;
            }

            let options = StreamReadOptions::default()
                .group(&consumer.group, &consumer.consumer)
                .count(consumer.config.batch_size)
                .block(consumer.config.block_ms);
            let keys = [consumer.config.stream.as_str()];
            let ids = [replay_from.as_deref().unwrap_or(NEW_CURSOR)];

            let read: redis::RedisResult<Option<StreamReadReply>> = tokio::select! {
                _ = shutdown.changed() => break,
                read = reader.xread_options(&keys, &ids, &options) => read,
            };

            match read {
                Ok(reply) => {
                    let entries: Vec<StreamId> = reply
                        .map(|reply| reply.keys.into_iter().flat_map(|key| key.ids).collect())
                        .unwrap_or_default();

                    if replay_from.is_some() {
                        match entries.last() {
                            Some(last) => {
                                let last_id = last.id.clone();
                                tracing::info!(
                                    agent = %consumer.agent_id,
                                    count = entries.len(),
                                    "Redelivering unacknowledged entries"
                                );
                                for entry in entries {
                                    consumer.handle_entry(entry).await;
                                }
                                replay_from = Some(last_id);
                            }
                            None => {
                                tracing::debug!(agent = %consumer.agent_id, "Pending entries drained");
                                replay_from = None;
                            }
                        }
                        continue;
                    }

                    for entry in entries {
                        let consumer = consumer.clone();
                        tokio::spawn(async move { consumer.handle_entry(entry).await });
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        agent = %consumer.agent_id,
                        error = %e,
                        "Stream read failed, backing off"
                    );
                    let backoff = Duration::from_millis(consumer.config.retry_backoff_ms);
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
        tracing::debug!(agent = %consumer.agent_id, "Stream consumer stopped");
    }

    async fn handle_entry(&self, entry: StreamId) {
        let mut publisher = self.publisher.clone();

        match entry.get::<String>(PAYLOAD_FIELD).map(|raw| AgentMessage::from_json(&raw)) {
            Some(Ok(message)) => {
                for response in self.dispatcher.dispatch(message).await {
                    if let Err(e) = append(&mut publisher, &self.config, &response).await {
                        tracing::error!(
                            agent = %self.agent_id,
                            correlation_id = ?response.correlation_id,
                            error = %e,
                            "Failed to publish response"
                        );
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!(entry = %entry.id, error = %e, "Discarding undecodable stream entry");
            }
            None => {
                tracing::warn!(entry = %entry.id, "Discarding stream entry without payload");
            }
        }

        let acked: redis::RedisResult<i64> = publisher
            .xack(&self.config.stream, &self.group, &[entry.id.as_str()])
            .await;
        if let Err(e) = acked {
            tracing::warn!(entry = %entry.id, error = %e, "Failed to acknowledge entry");
        }
    }
}

#[async_trait]
impl MessageBus for RedisStreamBus {
    fn agent_id(&self) -> &str {
        &self.inner.agent_id
    }

    async fn connect(&self) -> Result<()> {
        let mut worker = self.inner.worker.lock().await;
        if worker.is_some() {
            return Ok(());
        }

        let client = redis::Client::open(self.inner.config.url.as_str())?;
        let mut publisher = client.get_multiplexed_async_connection().await?;
        let reader = client.get_multiplexed_async_connection().await?;

        let group = self.group();
        Self::ensure_group(&mut publisher, &self.inner.config.stream, &group).await?;

        let (tx, rx) = watch::channel(false);
        let consumer = Consumer {
            agent_id: self.inner.agent_id.clone(),
            config: self.inner.config.clone(),
            group: group.clone(),
            consumer: self.inner.config.consumer_for(&self.inner.agent_id),
            dispatcher: self.inner.dispatcher.clone(),
            publisher: publisher.clone(),
        };

        *self.inner.publisher.write().await = Some(publisher);
        *self.inner.shutdown.lock().await = Some(tx);
        *worker = Some(tokio::spawn(consumer.run(reader, rx)));
        self.inner.connected.store(true, Ordering::SeqCst);

        tracing::info!(
            agent = %self.inner.agent_id,
            stream = %self.inner.config.stream,
            group = %group,
            "Redis message bus connected"
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.connected.store(false, Ordering::SeqCst);
        if let Some(shutdown) = self.inner.shutdown.lock().await.take() {
            let _ = shutdown.send(true);
        }
        if let Some(worker) = self.inner.worker.lock().await.take() {
            if let Err(e) = worker.await {
                tracing::warn!(agent = %self.inner.agent_id, error = %e, "Stream consumer ended abnormally");
            }
        }
        self.inner.publisher.write().await.take();
        tracing::info!(agent = %self.inner.agent_id, "Redis message bus disconnected");
        Ok(())
    }

    async fn publish(&self, message: AgentMessage) -> Result<()> {
        let mut conn = self
            .inner
            .publisher
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::NotConnected(self.inner.agent_id.clone()))?;

        let entry_id = append(&mut conn, &self.inner.config, &message).await?;
        tracing::debug!(
            agent = %self.inner.agent_id,
            message_id = %message.id,
            entry = %entry_id,
            subject = %message.subject,
            "Published message"
        );
        Ok(())
    }

    async fn subscribe(&self, subscription: Subscription) -> Result<SubscriptionId> {
        Ok(self.inner.dispatcher.add(subscription).await)
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<bool> {
        Ok(self.inner.dispatcher.remove(id).await)
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn backend_type(&self) -> BusType {
        BusType::Redis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_group_is_per_agent() {
        let athena = RedisStreamBus::new("athena", RedisBusConfig::default());
        let hermes = RedisStreamBus::new("hermes", RedisBusConfig::default());
        assert_eq!(athena.group(), "pentarchy-agents:athena");
        assert_ne!(athena.group(), hermes.group());
        assert_eq!(athena.backend_type(), BusType::Redis);
    }

    #[tokio::test]
    async fn test_publish_before_connect_fails() {
        let bus = RedisStreamBus::new("athena", RedisBusConfig::default());
        assert!(!bus.is_connected());
        let result = bus.publish(AgentMessage::event("athena", "x", json!({}))).await;
        assert!(matches!(result, Err(Error::NotConnected(_))));
    }

    #[tokio::test]
    async fn test_subscribe_without_connection() {
        let bus = RedisStreamBus::new("athena", RedisBusConfig::default());
        let id = bus
            .subscribe(Subscription::new("*", |_msg: AgentMessage| async move {
                Ok::<_, Error>(None::<serde_json::Value>)
            }))
            .await
            .unwrap();
        assert!(bus.unsubscribe(&id).await.unwrap());
    }

    #[test]
    fn test_busy_group_detection() {
        let err = redis::RedisError::from((
            redis::ErrorKind::ExtensionError,
            "BUSYGROUP",
            "Consumer Group name already exists".to_string(),
        ));
        assert!(is_busy_group(&err));

        let other = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));
        assert!(!is_busy_group(&other));
    }
}
