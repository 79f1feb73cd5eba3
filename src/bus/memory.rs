//! In-process message bus.
//!
//! Every participant shares one `InMemoryHub`, handed to each endpoint at
//! construction. Each connected endpoint owns an inbox drained by its own
//! delivery task, so a slow handler never blocks publishers or other agents.

use crate::bus::backend::{BusType, MessageBus};
use crate::bus::config::MemoryBusConfig;
use crate::bus::handler::{Dispatcher, Subscription, SubscriptionId};
use crate::bus::message::AgentMessage;
use crate::core::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Shared dispatch table connecting in-process endpoints.
#[derive(Clone, Default)]
pub struct InMemoryHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    endpoints: RwLock<HashMap<String, mpsc::Sender<AgentMessage>>>,
    routed: AtomicU64,
    dropped: AtomicU64,
}

impl InMemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an endpoint on this hub with default settings.
    pub fn endpoint(&self, agent_id: &str) -> InMemoryBus {
        InMemoryBus::new(agent_id, self.clone(), MemoryBusConfig::default())
    }

    /// Identities of the connected endpoints.
    pub async fn agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.inner.endpoints.read().await.keys().cloned().collect();
        agents.sort();
        agents
    }

    /// Total deliveries made to inboxes.
    pub fn routed(&self) -> u64 {
        self.inner.routed.load(Ordering::Relaxed)
    }

    /// Messages dropped because they had expired.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    async fn attach(&self, agent_id: &str, inbox: mpsc::Sender<AgentMessage>) {
        let previous = self
            .inner
            .endpoints
            .write()
            .await
            .insert(agent_id.to_string(), inbox);
        if previous.is_some() {
            tracing::warn!(agent = %agent_id, "Replacing existing in-memory endpoint");
        }
    }

    async fn detach(&self, agent_id: &str) {
        self.inner.endpoints.write().await.remove(agent_id);
    }

    /// Deliver a message to every endpoint it is addressed to.
    async fn route(&self, message: AgentMessage) -> usize {
        if message.is_expired() {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(message_id = %message.id, "Dropping expired message at publish");
            return 0;
        }

        let recipients: Vec<(String, mpsc::Sender<AgentMessage>)> = self
            .inner
            .endpoints
            .read()
            .await
            .iter()
            .filter(|(id, _)| **id != message.source && message.is_addressed_to(id))
            .map(|(id, tx)| (id.clone(), tx.clone()))
            .collect();

        let mut delivered = 0;
        for (agent_id, inbox) in recipients {
            if inbox.send(message.clone()).await.is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(agent = %agent_id, "Inbox closed, skipping delivery");
            }
        }
        self.inner.routed.fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }
}

/// An agent endpoint on an `InMemoryHub`.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    agent_id: String,
    hub: InMemoryHub,
    config: MemoryBusConfig,
    dispatcher: Arc<Dispatcher>,
    connected: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl InMemoryBus {
    /// Create an endpoint. Nothing is delivered until `connect`.
    pub fn new(agent_id: &str, hub: InMemoryHub, config: MemoryBusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                agent_id: agent_id.to_string(),
                hub,
                config,
                dispatcher: Arc::new(Dispatcher::new(agent_id)),
                connected: AtomicBool::new(false),
                worker: Mutex::new(None),
            }),
        }
    }

    /// The hub this endpoint is attached to.
    pub fn hub(&self) -> &InMemoryHub {
        &self.inner.hub
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    fn agent_id(&self) -> &str {
        &self.inner.agent_id
    }

    async fn connect(&self) -> Result<()> {
        let mut worker = self.inner.worker.lock().await;
        if worker.is_some() {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::channel::<AgentMessage>(self.inner.config.inbox_capacity.max(1));
        self.inner.hub.attach(&self.inner.agent_id, tx).await;

        let dispatcher = self.inner.dispatcher.clone();
        let hub = self.inner.hub.clone();
        *worker = Some(tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let dispatcher = dispatcher.clone();
                let hub = hub.clone();
                tokio::spawn(async move {
                    for response in dispatcher.dispatch(message).await {
                        hub.route(response).await;
                    }
                });
            }
        }));

        self.inner.connected.store(true, Ordering::SeqCst);
        tracing::info!(agent = %self.inner.agent_id, "In-memory message bus connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.hub.detach(&self.inner.agent_id).await;
        if let Some(worker) = self.inner.worker.lock().await.take() {
            worker.abort();
        }
        tracing::info!(agent = %self.inner.agent_id, "In-memory message bus disconnected");
        Ok(())
    }

    async fn publish(&self, message: AgentMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected(self.inner.agent_id.clone()));
        }
        tracing::debug!(
            agent = %self.inner.agent_id,
            message_id = %message.id,
            subject = %message.subject,
            message_type = %message.message_type,
            "Publishing message"
        );
        self.inner.hub.route(message).await;
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
        BusType::Memory
    }
}
