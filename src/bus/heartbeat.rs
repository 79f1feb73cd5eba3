//! Heartbeats and liveness tracking.

use crate::bus::backend::MessageBus;
use crate::bus::handler::{Subscription, SubscriptionId};
use crate::bus::message::{AgentMessage, MessagePriority, MessageType};
use crate::core::{now, Error, Result, Timestamp};
use rand::Rng;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

/// Subject heartbeats are broadcast on.
pub const HEARTBEAT_SUBJECT: &str = "agents.heartbeat";

/// Periodically announces that an agent is alive.
pub struct HeartbeatEmitter {
    bus: Arc<dyn MessageBus>,
    interval: Duration,
    jitter: Duration,
}

impl HeartbeatEmitter {
    /// Create an emitter publishing every `interval`.
    pub fn new(bus: Arc<dyn MessageBus>, interval: Duration) -> Self {
        Self {
            bus,
            interval,
            jitter: Duration::ZERO,
        }
    }

    /// Add up to `jitter` of random delay to every beat.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    fn ttl_seconds(&self) -> u64 {
        ((self.interval + self.jitter).as_secs() * 3).max(1)
    }

    /// Start beating in the background.
    pub fn start(self) -> HeartbeatHandle {
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut sequence: u64 = 0;
            loop {
                let beat = AgentMessage::heartbeat(
                    self.bus.agent_id(),
                    HEARTBEAT_SUBJECT,
                    json!({
                        "agent_id": self.bus.agent_id(),
                        "status": "alive",
                        "sequence": sequence,
                    }),
                )
                .with_priority(MessagePriority::Low)
                .with_ttl(self.ttl_seconds());

                if let Err(e) = self.bus.publish(beat).await {
                    tracing::warn!(agent = %self.bus.agent_id(), error = %e, "Heartbeat publish failed");
                }
                sequence += 1;

                let delay = self.next_delay();
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        });
        HeartbeatHandle { stop, task }
    }
}

/// Handle to a running heartbeat task.
pub struct HeartbeatHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Stop beating and wait for the task to exit.
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop.send(true);
        self.task
            .await
            .map_err(|e| Error::Internal(format!("heartbeat task failed: {}", e)))
    }
}

/// Tracks when each agent last sent a heartbeat.
pub struct LivenessMonitor {
    last_seen: Arc<RwLock<HashMap<String, Timestamp>>>,
    subscription: SubscriptionId,
}

impl LivenessMonitor {
    /// Start listening for heartbeats on `bus`.
    pub async fn attach(bus: &Arc<dyn MessageBus>) -> Result<Self> {
        let last_seen: Arc<RwLock<HashMap<String, Timestamp>>> = Arc::new(RwLock::new(HashMap::new()));

        let table = last_seen.clone();
        let subscription = Subscription::new(HEARTBEAT_SUBJECT, move |message: AgentMessage| {
            let table = table.clone();
            async move {
                table.write().await.insert(message.source.clone(), now());
                Ok::<_, Error>(None::<serde_json::Value>)
            }
        })
        .only(&[MessageType::Heartbeat]);

        let subscription = bus.subscribe(subscription).await?;
        Ok(Self {
            last_seen,
            subscription,
        })
    }

    /// Subscription id, for unsubscribing.
    pub fn subscription(&self) -> &SubscriptionId {
        &self.subscription
    }

    /// When `agent_id` was last heard from.
    pub async fn last_seen(&self, agent_id: &str) -> Option<Timestamp> {
        self.last_seen.read().await.get(agent_id).copied()
    }

    /// Every agent heard from, with its last heartbeat time.
    pub async fn snapshot(&self) -> HashMap<String, Timestamp> {
        self.last_seen.read().await.clone()
    }

    /// Agents heard from within `window`, sorted.
    pub async fn alive(&self, window: Duration) -> Vec<String> {
        let at = now();
        let mut agents: Vec<String> = self
            .last_seen
            .read()
            .await
            .iter()
            .filter(|(_, seen)| within(at, **seen, window))
            .map(|(agent, _)| agent.clone())
            .collect();
        agents.sort();
        agents
    }

    /// Whether `agent_id` was heard from within `window`.
    pub async fn is_alive(&self, agent_id: &str, window: Duration) -> bool {
        self.last_seen(agent_id)
            .await
            .map(|seen| within(now(), seen, window))
            .unwrap_or(false)
    }
}

fn within(at: Timestamp, seen: Timestamp, window: Duration) -> bool {
    (at - seen).to_std().map(|age| age <= window).unwrap_or(true)
}
