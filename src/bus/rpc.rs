//! Request/response correlation over a message bus.

use crate::bus::backend::MessageBus;
use crate::bus::handler::{Subscription, SubscriptionId};
use crate::bus::message::{AgentMessage, MessageType};
use crate::core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<AgentMessage>>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<String, oneshot::Sender<AgentMessage>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes a pending entry however the waiting future ends, so late
/// responses find nothing to complete and are discarded.
struct PendingGuard {
    pending: PendingMap,
    id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.id);
    }
}

/// Sends REQUEST messages and awaits the correlated RESPONSE.
pub struct RequestClient {
    bus: Arc<dyn MessageBus>,
    pending: PendingMap,
    subscription: SubscriptionId,
}

impl RequestClient {
    /// Attach to a bus, subscribing to responses addressed to it.
    pub async fn attach(bus: Arc<dyn MessageBus>) -> Result<Self> {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let table = pending.clone();
        let subscription = Subscription::new("*", move |message: AgentMessage| {
            let table = table.clone();
            async move {
                let waiter = message
                    .correlation_id
                    .as_ref()
                    .and_then(|id| lock(&table).remove(id));
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(message);
                    }
                    None => tracing::debug!(
                        message_id = %message.id,
                        correlation_id = ?message.correlation_id,
                        "Discarding uncorrelated response"
                    ),
                }
                Ok::<_, Error>(None::<serde_json::Value>)
            }
        })
        .only(&[MessageType::Response]);

        let subscription = bus.subscribe(subscription).await?;
        Ok(Self {
            bus,
            pending,
            subscription,
        })
    }

    /// The underlying bus.
    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// Number of requests awaiting a response.
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Publish a request and wait up to `timeout` for its response.
    pub async fn request(&self, message: AgentMessage, timeout: Duration) -> Result<AgentMessage> {
        let id = message.id.clone();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id.clone(), tx);
        let _guard = PendingGuard {
            pending: self.pending.clone(),
            id: id.clone(),
        };

        self.bus.publish(message).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::RequestDropped(id)),
            Err(_) => Err(Error::RequestTimeout(id)),
        }
    }

    /// Stop listening for responses.
    pub async fn detach(self) -> Result<()> {
        self.bus.unsubscribe(&self.subscription).await?;
        Ok(())
    }
}
