//! Voters reached over the message bus.

use crate::bus::{AgentMessage, MessageBus, MessageType, RequestClient, Subscription, SubscriptionId};
use crate::core::{Error, Result};
use crate::voting::voter::{EvaluationRequest, Verdict, Voter, VoterError};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Subject evaluation requests are sent on.
pub const EVALUATE_SUBJECT: &str = "pentarchy.evaluate";

/// A panel member running in another process.
pub struct RemoteVoter {
    name: String,
    client: Arc<RequestClient>,
    timeout: Duration,
}

impl RemoteVoter {
    /// Reach `name` through `client`, waiting at most `timeout` per request.
    pub fn new(name: &str, client: Arc<RequestClient>, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            client,
            timeout,
        }
    }
}

fn decode_verdict(payload: serde_json::Value) -> std::result::Result<Verdict, VoterError> {
    if let Some(error) = payload.get("error") {
        let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        return Err(VoterError::Failed(message));
    }
    serde_json::from_value(payload).map_err(|e| VoterError::Malformed(e.to_string()))
}

#[async_trait]
impl Voter for RemoteVoter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate_proposal(&self, request: &EvaluationRequest) -> std::result::Result<Verdict, VoterError> {
        let payload = serde_json::to_value(request).map_err(|e| VoterError::Malformed(e.to_string()))?;
        let ttl = self.timeout.as_secs().max(1);
        let message = AgentMessage::request(self.client.bus().agent_id(), &self.name, EVALUATE_SUBJECT, payload)
            .with_ttl(ttl);

        match self.client.request(message, self.timeout).await {
            Ok(response) => decode_verdict(response.payload),
            Err(Error::RequestTimeout(_)) => Err(VoterError::Timeout(self.timeout.as_millis() as u64)),
            Err(e) => Err(VoterError::Transport(e.to_string())),
        }
    }
}

/// Hosts a voter on a bus endpoint named after it.
pub struct VoterService {
    bus: Arc<dyn MessageBus>,
    subscription: SubscriptionId,
}

impl VoterService {
    /// Answer evaluation requests addressed to `voter` on `bus`.
    pub async fn host(bus: Arc<dyn MessageBus>, voter: Arc<dyn Voter>) -> Result<Self> {
        if bus.agent_id() != voter.name() {
            return Err(Error::Config(format!(
                "voter {} must be hosted on a bus endpoint of the same name, got {}",
                voter.name(),
                bus.agent_id()
            )));
        }

        let handler_voter = voter.clone();
        let subscription = Subscription::new(EVALUATE_SUBJECT, move |message: AgentMessage| {
            let voter = handler_voter.clone();
            async move {
                let request: EvaluationRequest = serde_json::from_value(message.payload)?;
                let reply = match voter.evaluate_proposal(&request).await {
                    Ok(verdict) => serde_json::to_value(verdict)?,
                    Err(e) => {
                        tracing::warn!(
                            voter = %voter.name(),
                            proposal_id = %request.proposal_id,
                            error = %e,
                            "Evaluation failed"
                        );
                        json!({ "error": e.to_string() })
                    }
                };
                Ok::<_, Error>(Some(reply))
            }
        })
        .only(&[MessageType::Request]);

        let subscription = bus.subscribe(subscription).await?;
        tracing::info!(voter = %voter.name(), "Voter service listening on {}", EVALUATE_SUBJECT);
        Ok(Self { bus, subscription })
    }

    /// Stop answering requests.
    pub async fn stop(self) -> Result<()> {
        self.bus.unsubscribe(&self.subscription).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{create_memory_bus, InMemoryHub};
    use crate::governance::risk::RiskLevel;
    use crate::governance::vote::Decision;
    use crate::voting::agents::ReferenceVoter;
    use std::collections::HashMap;

    fn request() -> EvaluationRequest {
        EvaluationRequest {
            proposal_id: "p1".into(),
            title: "Monitors".to_string(),
            description: "Buy two monitors for the design team".to_string(),
            cost: 75.0,
            risk_level: RiskLevel::Medium,
            context: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_remote_matches_in_process() {
        let hub = InMemoryHub::new();
        let coordinator = create_memory_bus("coordinator", &hub).await.unwrap();
        let athena_bus = create_memory_bus("athena", &hub).await.unwrap();
        let _service = VoterService::host(athena_bus, Arc::new(ReferenceVoter::Athena))
            .await
            .unwrap();

        let client = Arc::new(RequestClient::attach(coordinator).await.unwrap());
        let remote = RemoteVoter::new("athena", client, Duration::from_secs(1));

        let over_bus = remote.evaluate_proposal(&request()).await.unwrap();
        let direct = ReferenceVoter::Athena.evaluate_proposal(&request()).await.unwrap();
        assert_eq!(over_bus, direct);
    }

    #[tokio::test]
    async fn test_missing_voter_times_out() {
        let hub = InMemoryHub::new();
        let coordinator = create_memory_bus("coordinator", &hub).await.unwrap();
        let client = Arc::new(RequestClient::attach(coordinator).await.unwrap());
        let remote = RemoteVoter::new("hermes", client, Duration::from_millis(50));

        let result = remote.evaluate_proposal(&request()).await;
        assert_eq!(result, Err(VoterError::Timeout(50)));
    }

    #[tokio::test]
    async fn test_host_requires_matching_endpoint() {
        let hub = InMemoryHub::new();
        let bus = create_memory_bus("hermes", &hub).await.unwrap();
        let result = VoterService::host(bus, Arc::new(ReferenceVoter::Athena)).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_decode_verdict() {
        let ok = decode_verdict(json!({"decision": "REJECT", "score": 0.0, "reasoning": []})).unwrap();
        assert_eq!(ok.decision, Decision::Reject);

        let failed = decode_verdict(json!({"error": "model unavailable"}));
        assert_eq!(failed, Err(VoterError::Failed("model unavailable".to_string())));

        let malformed = decode_verdict(json!({"score": "high"}));
        assert!(matches!(malformed, Err(VoterError::Malformed(_))));
    }
}
