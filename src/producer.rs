//! NATS reply publisher

use crate::api::Envelope;
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::debug;

/// Publishes response envelopes to request reply inboxes
#[derive(Clone)]
pub struct ReplyProducer {
    client: Client,
}

impl ReplyProducer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Publish `envelope` to `reply`
    pub async fn reply(&self, reply: Subject, envelope: &Envelope) -> Result<()> {
        let payload = serde_json::to_vec(envelope)?;
        let size = payload.len();

        self.client.publish(reply.clone(), payload.into()).await?;

        debug!(
            reply = %reply,
            ok = envelope.ok,
            bytes = size,
            "Published response"
        );

        Ok(())
    }
}
