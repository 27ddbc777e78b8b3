//! NATS subscription for incoming API requests

use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

/// Subscribes to every request subject under the API prefix.
pub struct RequestConsumer {
    client: Client,
    prefix: String,
}

impl RequestConsumer {
    pub fn new(client: Client, prefix: &str) -> Self {
        Self {
            client,
            prefix: prefix.to_string(),
        }
    }

    /// Wildcard subject covering all endpoints (`<prefix>.>`)
    pub fn wildcard(&self) -> String {
        format!("{}.>", self.prefix)
    }

    /// Subscribe to the request subjects
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subject = self.wildcard();
        let subscriber = self.client.subscribe(subject.clone()).await?;
        info!(subject = %subject, "Subscribed to API requests");
        Ok(subscriber)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
