use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use super::{BusError, Message, MessageStream, Transport};

/// NATS-backed transport.
#[derive(Clone)]
pub struct NatsTransport {
    client: async_nats::Client,
}

impl NatsTransport {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        tracing::info!(url, "Connected to NATS");
        Ok(Self { client })
    }

    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Flush pending publishes before shutdown.
    pub async fn flush(&self) -> Result<(), BusError> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
    }
}

fn convert(message: async_nats::Message) -> Message {
    Message {
        subject: message.subject.to_string(),
        reply: message.reply.map(|r| r.to_string()),
        payload: message.payload,
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Result<(), BusError> {
        let subject = subject.to_string();
        let result = match reply {
            Some(reply) => {
                self.client
                    .publish_with_reply(subject, reply.to_string(), payload)
                    .await
            }
            None => self.client.publish(subject, payload).await,
        };
        result.map_err(|e| BusError::Transport(e.to_string()))
    }

    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
    ) -> Result<MessageStream, BusError> {
        let subscriber = match queue_group {
            Some(group) => {
                self.client
                    .queue_subscribe(subject.to_string(), group.to_string())
                    .await
            }
            None => self.client.subscribe(subject.to_string()).await,
        }
        .map_err(|e| BusError::Transport(e.to_string()))?;

        Ok(subscriber.map(convert).boxed())
    }

    fn new_inbox(&self) -> String {
        self.client.new_inbox()
    }
}
