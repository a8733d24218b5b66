//! Message bus surface: a small transport abstraction over publish,
//! queue-group subscribe, and request/reply, plus the command handlers that
//! drive the file service from bus traffic.

pub mod envelope;
pub mod handlers;
pub mod memory;
pub mod nats;
pub mod server;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;

pub use envelope::{Envelope, EnvelopeError};
pub use handlers::Command;
pub use memory::MemoryTransport;
pub use nats::NatsTransport;
pub use server::BusServer;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("No reply within {0:?}")]
    Timeout(Duration),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Subscription closed")]
    Closed,
}

/// A message as delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub reply: Option<String>,
    pub payload: Bytes,
}

pub type MessageStream = BoxStream<'static, Message>;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Result<(), BusError>;

    /// Subscribe to `subject`. With a queue group, each message goes to
    /// exactly one member of the group.
    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
    ) -> Result<MessageStream, BusError>;

    /// A fresh, unique subject for receiving a single reply.
    fn new_inbox(&self) -> String;
}

/// Request/reply on top of a [`Transport`], bounded by a timeout.
#[derive(Clone)]
pub struct BusClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl BusClient {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        self.transport.publish(subject, None, payload).await
    }

    /// Publish `payload` with a private reply subject and wait for the first
    /// answer.
    pub async fn request(&self, subject: &str, payload: Bytes) -> Result<Bytes, BusError> {
        let inbox = self.transport.new_inbox();
        let mut replies = self.transport.subscribe(&inbox, None).await?;
        self.transport
            .publish(subject, Some(&inbox), payload)
            .await?;

        match tokio::time::timeout(self.timeout, replies.next()).await {
            Ok(Some(message)) => Ok(message.payload),
            Ok(None) => Err(BusError::Closed),
            Err(_) => {
                tracing::debug!(subject, "Request timed out");
                Err(BusError::Timeout(self.timeout))
            }
        }
    }
}
