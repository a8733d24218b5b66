use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;

use super::handlers::{Command, CommandHandler};
use super::{BusError, Message, Transport};
use crate::service::FileService;

/// Queue-group subscriber for every bus command.
pub struct BusServer {
    transport: Arc<dyn Transport>,
    handler: Arc<CommandHandler>,
    queue_group: String,
}

impl BusServer {
    pub fn new(
        transport: Arc<dyn Transport>,
        service: Arc<FileService>,
        queue_group: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            handler: Arc::new(CommandHandler::new(service)),
            queue_group: queue_group.into(),
        }
    }

    /// Subscribe to all command subjects and spawn one loop per subject.
    /// Each message is handled on its own task.
    pub async fn start(&self) -> Result<Vec<JoinHandle<()>>, BusError> {
        let mut loops = Vec::with_capacity(Command::ALL.len());
        for command in Command::ALL {
            let mut messages = self
                .transport
                .subscribe(command.subject(), Some(&self.queue_group))
                .await?;
            let transport = Arc::clone(&self.transport);
            let handler = Arc::clone(&self.handler);

            loops.push(tokio::spawn(async move {
                while let Some(message) = messages.next().await {
                    let transport = Arc::clone(&transport);
                    let handler = Arc::clone(&handler);
                    tokio::spawn(dispatch(transport, handler, command, message));
                }
                tracing::info!(subject = command.subject(), "Bus subscription ended");
            }));
        }

        tracing::info!(
            queue_group = %self.queue_group,
            subjects = Command::ALL.len(),
            "Bus subscribers started"
        );
        Ok(loops)
    }
}

async fn dispatch(
    transport: Arc<dyn Transport>,
    handler: Arc<CommandHandler>,
    command: Command,
    message: Message,
) {
    let Some(reply) = handler.handle(command, &message.payload).await else {
        return;
    };
    let Some(inbox) = message.reply.as_deref() else {
        tracing::debug!(subject = %message.subject, "No reply subject, discarding reply");
        return;
    };
    if let Err(e) = transport.publish(inbox, None, reply).await {
        tracing::warn!(subject = %message.subject, error = %e, "Failed to send reply");
    }
}
