use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::{BusError, Message, MessageStream, Transport};

type Sender = mpsc::UnboundedSender<Message>;

#[derive(Default)]
struct QueueGroup {
    members: Vec<Sender>,
    next: usize,
}

impl QueueGroup {
    /// Next live member in round-robin order.
    fn pick(&mut self) -> Option<&Sender> {
        self.members.retain(|m| !m.is_closed());
        if self.members.is_empty() {
            return None;
        }
        let index = self.next % self.members.len();
        self.next = self.next.wrapping_add(1);
        self.members.get(index)
    }
}

#[derive(Default)]
struct Subscriptions {
    plain: Vec<Sender>,
    groups: HashMap<String, QueueGroup>,
}

impl Subscriptions {
    /// Drop closed receivers. Returns true if nothing is left.
    fn prune(&mut self) -> bool {
        self.plain.retain(|s| !s.is_closed());
        self.groups.retain(|_, group| {
            group.members.retain(|m| !m.is_closed());
            !group.members.is_empty()
        });
        self.plain.is_empty() && self.groups.is_empty()
    }
}

type SubjectTable = HashMap<String, Subscriptions>;

/// Remove subjects whose subscribers are all gone, such as reply inboxes.
fn prune(subjects: &mut SubjectTable) {
    subjects.retain(|_, subs| !subs.prune());
}

/// In-process transport with exact subject matching.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    subjects: Arc<Mutex<SubjectTable>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Result<(), BusError> {
        let message = Message {
            subject: subject.to_string(),
            reply: reply.map(str::to_string),
            payload,
        };

        let mut subjects = self
            .subjects
            .lock()
            .map_err(|_| BusError::Transport("subscription table poisoned".into()))?;
        if let Some(subs) = subjects.get_mut(subject) {
            subs.plain.retain(|s| s.send(message.clone()).is_ok());
            for group in subs.groups.values_mut() {
                if let Some(member) = group.pick() {
                    let _ = member.send(message.clone());
                }
            }
        }
        prune(&mut subjects);
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
    ) -> Result<MessageStream, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut subjects = self
                .subjects
                .lock()
                .map_err(|_| BusError::Transport("subscription table poisoned".into()))?;
            prune(&mut subjects);
            let subs = subjects.entry(subject.to_string()).or_default();
            match queue_group {
                Some(group) => subs
                    .groups
                    .entry(group.to_string())
                    .or_default()
                    .members
                    .push(tx),
                None => subs.plain.push(tx),
            }
        }

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        });
        Ok(stream.boxed())
    }

    fn new_inbox(&self) -> String {
        format!("_INBOX.{}", uuid::Uuid::new_v4().simple())
    }
}
