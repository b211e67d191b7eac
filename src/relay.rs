use std::fmt;

use tokio::sync::{mpsc, oneshot};

use crate::error::RelayError;
use crate::protocol::ChatMessage;

/// Process-unique id of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a worker tells the central loop. Each event is acknowledged once
/// the central loop has acted on it.
#[derive(Debug)]
pub enum RelayEvent {
    LoggedIn {
        client: ClientId,
        user: String,
        ack: oneshot::Sender<()>,
    },
    Message {
        origin: ClientId,
        message: ChatMessage,
        ack: oneshot::Sender<()>,
    },
}

impl RelayEvent {
    pub fn client(&self) -> ClientId {
        match self {
            RelayEvent::LoggedIn { client, .. } => *client,
            RelayEvent::Message { origin, .. } => *origin,
        }
    }
}

pub fn channel(capacity: usize) -> (RelaySender, mpsc::Receiver<RelayEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (RelaySender { tx }, rx)
}

/// Shared write side of the relay. Cloned into every worker.
#[derive(Debug, Clone)]
pub struct RelaySender {
    tx: mpsc::Sender<RelayEvent>,
}

impl RelaySender {
    pub fn for_client(&self, client: ClientId) -> WorkerRelay {
        WorkerRelay {
            client,
            tx: self.tx.clone(),
        }
    }
}

/// A worker's handle on the relay, stamped with its connection id.
#[derive(Debug)]
pub struct WorkerRelay {
    client: ClientId,
    tx: mpsc::Sender<RelayEvent>,
}

impl WorkerRelay {
    pub async fn logged_in(&self, user: &str) -> Result<(), RelayError> {
        let (ack, done) = oneshot::channel();
        self.submit(
            RelayEvent::LoggedIn {
                client: self.client,
                user: user.to_string(),
                ack,
            },
            done,
        )
        .await
    }

    /// Returns once the message has been fanned out, so a worker never runs
    /// more than one record ahead of the broadcaster.
    pub async fn forward(&self, message: ChatMessage) -> Result<(), RelayError> {
        let (ack, done) = oneshot::channel();
        self.submit(
            RelayEvent::Message {
                origin: self.client,
                message,
                ack,
            },
            done,
        )
        .await
    }

    async fn submit(
        &self,
        event: RelayEvent,
        done: oneshot::Receiver<()>,
    ) -> Result<(), RelayError> {
        self.tx.send(event).await.map_err(|_| RelayError)?;
        done.await.map_err(|_| RelayError)
    }
}
