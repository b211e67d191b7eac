use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::ChatMessage;
use crate::relay::ClientId;

/// Registry entry for one live connection.
#[derive(Debug)]
pub struct Endpoint {
    pub peer: SocketAddr,
    pub worker: Option<task::Id>,
    /// Set once the login handshake succeeds; only logged-in endpoints
    /// receive broadcasts.
    pub user: Option<String>,
    outbound: mpsc::Sender<Arc<ChatMessage>>,
    closer: CancellationToken,
}

impl Endpoint {
    pub fn new(
        peer: SocketAddr,
        outbound: mpsc::Sender<Arc<ChatMessage>>,
        closer: CancellationToken,
    ) -> Self {
        Self {
            peer,
            worker: None,
            user: None,
            outbound,
            closer,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub skipped: usize,
    pub dead: usize,
}

/// Live connection set. Only the server loop mutates it; clones are cheap
/// read-only views for everyone else.
#[derive(Debug, Clone)]
pub struct Registry {
    clients: Arc<DashMap<ClientId, Endpoint>>,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Hands the endpoint back when the registry is full or the id is taken.
    pub fn register(&self, client: ClientId, endpoint: Endpoint) -> Result<(), Endpoint> {
        if self.is_full() || self.clients.contains_key(&client) {
            return Err(endpoint);
        }

        self.clients.insert(client, endpoint);
        Ok(())
    }

    pub fn attach_worker(&self, client: ClientId, worker: task::Id) {
        if let Some(mut entry) = self.clients.get_mut(&client) {
            entry.worker = Some(worker);
        }
    }

    pub fn mark_logged_in(&self, client: ClientId, user: String) -> bool {
        match self.clients.get_mut(&client) {
            Some(mut entry) => {
                entry.user = Some(user);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, client: ClientId) -> Option<Endpoint> {
        self.clients.remove(&client).map(|(_, endpoint)| endpoint)
    }

    /// Removes whichever entry is served by `worker`. Used when a worker
    /// died without reporting its client id.
    pub fn remove_worker(&self, worker: task::Id) -> Option<(ClientId, Endpoint)> {
        let client = self
            .clients
            .iter()
            .find(|e| e.value().worker == Some(worker))
            .map(|e| *e.key())?;

        self.clients.remove(&client)
    }

    /// Queues `message` for every logged-in endpoint except `origin`.
    ///
    /// Never waits on a recipient. A full queue skips that recipient; a
    /// closed one means its worker is gone and the entry is dropped here
    /// rather than waiting for the reap.
    pub fn broadcast(&self, message: &ChatMessage, origin: ClientId) -> Delivery {
        let shared = Arc::new(message.clone());
        let mut report = Delivery::default();
        let mut dead = Vec::new();

        for entry in self.clients.iter() {
            let (client, endpoint) = entry.pair();
            if *client == origin || endpoint.user.is_none() {
                continue;
            }

            match endpoint.outbound.try_send(Arc::clone(&shared)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        client = %client,
                        peer = %endpoint.peer,
                        "outbound queue full, skipping delivery"
                    );
                    report.skipped += 1;
                }
                Err(TrySendError::Closed(_)) => dead.push(*client),
            }
        }

        // iteration guards must be released before removing
        for client in dead {
            if self.clients.remove(&client).is_some() {
                info!(client = %client, "dropped dead endpoint during broadcast");
                report.dead += 1;
            }
        }

        debug!(
            origin = %origin,
            delivered = report.delivered,
            skipped = report.skipped,
            dead = report.dead,
            "broadcast"
        );

        report
    }

    /// Asks every registered worker to close its connection.
    pub fn close_all(&self) {
        for entry in self.clients.iter() {
            entry.value().closer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Inbox = mpsc::Receiver<Arc<ChatMessage>>;

    fn endpoint(capacity: usize) -> (Endpoint, Inbox, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity);
        let closer = CancellationToken::new();
        let peer = "127.0.0.1:40000".parse().unwrap();
        (Endpoint::new(peer, tx, closer.clone()), rx, closer)
    }

    fn logged_in(registry: &Registry, id: u64, name: &str) -> Inbox {
        let (ep, rx, _) = endpoint(8);
        registry.register(ClientId(id), ep).unwrap();
        registry.mark_logged_in(ClientId(id), name.to_string());
        rx
    }

    #[test]
    fn register_stops_at_capacity() {
        let registry = Registry::new(2);
        for id in 0..2 {
            let (ep, _rx, _) = endpoint(1);
            registry.register(ClientId(id), ep).unwrap();
        }

        let (ep, _rx, _) = endpoint(1);
        assert!(registry.register(ClientId(2), ep).is_err());
        assert_eq!(registry.len(), 2);

        registry.remove(ClientId(0));
        let (ep, _rx, _) = endpoint(1);
        assert!(registry.register(ClientId(2), ep).is_ok());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let registry = Registry::new(4);
        let (ep, _rx, _) = endpoint(1);
        registry.register(ClientId(1), ep).unwrap();

        let (ep, _rx, _) = endpoint(1);
        assert!(registry.register(ClientId(1), ep).is_err());
    }

    #[test]
    fn broadcast_skips_origin_and_pending_logins() {
        let registry = Registry::new(4);
        let mut alice = logged_in(&registry, 1, "alice");
        let mut bob = logged_in(&registry, 2, "bob");
        let (pending, mut pending_rx, _) = endpoint(8);
        registry.register(ClientId(3), pending).unwrap();

        let report = registry.broadcast(&ChatMessage::new("alice", "hello"), ClientId(1));

        assert_eq!(report.delivered, 1);
        let got = bob.try_recv().unwrap();
        assert_eq!(*got, ChatMessage::new("alice", "hello"));
        assert!(alice.try_recv().is_err());
        assert!(pending_rx.try_recv().is_err());
    }

    #[test]
    fn full_recipient_is_skipped_not_removed() {
        let registry = Registry::new(4);
        let (ep, _slow_rx, _) = endpoint(1);
        registry.register(ClientId(1), ep).unwrap();
        registry.mark_logged_in(ClientId(1), "slow".into());
        let mut fast = logged_in(&registry, 2, "fast");

        registry.broadcast(&ChatMessage::new("x", "1"), ClientId(9));
        let report = registry.broadcast(&ChatMessage::new("x", "2"), ClientId(9));

        assert_eq!(report.skipped, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(fast.try_recv().unwrap().content(), "1");
        assert_eq!(fast.try_recv().unwrap().content(), "2");
    }

    #[test]
    fn closed_recipient_is_dropped() {
        let registry = Registry::new(4);
        let gone = logged_in(&registry, 1, "gone");
        let _bob = logged_in(&registry, 2, "bob");
        drop(gone);

        let report = registry.broadcast(&ChatMessage::new("bob", "anyone?"), ClientId(2));

        assert_eq!(report.dead, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn close_all_cancels_every_worker() {
        let registry = Registry::new(4);
        let (a, _ra, closer_a) = endpoint(1);
        let (b, _rb, closer_b) = endpoint(1);
        registry.register(ClientId(1), a).unwrap();
        registry.register(ClientId(2), b).unwrap();

        registry.close_all();

        assert!(closer_a.is_cancelled());
        assert!(closer_b.is_cancelled());
    }

    #[test]
    fn remove_worker_finds_the_entry_by_task() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let registry = Registry::new(4);
        let (ep, _rx, _) = endpoint(1);
        registry.register(ClientId(5), ep).unwrap();

        let task = rt.spawn(async {});
        registry.attach_worker(ClientId(5), task.id());

        let (client, _) = registry.remove_worker(task.id()).unwrap();
        assert_eq!(client, ClientId(5));
        assert!(registry.is_empty());
        assert!(registry.remove_worker(task.id()).is_none());
    }
}
