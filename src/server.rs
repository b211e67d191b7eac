use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::conn::{self, Exit, WorkerCtx, WorkerError};
use crate::error::ServerError;
use crate::registry::{Endpoint, Registry};
use crate::relay::{self, ClientId, RelayEvent, RelaySender};

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    registry: Registry,
    auth: Arc<dyn Authenticator>,
}

impl Server {
    pub async fn bind(
        config: ServerConfig,
        auth: Arc<dyn Authenticator>,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let addr = config.bind_addr()?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let registry = Registry::new(config.max_clients);

        Ok(Self {
            listener,
            config,
            registry,
            auth,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Read-only view of the live connection set.
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Accepts and relays until `shutdown` fires, then closes every
    /// connection and waits for all workers before returning.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, max_clients = self.config.max_clients, "listening");
        }

        let Server {
            listener,
            config,
            registry,
            auth,
        } = self;

        let (relay_tx, mut relay_rx) = relay::channel(config.relay_capacity);
        let mut hub = Hub {
            registry,
            auth,
            relay: relay_tx,
            outbound_capacity: config.outbound_capacity,
            workers: JoinSet::new(),
            next_client: 0,
        };

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => hub.admit(socket, peer),
                    Err(err) => warn!(error = %err, "accept failed"),
                },

                Some(event) = relay_rx.recv() => hub.on_relay(event),

                Some(joined) = hub.workers.join_next() => reap(&hub.registry, joined),
            }
        }

        info!(clients = hub.registry.len(), "shutting down");
        drop(listener);
        hub.registry.close_all();

        // Workers may still be waiting on an ack, so keep serving the relay
        // until the last one is joined.
        let Hub {
            registry,
            mut workers,
            relay,
            ..
        } = hub;
        drop(relay);

        loop {
            tokio::select! {
                Some(event) = relay_rx.recv() => {
                    debug!(client = %event.client(), "relay event during shutdown");
                    on_relay(&registry, event);
                }

                joined = workers.join_next() => match joined {
                    Some(joined) => reap(&registry, joined),
                    None => break,
                },
            }
        }

        info!("all workers stopped");
        Ok(())
    }
}

/// State owned by the central loop.
struct Hub {
    registry: Registry,
    auth: Arc<dyn Authenticator>,
    relay: RelaySender,
    outbound_capacity: usize,
    workers: JoinSet<(ClientId, Result<Exit, WorkerError>)>,
    next_client: u64,
}

impl Hub {
    fn admit(&mut self, socket: TcpStream, peer: SocketAddr) {
        if self.registry.is_full() {
            info!(
                %peer,
                capacity = self.registry.capacity(),
                "registry full, closing connection"
            );
            drop(socket);
            return;
        }

        let client = ClientId(self.next_client);
        self.next_client += 1;

        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_capacity);
        let closer = CancellationToken::new();

        // registered before the worker runs, so a fast exit still finds its entry
        if self
            .registry
            .register(client, Endpoint::new(peer, outbound_tx, closer.clone()))
            .is_err()
        {
            warn!(%client, %peer, "registration refused, closing connection");
            return;
        }

        let ctx = WorkerCtx {
            relay: self.relay.for_client(client),
            outbound: outbound_rx,
            auth: Arc::clone(&self.auth),
            closer,
        };

        let span = info_span!("worker", %client, %peer);
        let handle = self
            .workers
            .spawn(conn::handle(client, ctx, socket).instrument(span));
        self.registry.attach_worker(client, handle.id());

        info!(%client, %peer, clients = self.registry.len(), "connection accepted");
    }

    fn on_relay(&self, event: RelayEvent) {
        on_relay(&self.registry, event);
    }
}

fn on_relay(registry: &Registry, event: RelayEvent) {
    match event {
        RelayEvent::LoggedIn { client, user, ack } => {
            if !registry.mark_logged_in(client, user) {
                warn!(%client, "login for unknown client");
            }
            let _ = ack.send(());
        }

        RelayEvent::Message {
            origin,
            message,
            ack,
        } => {
            if message.is_quit() {
                info!(%origin, sender = %message.sender(), "client quit");
            } else {
                registry.broadcast(&message, origin);
            }
            let _ = ack.send(());
        }
    }
}

fn reap(registry: &Registry, joined: Result<(ClientId, Result<Exit, WorkerError>), JoinError>) {
    let (client, endpoint) = match joined {
        Ok((client, result)) => {
            match result {
                Ok(exit) => debug!(%client, ?exit, "worker finished"),
                Err(err) => warn!(%client, error = %err, "worker failed"),
            }
            (client, registry.remove(client))
        }

        // a panicked or aborted task never returned its client id
        Err(err) => {
            if err.is_panic() {
                error!(worker = %err.id(), "worker panicked");
            } else {
                warn!(worker = %err.id(), error = %err, "worker cancelled");
            }
            match registry.remove_worker(err.id()) {
                Some((client, endpoint)) => (client, Some(endpoint)),
                None => return,
            }
        }
    };

    if let Some(endpoint) = endpoint {
        info!(%client, peer = %endpoint.peer, clients = registry.len(), "client removed");
    }
}
