use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::codec::{LoginReplyCodec, RecordCodec};
use crate::error::{ProtocolError, RelayError};
use crate::protocol::{ChatMessage, LoginCredential, LoginReply};
use crate::relay::{ClientId, WorkerRelay};

/// Everything one connection worker needs besides its socket.
pub struct WorkerCtx {
    pub relay: WorkerRelay,
    pub outbound: mpsc::Receiver<Arc<ChatMessage>>,
    pub auth: Arc<dyn Authenticator>,
    pub closer: CancellationToken,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// How a worker ended when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Peer closed before sending a full credential.
    NoLogin,
    LoginRejected,
    /// Peer sent the quit sentinel.
    Quit,
    /// Peer closed the connection.
    Closed,
    /// Server asked the worker to stop.
    Shutdown,
}

/// Runs one connection to completion and reports which client it served.
///
/// Cancelling `ctx.closer` interrupts the worker at any await, including a
/// socket write to a peer that stopped reading.
pub async fn handle(
    client: ClientId,
    ctx: WorkerCtx,
    socket: TcpStream,
) -> (ClientId, Result<Exit, WorkerError>) {
    let closer = ctx.closer.clone();

    let result = match closer.run_until_cancelled(serve(ctx, socket)).await {
        Some(result) => result,
        None => Ok(Exit::Shutdown),
    };

    (client, result)
}

async fn serve(mut ctx: WorkerCtx, socket: TcpStream) -> Result<Exit, WorkerError> {
    let (reader, writer) = socket.into_split();

    let mut logins = FramedRead::new(reader, RecordCodec::<LoginCredential>::new());
    let mut replies = FramedWrite::new(writer, LoginReplyCodec);

    let credential = match logins.next().await {
        Some(Ok(credential)) => credential,
        Some(Err(err)) => return Err(err.into()),
        None => return Ok(Exit::NoLogin),
    };

    if !ctx.auth.authenticate(&credential) {
        info!(user = %credential.id(), "login rejected");
        replies.send(LoginReply::Rejected).await?;
        return Ok(Exit::LoginRejected);
    }

    // become addressable before the client learns it may start chatting
    ctx.relay.logged_in(&credential.id()).await?;
    replies.send(LoginReply::Accepted).await?;
    info!(user = %credential.id(), "logged in");

    let mut inbound = logins.map_decoder(|_| RecordCodec::<ChatMessage>::new());
    let mut deliveries = replies.map_encoder(|_| RecordCodec::<ChatMessage>::new());

    let exit = loop {
        tokio::select! {
            // Branch A: broadcast from another client
            delivery = ctx.outbound.recv() => match delivery {
                Some(message) => deliveries.send(message).await?,
                None => break Exit::Shutdown,
            },

            // Branch B: record from our own client
            next = inbound.next() => match next {
                Some(Ok(message)) => {
                    let quit = message.is_quit();
                    debug!(
                        sender = %message.sender(),
                        len = message.content_bytes().len(),
                        "relaying"
                    );
                    ctx.relay.forward(message).await?;
                    if quit {
                        break Exit::Quit;
                    }
                }
                Some(Err(err)) => return Err(err.into()),
                None => break Exit::Closed,
            },
        }
    };

    // dropping both halves closes the socket
    Ok(exit)
}
