use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::{LoginReplyCodec, RecordCodec};
use crate::error::ClientError;
use crate::protocol::{ChatMessage, LoginCredential, LoginReply};

/// Client side of the chat protocol.
pub struct ChatClient {
    reader: ChatReader,
    writer: ChatWriter,
}

impl ChatClient {
    /// Connects and performs the login handshake.
    pub async fn connect(
        addr: SocketAddr,
        id: impl AsRef<[u8]>,
        password: impl AsRef<[u8]>,
    ) -> Result<Self, ClientError> {
        let socket = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect { addr, source })?;
        let (reader, writer) = socket.into_split();

        let credential = LoginCredential::new(id, password);
        let mut writer = FramedWrite::new(writer, RecordCodec::<LoginCredential>::new());
        writer.send(credential.clone()).await?;

        let mut replies = FramedRead::new(reader, LoginReplyCodec);
        let reply = match replies.next().await {
            Some(reply) => reply?,
            None => return Err(ClientError::Disconnected),
        };

        if LoginReply::from_wire(&reply) != LoginReply::Accepted {
            return Err(ClientError::LoginRejected(reply));
        }

        Ok(Self {
            reader: ChatReader {
                inner: replies.map_decoder(|_| RecordCodec::new()),
            },
            writer: ChatWriter {
                id: credential.id_bytes().clone(),
                inner: writer.map_encoder(|_| RecordCodec::new()),
            },
        })
    }

    pub fn id(&self) -> Cow<'_, str> {
        self.writer.id()
    }

    pub async fn send(&mut self, content: impl AsRef<[u8]>) -> Result<(), ClientError> {
        self.writer.send(content).await
    }

    pub async fn quit(&mut self) -> Result<(), ClientError> {
        self.writer.quit().await
    }

    pub async fn recv(&mut self) -> Result<Option<ChatMessage>, ClientError> {
        self.reader.recv().await
    }

    pub fn into_split(self) -> (ChatReader, ChatWriter) {
        (self.reader, self.writer)
    }
}

pub struct ChatReader {
    inner: FramedRead<OwnedReadHalf, RecordCodec<ChatMessage>>,
}

impl ChatReader {
    /// `None` once the server closes the connection.
    pub async fn recv(&mut self) -> Result<Option<ChatMessage>, ClientError> {
        match self.inner.next().await {
            Some(message) => Ok(Some(message?)),
            None => Ok(None),
        }
    }
}

pub struct ChatWriter {
    id: Bytes,
    inner: FramedWrite<OwnedWriteHalf, RecordCodec<ChatMessage>>,
}

impl ChatWriter {
    pub fn id(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.id)
    }

    pub async fn send(&mut self, content: impl AsRef<[u8]>) -> Result<(), ClientError> {
        self.inner.send(ChatMessage::new(&self.id, content)).await?;
        Ok(())
    }

    pub async fn quit(&mut self) -> Result<(), ClientError> {
        self.inner.send(ChatMessage::quit(&self.id)).await?;
        Ok(())
    }
}
