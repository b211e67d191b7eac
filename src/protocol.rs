use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};

pub const DEFAULT_PORT: u16 = 5100;

pub const ID_LEN: usize = 20;
pub const PASSWORD_LEN: usize = 20;
pub const CONTENT_LEN: usize = 8192;

/// Content a client sends when it is leaving.
pub const QUIT_SENTINEL: &str = "q";

/// Longest login reply a client will buffer while waiting for the NUL.
pub const MAX_REPLY_LEN: usize = 64;

/// A fixed-width record on the wire.
pub trait Record: Sized {
    const SIZE: usize;

    fn write_to(&self, dst: &mut BytesMut);

    /// `src` is exactly `SIZE` bytes long.
    fn read_from(src: Bytes) -> Self;
}

/// Fields are raw bytes; the text accessors are lossy views for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredential {
    id: Bytes,
    password: Bytes,
}

impl LoginCredential {
    pub fn new(id: impl AsRef<[u8]>, password: impl AsRef<[u8]>) -> Self {
        Self {
            id: field(id.as_ref(), ID_LEN),
            password: field(password.as_ref(), PASSWORD_LEN),
        }
    }

    pub fn id(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.id)
    }

    pub fn id_bytes(&self) -> &Bytes {
        &self.id
    }

    pub fn password(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.password)
    }
}

impl Record for LoginCredential {
    const SIZE: usize = ID_LEN + PASSWORD_LEN;

    fn write_to(&self, dst: &mut BytesMut) {
        put_field(dst, &self.id, ID_LEN);
        put_field(dst, &self.password, PASSWORD_LEN);
    }

    fn read_from(src: Bytes) -> Self {
        Self {
            id: get_field(&src, 0, ID_LEN),
            password: get_field(&src, ID_LEN, PASSWORD_LEN),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    sender: Bytes,
    content: Bytes,
}

impl ChatMessage {
    /// Both fields are cut to their wire width here, so a message looks the
    /// same before and after it crosses the relay.
    pub fn new(sender: impl AsRef<[u8]>, content: impl AsRef<[u8]>) -> Self {
        Self {
            sender: field(sender.as_ref(), ID_LEN),
            content: field(content.as_ref(), CONTENT_LEN),
        }
    }

    pub fn quit(sender: impl AsRef<[u8]>) -> Self {
        Self::new(sender, QUIT_SENTINEL)
    }

    pub fn sender(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.sender)
    }

    pub fn content(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    pub fn sender_bytes(&self) -> &Bytes {
        &self.sender
    }

    pub fn content_bytes(&self) -> &Bytes {
        &self.content
    }

    pub fn is_quit(&self) -> bool {
        self.content == QUIT_SENTINEL.as_bytes()
    }
}

impl Record for ChatMessage {
    const SIZE: usize = ID_LEN + CONTENT_LEN;

    fn write_to(&self, dst: &mut BytesMut) {
        put_field(dst, &self.sender, ID_LEN);
        put_field(dst, &self.content, CONTENT_LEN);
    }

    fn read_from(src: Bytes) -> Self {
        Self {
            sender: get_field(&src, 0, ID_LEN),
            content: get_field(&src, ID_LEN, CONTENT_LEN),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReply {
    Accepted,
    Rejected,
}

impl LoginReply {
    pub const ACCEPTED: &'static str = "LOGIN OK";
    pub const REJECTED: &'static str = "LOGIN FAILED";

    pub fn as_str(self) -> &'static str {
        match self {
            LoginReply::Accepted => Self::ACCEPTED,
            LoginReply::Rejected => Self::REJECTED,
        }
    }

    /// Only the exact success string counts as a successful login.
    pub fn from_wire(reply: &str) -> Self {
        if reply == Self::ACCEPTED {
            LoginReply::Accepted
        } else {
            LoginReply::Rejected
        }
    }
}

/// Value as the peer will see it: cut at the first NUL, then at `width`.
fn field(value: &[u8], width: usize) -> Bytes {
    let end = value
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(value.len())
        .min(width);
    Bytes::copy_from_slice(&value[..end])
}

fn put_field(dst: &mut BytesMut, value: &[u8], width: usize) {
    dst.put_slice(value);
    dst.put_bytes(0, width - value.len());
}

fn get_field(src: &Bytes, offset: usize, width: usize) -> Bytes {
    let raw = &src[offset..offset + width];
    let len = raw.iter().position(|&b| b == 0).unwrap_or(width);
    src.slice(offset..offset + len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<R: Record>(record: &R) -> Bytes {
        let mut buf = BytesMut::new();
        record.write_to(&mut buf);
        buf.freeze()
    }

    #[test]
    fn credential_fields_are_nul_padded() {
        let buf = encode(&LoginCredential::new("alice", "secret"));

        assert_eq!(buf.len(), LoginCredential::SIZE);
        assert_eq!(&buf[..5], b"alice");
        assert!(buf[5..ID_LEN].iter().all(|&b| b == 0));
        assert_eq!(&buf[ID_LEN..ID_LEN + 6], b"secret");
    }

    #[test]
    fn message_survives_the_wire() {
        let msg = ChatMessage::new("alice", "hello");
        let decoded = ChatMessage::read_from(encode(&msg));

        assert_eq!(decoded.sender(), "alice");
        assert_eq!(decoded.content(), "hello");
    }

    #[test]
    fn oversized_sender_does_not_bleed_into_content() {
        let msg = ChatMessage::new("x".repeat(40), "body");
        let buf = encode(&msg);

        assert_eq!(buf.len(), ChatMessage::SIZE);
        assert_eq!(msg.sender_bytes().len(), ID_LEN);

        let decoded = ChatMessage::read_from(buf);
        assert_eq!(decoded.sender(), "x".repeat(ID_LEN));
        assert_eq!(decoded.content(), "body");
    }

    #[test]
    fn oversized_content_is_cut_at_the_bound() {
        let long = "a".repeat(CONTENT_LEN + 100);
        let msg = ChatMessage::new("bob", &long);

        assert_eq!(msg.content_bytes().len(), CONTENT_LEN);
        assert_eq!(ChatMessage::read_from(encode(&msg)), msg);
    }

    #[test]
    fn non_utf8_bytes_are_kept_verbatim() {
        let sender = [0xff_u8; ID_LEN];
        let content = [0xc7_u8, 0xd1, 0xb1, 0xdb];
        let msg = ChatMessage::new(sender, content);

        let decoded = ChatMessage::read_from(encode(&msg));
        assert_eq!(&decoded.sender_bytes()[..], &sender[..]);
        assert_eq!(&decoded.content_bytes()[..], &content[..]);
    }

    #[test]
    fn truncation_is_by_byte_width() {
        // 19 ascii bytes then a 3-byte char straddling the 20 byte limit
        let id = format!("{}€", "a".repeat(19));
        let cred = LoginCredential::new(&id, "pw");

        assert_eq!(&cred.id_bytes()[..], &id.as_bytes()[..ID_LEN]);
        assert_eq!(LoginCredential::read_from(encode(&cred)), cred);
    }

    #[test]
    fn embedded_nul_ends_the_field() {
        let msg = ChatMessage::new("bob", b"before\0after");
        assert_eq!(msg.content(), "before");
    }

    #[test]
    fn field_without_terminator_uses_full_width() {
        let mut raw = vec![b'z'; ID_LEN];
        raw.extend_from_slice(b"pw");
        raw.resize(LoginCredential::SIZE, 0);

        let cred = LoginCredential::read_from(Bytes::from(raw));
        assert_eq!(cred.id(), "z".repeat(ID_LEN));
        assert_eq!(cred.password(), "pw");
    }

    #[test]
    fn only_exact_q_is_the_sentinel() {
        assert!(ChatMessage::quit("a").is_quit());
        assert!(!ChatMessage::new("a", "quit").is_quit());
        assert!(!ChatMessage::new("a", "q ").is_quit());
    }

    #[test]
    fn login_reply_requires_exact_match() {
        assert_eq!(LoginReply::from_wire("LOGIN OK"), LoginReply::Accepted);
        assert_eq!(LoginReply::from_wire("LOGIN OK!"), LoginReply::Rejected);
        assert_eq!(LoginReply::from_wire(""), LoginReply::Rejected);
    }
}
