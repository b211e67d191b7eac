use std::marker::PhantomData;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::protocol::{LoginReply, MAX_REPLY_LEN, Record};

/// Frames a stream as back-to-back fixed-size records of type `R`.
#[derive(Debug)]
pub struct RecordCodec<R> {
    _record: PhantomData<fn() -> R>,
}

impl<R> RecordCodec<R> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<R> Default for RecordCodec<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> Decoder for RecordCodec<R> {
    type Item = R;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<R>, ProtocolError> {
        if src.len() < R::SIZE {
            src.reserve(R::SIZE - src.len());
            return Ok(None);
        }

        let frame = src.split_to(R::SIZE);
        Ok(Some(R::read_from(frame.freeze())))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<R>, ProtocolError> {
        match self.decode(src)? {
            Some(record) => Ok(Some(record)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::TruncatedRecord {
                expected: R::SIZE,
                got: src.len(),
            }),
        }
    }
}

impl<R: Record> Encoder<R> for RecordCodec<R> {
    type Error = ProtocolError;

    fn encode(&mut self, record: R, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        put_record(&record, dst);
        Ok(())
    }
}

// Broadcast deliveries share one message between every recipient queue.
impl<R: Record> Encoder<Arc<R>> for RecordCodec<R> {
    type Error = ProtocolError;

    fn encode(&mut self, record: Arc<R>, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        put_record(record.as_ref(), dst);
        Ok(())
    }
}

fn put_record<R: Record>(record: &R, dst: &mut BytesMut) {
    dst.reserve(R::SIZE);
    record.write_to(dst);
}

/// NUL-terminated login result string.
#[derive(Debug, Default)]
pub struct LoginReplyCodec;

impl Decoder for LoginReplyCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, ProtocolError> {
        match src.iter().position(|&b| b == 0) {
            Some(end) => {
                let frame = src.split_to(end + 1);
                Ok(Some(String::from_utf8_lossy(&frame[..end]).into_owned()))
            }
            None if src.len() > MAX_REPLY_LEN => Err(ProtocolError::ReplyTooLong {
                max: MAX_REPLY_LEN,
            }),
            None => Ok(None),
        }
    }
}

impl Encoder<LoginReply> for LoginReplyCodec {
    type Error = ProtocolError;

    fn encode(&mut self, reply: LoginReply, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let text = reply.as_str().as_bytes();
        dst.reserve(text.len() + 1);
        dst.put_slice(text);
        dst.put_u8(0);
        Ok(())
    }
}
