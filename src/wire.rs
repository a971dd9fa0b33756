/*!
 * @file wire.rs
 * @brief Legacy MongoDB wire protocol framing (OP_QUERY / OP_GET_MORE / OP_REPLY)
 */

use bytes::{Buf, BufMut};

use crate::bson_codec::{decode_document, encode_document};
use crate::bson::Document;
use crate::error::{Error, Result};

pub const OP_REPLY: i32 = 1;
pub const OP_QUERY: i32 = 2004;
pub const OP_GET_MORE: i32 = 2005;

/// OP_QUERY flag bits.
pub mod query_flags {
    pub const TAILABLE_CURSOR: i32 = 1 << 1;
    pub const SLAVE_OK: i32 = 1 << 2;
    pub const NO_CURSOR_TIMEOUT: i32 = 1 << 4;
    pub const AWAIT_DATA: i32 = 1 << 5;
    pub const EXHAUST: i32 = 1 << 6;
    pub const PARTIAL: i32 = 1 << 7;
}

/// OP_REPLY response flag bits.
pub mod reply_flags {
    pub const CURSOR_NOT_FOUND: i32 = 1;
    pub const QUERY_FAILURE: i32 = 1 << 1;
}

/// The 16-byte little-endian header every message starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: i32,
}

impl MsgHeader {
    pub const SIZE: usize = 16;

    pub fn read(buf: &mut &[u8]) -> Result<MsgHeader> {
        if buf.remaining() < MsgHeader::SIZE {
            return Err(Error::Protocol("reply shorter than a message header".to_string()));
        }
        Ok(MsgHeader {
            message_length: buf.get_i32_le(),
            request_id: buf.get_i32_le(),
            response_to: buf.get_i32_le(),
            op_code: buf.get_i32_le(),
        })
    }
}

/// A parsed OP_REPLY. `CursorNotFound` zeroes the cursor id at the parsing
/// boundary so callers always see a terminal cursor.
#[derive(Debug, Clone)]
pub struct Reply {
    pub flags: i32,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub documents: Vec<Document>,
}

impl Reply {
    pub fn cursor_not_found(&self) -> bool {
        self.flags & reply_flags::CURSOR_NOT_FOUND != 0
    }

    pub fn query_failure(&self) -> bool {
        self.flags & reply_flags::QUERY_FAILURE != 0
    }
}

pub fn encode_query(
    request_id: i32,
    flags: i32,
    namespace: &str,
    number_to_skip: i32,
    number_to_return: i32,
    query: &Document,
    projection: Option<&Document>,
) -> Result<Vec<u8>> {
    let mut buf = begin_message(request_id, OP_QUERY);
    buf.put_i32_le(flags);
    put_cstring(&mut buf, namespace)?;
    buf.put_i32_le(number_to_skip);
    buf.put_i32_le(number_to_return);
    encode_document(&mut buf, query)?;
    if let Some(fields) = projection {
        encode_document(&mut buf, fields)?;
    }
    finish_message(buf)
}

pub fn encode_get_more(
    request_id: i32,
    namespace: &str,
    number_to_return: i32,
    cursor_id: i64,
) -> Result<Vec<u8>> {
    let mut buf = begin_message(request_id, OP_GET_MORE);
    buf.put_i32_le(0); // reserved
    put_cstring(&mut buf, namespace)?;
    buf.put_i32_le(number_to_return);
    buf.put_i64_le(cursor_id);
    finish_message(buf)
}

fn begin_message(request_id: i32, op_code: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);
    buf.put_i32_le(0); // total length, patched in finish_message
    buf.put_i32_le(request_id);
    buf.put_i32_le(0); // responseTo
    buf.put_i32_le(op_code);
    buf
}

fn finish_message(mut buf: Vec<u8>) -> Result<Vec<u8>> {
    let length = i32::try_from(buf.len())
        .map_err(|_| Error::Protocol("message exceeds i32 length".to_string()))?;
    buf[0..4].copy_from_slice(&length.to_le_bytes());
    Ok(buf)
}

fn put_cstring(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(Error::Protocol(format!("NUL byte in namespace {s:?}")));
    }
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

/// Parse a complete reply message, header included.
pub fn decode_reply(message: &[u8]) -> Result<Reply> {
    let mut buf = message;
    let header = MsgHeader::read(&mut buf)?;
    if header.op_code != OP_REPLY {
        return Err(Error::Protocol(format!(
            "expected OP_REPLY, got op code {}",
            header.op_code
        )));
    }
    if header.message_length as usize != message.len() {
        return Err(Error::Protocol(format!(
            "reply declares {} bytes but {} arrived",
            header.message_length,
            message.len()
        )));
    }
    if buf.remaining() < 20 {
        return Err(Error::Protocol("truncated reply body".to_string()));
    }
    let flags = buf.get_i32_le();
    let cursor_id = buf.get_i64_le();
    let starting_from = buf.get_i32_le();
    let number_returned = buf.get_i32_le();

    let mut documents = Vec::with_capacity(number_returned.max(0) as usize);
    while buf.has_remaining() {
        documents.push(decode_document(&mut buf)?);
    }
    if documents.len() != number_returned.max(0) as usize {
        return Err(Error::Protocol(format!(
            "reply declares {} documents but carried {}",
            number_returned,
            documents.len()
        )));
    }

    let cursor_id = if flags & reply_flags::CURSOR_NOT_FOUND != 0 { 0 } else { cursor_id };
    Ok(Reply { flags, cursor_id, starting_from, documents })
}

/// Successor of a request id, wrapping at `i32::MAX - 1`.
pub fn next_request_id(previous: i32) -> i32 {
    if previous >= i32::MAX - 1 {
        1
    } else {
        previous + 1
    }
}

/// How many documents to ask for on the next refresh. `None` means the
/// limit is exhausted: close the cursor without sending anything.
pub fn next_batch_size(limit: i32, batch_size: i32, delivered: i32) -> Option<i32> {
    if limit == 0 {
        return Some(batch_size);
    }
    if limit < 0 {
        return Some(limit);
    }
    let remaining = limit - delivered;
    if remaining <= 0 {
        return None;
    }
    if batch_size > 0 && remaining > batch_size {
        Some(batch_size)
    } else {
        Some(remaining)
    }
}
