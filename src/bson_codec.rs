/*!
 * @file bson_codec.rs
 * @brief BSON binary encoding and parsing
 */

use bytes::{Buf, BufMut};
use chrono::DateTime;

use crate::bson::{Binary, BinarySubtype, Bson, Document, ObjectId};
use crate::error::{Error, Result};

impl Document {
    /// Serialize to the BSON wire form: little-endian i32 total length
    /// (including itself and the trailing NUL), elements, `0x00`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);
        encode_document(&mut buf, self)?;
        Ok(buf)
    }

    /// Parse a single document occupying the whole buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Document> {
        let mut cursor = bytes;
        let doc = decode_document(&mut cursor)?;
        if cursor.has_remaining() {
            return Err(Error::Protocol(format!(
                "{} trailing bytes after BSON document",
                cursor.remaining()
            )));
        }
        Ok(doc)
    }
}

impl Bson {
    /// Serialize a document or array node.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);
        match self {
            Bson::Document(doc) => encode_document(&mut buf, doc)?,
            Bson::Array(items) => encode_array(&mut buf, items)?,
            other => return Err(Error::kind_mismatch("document or array", other.kind())),
        }
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Bson> {
        Ok(Bson::Document(Document::from_bytes(bytes)?))
    }
}

pub(crate) fn encode_document(buf: &mut Vec<u8>, doc: &Document) -> Result<()> {
    let start = buf.len();
    buf.put_i32_le(0);
    for (key, value) in doc.iter() {
        encode_element(buf, key, value)?;
    }
    buf.put_u8(0);
    patch_length(buf, start)
}

fn encode_array(buf: &mut Vec<u8>, items: &[Bson]) -> Result<()> {
    let start = buf.len();
    buf.put_i32_le(0);
    for (index, value) in items.iter().enumerate() {
        encode_element(buf, &index.to_string(), value)?;
    }
    buf.put_u8(0);
    patch_length(buf, start)
}

fn patch_length(buf: &mut Vec<u8>, start: usize) -> Result<()> {
    let length = buf.len() - start;
    let length = i32::try_from(length)
        .map_err(|_| Error::Bson("document exceeds i32 length".to_string()))?;
    buf[start..start + 4].copy_from_slice(&length.to_le_bytes());
    Ok(())
}

fn encode_element(buf: &mut Vec<u8>, key: &str, value: &Bson) -> Result<()> {
    buf.put_u8(value.element_type());
    put_cstring(buf, key)?;
    encode_value(buf, value)
}

fn encode_value(buf: &mut Vec<u8>, value: &Bson) -> Result<()> {
    match value {
        Bson::Double(v) => buf.put_f64_le(*v),
        Bson::String(v) | Bson::JavaScript(v) => put_string(buf, v)?,
        Bson::Document(doc) => encode_document(buf, doc)?,
        Bson::Array(items) => encode_array(buf, items)?,
        Bson::Binary(Binary { subtype, bytes }) => {
            let length = i32::try_from(bytes.len())
                .map_err(|_| Error::Bson("binary exceeds i32 length".to_string()))?;
            buf.put_i32_le(length);
            buf.put_u8(u8::from(*subtype));
            buf.put_slice(bytes);
        }
        Bson::Undefined | Bson::Null | Bson::MinKey | Bson::MaxKey => {}
        Bson::ObjectId(oid) => buf.put_slice(&oid.bytes()),
        Bson::Boolean(v) => buf.put_u8(u8::from(*v)),
        Bson::DateTime(v) => buf.put_i64_le(v.timestamp_millis()),
        Bson::RegExp { pattern, options } => {
            put_cstring(buf, pattern)?;
            put_cstring(buf, options)?;
        }
        Bson::DbPointer { namespace, id } => {
            put_string(buf, namespace)?;
            buf.put_slice(&id.bytes());
        }
        Bson::JavaScriptWithScope { code, scope } => {
            let start = buf.len();
            buf.put_i32_le(0);
            put_string(buf, code)?;
            encode_document(buf, scope)?;
            patch_length(buf, start)?;
        }
        Bson::Int32(v) => buf.put_i32_le(*v),
        Bson::Timestamp { increment, timestamp } => {
            let bits = (u64::from(*timestamp) << 32) | u64::from(*increment);
            buf.put_u64_le(bits);
        }
        Bson::Int64(v) => buf.put_i64_le(*v),
    }
    Ok(())
}

fn put_cstring(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(Error::Bson(format!("NUL byte in cstring {s:?}")));
    }
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

fn put_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let length = i32::try_from(s.len() + 1)
        .map_err(|_| Error::Bson("string exceeds i32 length".to_string()))?;
    buf.put_i32_le(length);
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

/// Parse one document, advancing the cursor past it.
pub(crate) fn decode_document(buf: &mut &[u8]) -> Result<Document> {
    need(buf, 4)?;
    let declared = buf.get_i32_le();
    if declared < 5 {
        return Err(Error::Protocol(format!("BSON document length {declared} too small")));
    }
    let body_len = declared as usize - 4;
    need(buf, body_len)?;
    let mut body: &[u8] = &buf[..body_len];
    let mut doc = Document::new();
    loop {
        need(&body, 1)?;
        let element_type = body.get_u8();
        if element_type == 0 {
            break;
        }
        let key = read_cstring(&mut body)?;
        let value = decode_value(&mut body, element_type)?;
        doc.push(key, value);
    }
    if body.has_remaining() {
        return Err(Error::Protocol("garbage after BSON document terminator".to_string()));
    }
    buf.advance(body_len);
    Ok(doc)
}

fn decode_value(buf: &mut &[u8], element_type: u8) -> Result<Bson> {
    let value = match element_type {
        0x01 => {
            need(buf, 8)?;
            Bson::Double(buf.get_f64_le())
        }
        0x02 => Bson::String(read_string(buf)?),
        0x03 => Bson::Document(decode_document(buf)?),
        0x04 => {
            let doc = decode_document(buf)?;
            Bson::Array(doc.into_iter().map(|(_, v)| v).collect())
        }
        0x05 => {
            need(buf, 5)?;
            let length = buf.get_i32_le();
            if length < 0 {
                return Err(Error::Protocol("negative binary length".to_string()));
            }
            let subtype = BinarySubtype::from(buf.get_u8());
            let length = length as usize;
            need(buf, length)?;
            let bytes = buf[..length].to_vec();
            buf.advance(length);
            Bson::Binary(Binary { subtype, bytes })
        }
        0x06 => Bson::Undefined,
        0x07 => Bson::ObjectId(read_object_id(buf)?),
        0x08 => {
            need(buf, 1)?;
            Bson::Boolean(buf.get_u8() != 0)
        }
        0x09 => {
            need(buf, 8)?;
            let millis = buf.get_i64_le();
            let datetime = DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| Error::Protocol(format!("datetime {millis}ms out of range")))?;
            Bson::DateTime(datetime)
        }
        0x0A => Bson::Null,
        0x0B => {
            let pattern = read_cstring(buf)?;
            let options = read_cstring(buf)?;
            Bson::RegExp { pattern, options }
        }
        0x0C => {
            let namespace = read_string(buf)?;
            let id = read_object_id(buf)?;
            Bson::DbPointer { namespace, id }
        }
        0x0D => Bson::JavaScript(read_string(buf)?),
        0x0F => {
            need(buf, 4)?;
            let declared = buf.get_i32_le();
            if declared < 4 {
                return Err(Error::Protocol("code-with-scope length too small".to_string()));
            }
            let code = read_string(buf)?;
            let scope = decode_document(buf)?;
            Bson::JavaScriptWithScope { code, scope }
        }
        0x10 => {
            need(buf, 4)?;
            Bson::Int32(buf.get_i32_le())
        }
        0x11 => {
            need(buf, 8)?;
            let bits = buf.get_u64_le();
            Bson::Timestamp {
                increment: (bits & 0xFFFF_FFFF) as u32,
                timestamp: (bits >> 32) as u32,
            }
        }
        0x12 => {
            need(buf, 8)?;
            Bson::Int64(buf.get_i64_le())
        }
        0x7F => Bson::MaxKey,
        0xFF => Bson::MinKey,
        other => {
            return Err(Error::Protocol(format!("unknown BSON element type {other:#04x}")));
        }
    };
    Ok(value)
}

fn read_object_id(buf: &mut &[u8]) -> Result<ObjectId> {
    need(buf, 12)?;
    let mut bytes = [0u8; 12];
    bytes.copy_from_slice(&buf[..12]);
    buf.advance(12);
    Ok(ObjectId::from_bytes(bytes))
}

fn read_cstring(buf: &mut &[u8]) -> Result<String> {
    let nul = buf
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| Error::Protocol("unterminated cstring".to_string()))?;
    let s = std::str::from_utf8(&buf[..nul])
        .map_err(|_| Error::Protocol("invalid UTF-8 in cstring".to_string()))?
        .to_string();
    buf.advance(nul + 1);
    Ok(s)
}

fn read_string(buf: &mut &[u8]) -> Result<String> {
    need(buf, 4)?;
    let length = buf.get_i32_le();
    if length < 1 {
        return Err(Error::Protocol(format!("BSON string length {length} too small")));
    }
    let length = length as usize;
    need(buf, length)?;
    if buf[length - 1] != 0 {
        return Err(Error::Protocol("BSON string missing NUL terminator".to_string()));
    }
    let s = std::str::from_utf8(&buf[..length - 1])
        .map_err(|_| Error::Protocol("invalid UTF-8 in string".to_string()))?
        .to_string();
    buf.advance(length);
    Ok(s)
}

fn need(buf: &&[u8], bytes: usize) -> Result<()> {
    if buf.remaining() < bytes {
        return Err(Error::Protocol(format!(
            "unexpected end of BSON input: wanted {bytes}, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}
