/*!
 * Unit tests for wire framing: headers, OP_QUERY/OP_GET_MORE layout,
 * reply parsing, batch sizing, request ids.
 * No server required.
 */

use anyhow::Result;
use mongolink::wire::{
    decode_reply, encode_get_more, encode_query, next_batch_size, next_request_id, query_flags,
    reply_flags, MsgHeader, OP_GET_MORE, OP_QUERY, OP_REPLY,
};
use mongolink::{doc, Document, Error};

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(bytes[at..at + 4].try_into().expect("four bytes"))
}

fn read_i64(bytes: &[u8], at: usize) -> i64 {
    i64::from_le_bytes(bytes[at..at + 8].try_into().expect("eight bytes"))
}

#[test]
fn op_query_layout() -> Result<()> {
    let query = doc! { "find": "things" };
    let projection = doc! { "x": 1 };
    let message = encode_query(
        7,
        query_flags::SLAVE_OK,
        "db.things",
        5,
        20,
        &query,
        Some(&projection),
    )?;

    // header
    assert_eq!(read_i32(&message, 0), message.len() as i32);
    assert_eq!(read_i32(&message, 4), 7); // requestID
    assert_eq!(read_i32(&message, 8), 0); // responseTo
    assert_eq!(read_i32(&message, 12), OP_QUERY);
    // body: flags, cstring namespace, skip, numberToReturn
    assert_eq!(read_i32(&message, 16), query_flags::SLAVE_OK);
    let namespace_end = 20 + "db.things".len();
    assert_eq!(&message[20..namespace_end], b"db.things");
    assert_eq!(message[namespace_end], 0);
    let after_ns = namespace_end + 1;
    assert_eq!(read_i32(&message, after_ns), 5);
    assert_eq!(read_i32(&message, after_ns + 4), 20);
    // query document, then projection document, then nothing
    let query_bytes = query.to_bytes()?;
    let projection_bytes = projection.to_bytes()?;
    let docs_at = after_ns + 8;
    assert_eq!(&message[docs_at..docs_at + query_bytes.len()], &query_bytes[..]);
    let proj_at = docs_at + query_bytes.len();
    assert_eq!(&message[proj_at..], &projection_bytes[..]);
    Ok(())
}

#[test]
fn op_query_without_projection_ends_at_the_query() -> Result<()> {
    let query = doc! { "a": 1 };
    let message = encode_query(1, 0, "db.c", 0, 0, &query, None)?;
    let expected_len = 16 + 4 + "db.c".len() + 1 + 8 + query.to_bytes()?.len();
    assert_eq!(message.len(), expected_len);
    Ok(())
}

#[test]
fn op_get_more_layout() -> Result<()> {
    let message = encode_get_more(9, "db.c", 50, 0x0102_0304_0506_0708)?;
    assert_eq!(read_i32(&message, 0), message.len() as i32);
    assert_eq!(read_i32(&message, 4), 9);
    assert_eq!(read_i32(&message, 12), OP_GET_MORE);
    assert_eq!(read_i32(&message, 16), 0); // reserved ZERO
    assert_eq!(&message[20..24], b"db.c");
    assert_eq!(message[24], 0);
    assert_eq!(read_i32(&message, 25), 50);
    assert_eq!(read_i64(&message, 29), 0x0102_0304_0506_0708);
    Ok(())
}

fn fake_reply(flags: i32, cursor_id: i64, docs: &[Document]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&flags.to_le_bytes());
    body.extend_from_slice(&cursor_id.to_le_bytes());
    body.extend_from_slice(&0i32.to_le_bytes()); // startingFrom
    body.extend_from_slice(&(docs.len() as i32).to_le_bytes());
    for doc in docs {
        body.extend_from_slice(&doc.to_bytes().expect("encodable test doc"));
    }
    let total = (16 + body.len()) as i32;
    let mut message = Vec::new();
    message.extend_from_slice(&total.to_le_bytes());
    message.extend_from_slice(&3i32.to_le_bytes()); // requestID
    message.extend_from_slice(&7i32.to_le_bytes()); // responseTo
    message.extend_from_slice(&OP_REPLY.to_le_bytes());
    message.extend_from_slice(&body);
    message
}

#[test]
fn decode_reply_round_trip() -> Result<()> {
    let docs = vec![doc! { "i": 1 }, doc! { "i": 2 }];
    let reply = decode_reply(&fake_reply(0, 99, &docs))?;
    assert_eq!(reply.flags, 0);
    assert_eq!(reply.cursor_id, 99);
    assert_eq!(reply.starting_from, 0);
    assert_eq!(reply.documents, docs);
    assert!(!reply.cursor_not_found());
    assert!(!reply.query_failure());
    Ok(())
}

#[test]
fn cursor_not_found_zeroes_the_cursor_id() -> Result<()> {
    let reply = decode_reply(&fake_reply(reply_flags::CURSOR_NOT_FOUND, 1234, &[]))?;
    assert!(reply.cursor_not_found());
    assert_eq!(reply.cursor_id, 0);
    Ok(())
}

#[test]
fn malformed_replies_are_protocol_errors() {
    // wrong op code
    let mut message = fake_reply(0, 0, &[]);
    message[12..16].copy_from_slice(&OP_QUERY.to_le_bytes());
    assert!(matches!(decode_reply(&message), Err(Error::Protocol(_))));

    // declared length disagrees with the buffer
    let mut message = fake_reply(0, 0, &[]);
    message[0..4].copy_from_slice(&999i32.to_le_bytes());
    assert!(matches!(decode_reply(&message), Err(Error::Protocol(_))));

    // document count mismatch
    let mut message = fake_reply(0, 0, &[doc! { "i": 1 }]);
    let count_at = 16 + 4 + 8 + 4;
    message[count_at..count_at + 4].copy_from_slice(&5i32.to_le_bytes());
    assert!(matches!(decode_reply(&message), Err(Error::Protocol(_))));

    // short buffer
    assert!(matches!(decode_reply(&[0u8; 10]), Err(Error::Protocol(_))));
}

#[test]
fn header_read_matches_layout() -> Result<()> {
    let message = fake_reply(0, 0, &[]);
    let mut cursor = &message[..];
    let header = MsgHeader::read(&mut cursor)?;
    assert_eq!(header.message_length as usize, message.len());
    assert_eq!(header.request_id, 3);
    assert_eq!(header.response_to, 7);
    assert_eq!(header.op_code, OP_REPLY);
    Ok(())
}

#[test]
fn batch_size_rule() {
    // no limit: ask for the batch size (0 lets the server decide)
    assert_eq!(next_batch_size(0, 0, 0), Some(0));
    assert_eq!(next_batch_size(0, 25, 100), Some(25));
    // negative limit is a single-batch hard cap
    assert_eq!(next_batch_size(-1, 25, 0), Some(-1));
    assert_eq!(next_batch_size(-7, 0, 3), Some(-7));
    // positive limit counts down by delivered documents
    assert_eq!(next_batch_size(10, 0, 0), Some(10));
    assert_eq!(next_batch_size(10, 4, 0), Some(4));
    assert_eq!(next_batch_size(10, 4, 8), Some(2));
    assert_eq!(next_batch_size(10, 0, 9), Some(1));
    // exhausted: close without sending
    assert_eq!(next_batch_size(10, 0, 10), None);
    assert_eq!(next_batch_size(10, 4, 12), None);
}

#[test]
fn request_ids_increment_and_wrap() {
    assert_eq!(next_request_id(0), 1);
    assert_eq!(next_request_id(41), 42);
    let mut id = i32::MAX - 3;
    for _ in 0..2 {
        id = next_request_id(id);
    }
    assert_eq!(id, i32::MAX - 1);
    assert_eq!(next_request_id(id), 1);
    assert_eq!(next_request_id(i32::MAX), 1);
}
