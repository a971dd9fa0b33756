/*!
 * Unit tests for the BSON value model and binary codec.
 * No server required.
 */

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use mongolink::{bson, doc, merge, update, Binary, BinarySubtype, Bson, Document, Error, ObjectId};

fn sample_oid() -> ObjectId {
    ObjectId::parse_str("0102030405060708090a0b0c").expect("static oid")
}

#[test]
fn canonical_hello_world_bytes() -> Result<()> {
    let doc = doc! { "hello": "world" };
    let bytes = doc.to_bytes()?;
    assert_eq!(
        bytes,
        b"\x16\x00\x00\x00\x02hello\x00\x06\x00\x00\x00world\x00\x00"
    );
    assert_eq!(Document::from_bytes(&bytes)?, doc);
    Ok(())
}

#[test]
fn round_trip_every_kind() -> Result<()> {
    let time = Utc.with_ymd_and_hms(2020, 5, 17, 9, 30, 0).unwrap();
    let doc = doc! {
        "double": 0.25,
        "string": "text",
        "document": { "nested": 1 },
        "array": [1, 2, 3],
        "binary": Binary::generic(vec![0xDE, 0xAD, 0xBE, 0xEF]),
        "binary_md5": Binary { subtype: BinarySubtype::Md5, bytes: vec![0u8; 16] },
        "binary_user": Binary { subtype: BinarySubtype::UserDefined(0x85), bytes: vec![1, 2] },
        "undefined": Bson::Undefined,
        "oid": sample_oid(),
        "bool": true,
        "time": time,
        "null": null,
        "regex": Bson::RegExp { pattern: "^a.*z$".to_string(), options: "i".to_string() },
        "dbpointer": Bson::DbPointer { namespace: "db.coll".to_string(), id: sample_oid() },
        "js": Bson::JavaScript("function() { return 1; }".to_string()),
        "js_scope": Bson::JavaScriptWithScope {
            code: "function() { return x; }".to_string(),
            scope: doc! { "x": 42 },
        },
        "int32": 7,
        "timestamp": Bson::Timestamp { increment: 1, timestamp: 1590000000 },
        "int64": 9007199254740993i64,
        "min": Bson::MinKey,
        "max": Bson::MaxKey,
    };
    let parsed = Document::from_bytes(&doc.to_bytes()?)?;
    assert_eq!(parsed, doc);
    Ok(())
}

#[test]
fn timestamp_is_bit_punned_little_endian() -> Result<()> {
    let doc = doc! { "ts": Bson::Timestamp { increment: 1, timestamp: 2 } };
    let bytes = doc.to_bytes()?;
    // payload starts after: i32 length, type byte, "ts\0"
    let payload = &bytes[4 + 1 + 3..4 + 1 + 3 + 8];
    let bits = u64::from_le_bytes(payload.try_into()?);
    assert_eq!(bits, (2u64 << 32) | 1);
    Ok(())
}

#[test]
fn datetime_millis_survive_the_wire() -> Result<()> {
    let time = DateTime::from_timestamp_millis(1_589_707_800_123).expect("in range");
    let doc = doc! { "at": time };
    let parsed = Document::from_bytes(&doc.to_bytes()?)?;
    assert_eq!(parsed.get("at"), Some(&Bson::DateTime(time)));
    Ok(())
}

#[test]
fn document_keeps_order_and_duplicates() -> Result<()> {
    let mut doc = Document::new();
    doc.push("a", 1);
    doc.push("b", 2);
    doc.push("a", 3);
    let parsed = Document::from_bytes(&doc.to_bytes()?)?;
    let entries: Vec<(String, Bson)> = parsed.into_iter().collect();
    assert_eq!(
        entries,
        vec![
            ("a".to_string(), Bson::Int32(1)),
            ("b".to_string(), Bson::Int32(2)),
            ("a".to_string(), Bson::Int32(3)),
        ]
    );
    Ok(())
}

#[test]
fn array_serializes_with_decimal_indices() -> Result<()> {
    let bytes = Bson::Array(vec![Bson::Int32(10), Bson::Int32(20)]).to_bytes()?;
    // keys "0" and "1" appear as cstrings
    assert!(bytes.windows(2).any(|w| w == b"0\x00"));
    assert!(bytes.windows(2).any(|w| w == b"1\x00"));
    Ok(())
}

#[test]
fn contains_and_len() {
    let doc = bson!({ "a": 1, "b": [1, 2, 3] });
    assert!(doc.contains_key("a"));
    assert!(!doc.contains_key("missing"));
    assert!(!Bson::Int32(5).contains_key("a"));
    assert_eq!(doc.len().unwrap(), 2);
    assert_eq!(doc.lookup(&["b"]).unwrap().len().unwrap(), 3);
    assert!(Bson::Null.len().is_err());
}

#[test]
fn typed_accessors_enforce_kinds() {
    let value = Bson::Int32(3);
    assert_eq!(value.as_i32().unwrap(), 3);
    assert_eq!(value.as_int().unwrap(), 3);
    assert!(matches!(value.as_f64(), Err(Error::KindMismatch { .. })));
    assert!(matches!(value.as_str(), Err(Error::KindMismatch { .. })));
    assert_eq!(Bson::Int64(9).as_int().unwrap(), 9);
    assert!(matches!(Bson::Double(1.5).as_int(), Err(Error::KindMismatch { .. })));
    assert!(matches!(
        Bson::String("x".to_string()).get("k"),
        Err(Error::KindMismatch { .. })
    ));
}

#[test]
fn array_access_is_bounds_checked() {
    let arr = bson!([1, 2]);
    assert_eq!(arr.at(1).unwrap(), &Bson::Int32(2));
    assert!(arr.at(2).is_err());
    assert!(Bson::Null.at(0).is_err());
}

#[test]
fn path_lookup_and_put() -> Result<()> {
    let mut root = bson!({ "outer": { "inner": 1 } });
    assert_eq!(root.lookup(&["outer", "inner"]), Some(&Bson::Int32(1)));
    assert_eq!(root.lookup(&["outer", "absent"]), None);
    assert_eq!(root.lookup(&["outer", "inner", "deeper"]), None);

    root.put(&["fresh", "leaf"], 7)?;
    assert_eq!(root.lookup(&["fresh", "leaf"]), Some(&Bson::Int32(7)));
    // writing through a scalar replaces it with a document
    root.put(&["outer", "inner", "deeper"], true)?;
    assert_eq!(root.lookup(&["outer", "inner", "deeper"]), Some(&Bson::Boolean(true)));
    Ok(())
}

#[test]
fn merge_laws() {
    let a = bson!({ "x": 1, "sub": { "k": 1, "only_a": 2 }, "arr": [1, 2, 3] });
    let b = bson!({ "y": 4, "sub": { "k": 9, "only_b": 5 }, "arr": [7] });
    let empty = bson!({});

    assert_eq!(merge(&a, &empty), a);
    assert_eq!(merge(&empty, &b), b);

    let merged = merge(&a, &b);
    // keys of a win; keys only in b are appended
    assert_eq!(merged.lookup(&["x"]), Some(&Bson::Int32(1)));
    assert_eq!(merged.lookup(&["y"]), Some(&Bson::Int32(4)));
    assert_eq!(merged.lookup(&["sub", "k"]), Some(&Bson::Int32(1)));
    assert_eq!(merged.lookup(&["sub", "only_a"]), Some(&Bson::Int32(2)));
    assert_eq!(merged.lookup(&["sub", "only_b"]), Some(&Bson::Int32(5)));
    // arrays merge index-wise, keeping the longer tail
    assert_eq!(
        merged.lookup(&["arr"]),
        Some(&Bson::Array(vec![Bson::Int32(1), Bson::Int32(2), Bson::Int32(3)]))
    );

    // non-containers keep the left side
    assert_eq!(merge(&Bson::Int32(1), &Bson::Int32(2)), Bson::Int32(1));

    let mut target = a.clone();
    update(&mut target, &b);
    assert_eq!(target, merged);
}

#[test]
fn object_id_generation_is_unique_and_printable() {
    let first = ObjectId::new();
    let second = ObjectId::new();
    assert_ne!(first, second);
    let text = first.to_string();
    assert_eq!(text.len(), 24);
    assert_eq!(ObjectId::parse_str(&text).unwrap(), first);
    assert!(ObjectId::parse_str("not hex").is_err());
    assert!(ObjectId::parse_str("0102").is_err());
}

#[test]
fn binary_uuid_helpers() -> Result<()> {
    let id = uuid::Uuid::new_v4();
    let bin = Binary::from_uuid(id);
    assert_eq!(bin.subtype, BinarySubtype::Uuid);
    assert_eq!(bin.to_uuid()?, id);
    assert!(Binary::generic(vec![1, 2]).to_uuid().is_err());
    Ok(())
}

#[test]
fn malformed_input_is_a_protocol_error() {
    // truncated length prefix
    assert!(matches!(Document::from_bytes(&[4, 0]), Err(Error::Protocol(_))));
    // declared length larger than the buffer
    assert!(matches!(
        Document::from_bytes(&[40, 0, 0, 0, 0]),
        Err(Error::Protocol(_))
    ));
    // unknown element type 0x63 under key "k"
    let bad = b"\x0c\x00\x00\x00\x63k\x00\x01\x00\x00\x00\x00";
    assert!(matches!(Document::from_bytes(bad), Err(Error::Protocol(_))));
}

#[test]
fn insert_replaces_but_push_appends() {
    let mut doc = Document::new();
    doc.insert("k", 1);
    doc.insert("k", 2);
    assert_eq!(doc.len(), 1);
    assert_eq!(doc.get("k"), Some(&Bson::Int32(2)));
    doc.push("k", 3);
    assert_eq!(doc.len(), 2);
    // get finds the first occurrence
    assert_eq!(doc.get("k"), Some(&Bson::Int32(2)));
    assert_eq!(doc.remove("k"), Some(Bson::Int32(2)));
    assert_eq!(doc.get("k"), Some(&Bson::Int32(3)));
}

#[test]
fn macro_accepts_expressions_and_nesting() {
    let limit = 10;
    let name = "events".to_string();
    let built = Bson::Document(doc! {
        "collection": name.clone(),
        "limit": limit * 2,
        "nested": { "flag": true, "list": [1, "two", null] },
    });
    assert_eq!(built.lookup(&["collection"]), Some(&Bson::String(name)));
    assert_eq!(built.lookup(&["limit"]), Some(&Bson::Int32(20)));
    assert_eq!(
        built.lookup(&["nested", "list"]),
        Some(&Bson::Array(vec![
            Bson::Int32(1),
            Bson::String("two".to_string()),
            Bson::Null
        ]))
    );
}
