/*!
 * Unit tests for the serde-driven object mapper.
 * No server required.
 */

use anyhow::Result;
use chrono::{DateTime, Utc};
use mongolink::{
    bson, doc, from_bson, from_document, serde_helpers, to_bson, to_document, Bson, Error,
    ObjectId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Status {
    Active,
    Suspended,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Account {
    #[serde(rename = "_id")]
    id: ObjectId,
    name: String,
    status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(with = "serde_helpers::bson_datetime")]
    created_at: DateTime<Utc>,
    logins: i64,
}

fn sample_account() -> Account {
    Account {
        id: ObjectId::parse_str("0102030405060708090a0b0c").expect("static oid"),
        name: "ada".to_string(),
        status: Status::Active,
        nickname: None,
        tags: Vec::new(),
        created_at: DateTime::from_timestamp_millis(1_589_707_800_000).expect("in range"),
        logins: 3,
    }
}

#[test]
fn struct_round_trip() -> Result<()> {
    let account = sample_account();
    let encoded = to_document(&account)?;

    // field names are the keys, in declaration order
    let keys: Vec<&str> = encoded.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["_id", "name", "status", "created_at", "logins"]);
    assert_eq!(encoded.get("_id"), Some(&Bson::ObjectId(account.id)));
    assert_eq!(
        encoded.get("created_at"),
        Some(&Bson::DateTime(account.created_at))
    );

    let decoded: Account = from_document(encoded)?;
    assert_eq!(decoded, account);
    Ok(())
}

#[test]
fn omitted_fields_are_skipped_and_defaulted() -> Result<()> {
    let account = sample_account();
    let encoded = to_document(&account)?;
    // empty collections and None were omitted entirely
    assert!(!encoded.contains_key("nickname"));
    assert!(!encoded.contains_key("tags"));

    let decoded: Account = from_document(encoded)?;
    assert_eq!(decoded.nickname, None);
    assert!(decoded.tags.is_empty());
    Ok(())
}

#[test]
fn missing_required_field_fails_with_missing_key() {
    let partial = doc! {
        "_id": ObjectId::new(),
        "name": "bee",
        "status": "Active",
        "created_at": Bson::DateTime(Default::default()),
    };
    let result: mongolink::Result<Account> = from_document(partial);
    match result {
        Err(Error::MissingKey(key)) => assert_eq!(key, "logins"),
        other => panic!("expected MissingKey, got {other:?}"),
    }
}

#[test]
fn enums_map_to_their_name_string() -> Result<()> {
    assert_eq!(to_bson(&Status::Suspended)?, Bson::String("Suspended".to_string()));
    let parsed: Status = from_bson(Bson::String("Deleted".to_string()))?;
    assert_eq!(parsed, Status::Deleted);
    let unknown: mongolink::Result<Status> = from_bson(Bson::String("Frozen".to_string()));
    assert!(unknown.is_err());
    Ok(())
}

#[test]
fn options_encode_null_and_back() -> Result<()> {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wrapper {
        value: Option<i32>,
    }

    let encoded = to_document(&Wrapper { value: None })?;
    assert_eq!(encoded.get("value"), Some(&Bson::Null));
    let decoded: Wrapper = from_document(encoded)?;
    assert_eq!(decoded, Wrapper { value: None });

    let decoded: Wrapper = from_document(doc! { "value": 9 })?;
    assert_eq!(decoded, Wrapper { value: Some(9) });
    Ok(())
}

#[test]
fn sequences_and_maps_become_arrays_and_documents() -> Result<()> {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Mixed {
        numbers: Vec<i32>,
        pairs: std::collections::BTreeMap<String, String>,
        tuple: (i32, String),
    }

    let value = Mixed {
        numbers: vec![3, 1, 2],
        pairs: [("k".to_string(), "v".to_string())].into_iter().collect(),
        tuple: (5, "five".to_string()),
    };
    let encoded = to_document(&value)?;
    assert_eq!(
        encoded.get("numbers"),
        Some(&Bson::Array(vec![Bson::Int32(3), Bson::Int32(1), Bson::Int32(2)]))
    );
    assert!(matches!(encoded.get("pairs"), Some(Bson::Document(_))));
    assert!(matches!(encoded.get("tuple"), Some(Bson::Array(_))));

    let decoded: Mixed = from_document(encoded)?;
    assert_eq!(decoded, value);
    Ok(())
}

#[test]
fn bson_values_pass_through_the_mapper() -> Result<()> {
    let original = bson!({
        "oid": ObjectId::new(),
        "when": Bson::DateTime(DateTime::from_timestamp_millis(86_400_000).expect("in range")),
        "ts": Bson::Timestamp { increment: 4, timestamp: 99 },
        "code": Bson::JavaScript("return 1;".to_string()),
        "pattern": Bson::RegExp { pattern: "^x".to_string(), options: "".to_string() },
        "plain": [1, 2, { "deep": null }],
    });
    let round_tripped: Bson = from_bson(to_bson(&original)?)?;
    assert_eq!(round_tripped, original);
    Ok(())
}

#[test]
fn wrong_kind_fails_with_kind_mismatch() {
    let result: mongolink::Result<String> = from_bson(Bson::Int32(3));
    assert!(matches!(result, Err(Error::KindMismatch { .. })));

    #[derive(Debug, Deserialize)]
    struct Typed {
        #[allow(dead_code)]
        flag: bool,
    }
    let result: mongolink::Result<Typed> = from_document(doc! { "flag": "yes" });
    assert!(matches!(result, Err(Error::KindMismatch { .. })));
}

#[test]
fn default_datetime_is_epoch_zero() -> Result<()> {
    #[derive(Debug, Serialize)]
    struct Stamped {
        #[serde(with = "serde_helpers::bson_datetime")]
        at: DateTime<Utc>,
    }

    let encoded = to_document(&Stamped { at: Default::default() })?;
    assert_eq!(
        encoded.get("at"),
        Some(&Bson::DateTime(DateTime::from_timestamp_millis(0).expect("epoch")))
    );
    Ok(())
}
