/*!
 * @file bson.rs
 * @brief BSON value model: tagged union, ordered documents, typed access
 */

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::error::{Error, Result};

/// A single BSON value. Documents keep insertion order and allow duplicate
/// keys; arrays serialize with decimal-string indices starting at `"0"`.
#[derive(Debug, Clone, PartialEq)]
pub enum Bson {
    Double(f64),
    String(String),
    Document(Document),
    Array(Vec<Bson>),
    Binary(Binary),
    Undefined,
    ObjectId(ObjectId),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Null,
    RegExp { pattern: String, options: String },
    DbPointer { namespace: String, id: ObjectId },
    JavaScript(String),
    JavaScriptWithScope { code: String, scope: Document },
    Int32(i32),
    Timestamp { increment: u32, timestamp: u32 },
    Int64(i64),
    MinKey,
    MaxKey,
}

impl Bson {
    /// Wire type byte of this kind (MinKey is 0xFF).
    pub fn element_type(&self) -> u8 {
        match self {
            Bson::Double(_) => 0x01,
            Bson::String(_) => 0x02,
            Bson::Document(_) => 0x03,
            Bson::Array(_) => 0x04,
            Bson::Binary(_) => 0x05,
            Bson::Undefined => 0x06,
            Bson::ObjectId(_) => 0x07,
            Bson::Boolean(_) => 0x08,
            Bson::DateTime(_) => 0x09,
            Bson::Null => 0x0A,
            Bson::RegExp { .. } => 0x0B,
            Bson::DbPointer { .. } => 0x0C,
            Bson::JavaScript(_) => 0x0D,
            Bson::JavaScriptWithScope { .. } => 0x0F,
            Bson::Int32(_) => 0x10,
            Bson::Timestamp { .. } => 0x11,
            Bson::Int64(_) => 0x12,
            Bson::MinKey => 0xFF,
            Bson::MaxKey => 0x7F,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Bson::Double(_) => "double",
            Bson::String(_) => "string",
            Bson::Document(_) => "document",
            Bson::Array(_) => "array",
            Bson::Binary(_) => "binary",
            Bson::Undefined => "undefined",
            Bson::ObjectId(_) => "objectId",
            Bson::Boolean(_) => "boolean",
            Bson::DateTime(_) => "datetime",
            Bson::Null => "null",
            Bson::RegExp { .. } => "regex",
            Bson::DbPointer { .. } => "dbPointer",
            Bson::JavaScript(_) => "javascript",
            Bson::JavaScriptWithScope { .. } => "javascriptWithScope",
            Bson::Int32(_) => "int32",
            Bson::Timestamp { .. } => "timestamp",
            Bson::Int64(_) => "int64",
            Bson::MinKey => "minKey",
            Bson::MaxKey => "maxKey",
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Bson::Double(v) => Ok(*v),
            other => Err(Error::kind_mismatch("double", other.kind())),
        }
    }

    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Bson::Int32(v) => Ok(*v),
            other => Err(Error::kind_mismatch("int32", other.kind())),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Bson::Int64(v) => Ok(*v),
            other => Err(Error::kind_mismatch("int64", other.kind())),
        }
    }

    /// Either integer width, widened to i64.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Bson::Int32(v) => Ok(i64::from(*v)),
            Bson::Int64(v) => Ok(*v),
            other => Err(Error::kind_mismatch("int32 or int64", other.kind())),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Bson::Boolean(v) => Ok(*v),
            other => Err(Error::kind_mismatch("boolean", other.kind())),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Bson::String(v) => Ok(v),
            other => Err(Error::kind_mismatch("string", other.kind())),
        }
    }

    pub fn as_object_id(&self) -> Result<ObjectId> {
        match self {
            Bson::ObjectId(v) => Ok(*v),
            other => Err(Error::kind_mismatch("objectId", other.kind())),
        }
    }

    pub fn as_datetime(&self) -> Result<DateTime<Utc>> {
        match self {
            Bson::DateTime(v) => Ok(*v),
            other => Err(Error::kind_mismatch("datetime", other.kind())),
        }
    }

    pub fn as_binary(&self) -> Result<&Binary> {
        match self {
            Bson::Binary(v) => Ok(v),
            other => Err(Error::kind_mismatch("binary", other.kind())),
        }
    }

    pub fn as_document(&self) -> Result<&Document> {
        match self {
            Bson::Document(v) => Ok(v),
            other => Err(Error::kind_mismatch("document", other.kind())),
        }
    }

    pub fn as_document_mut(&mut self) -> Result<&mut Document> {
        match self {
            Bson::Document(v) => Ok(v),
            other => Err(Error::kind_mismatch("document", other.kind())),
        }
    }

    pub fn as_array(&self) -> Result<&Vec<Bson>> {
        match self {
            Bson::Array(v) => Ok(v),
            other => Err(Error::kind_mismatch("array", other.kind())),
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Vec<Bson>> {
        match self {
            Bson::Array(v) => Ok(v),
            other => Err(Error::kind_mismatch("array", other.kind())),
        }
    }

    /// Double, Int32 or Int64 as f64; used for reply `ok`/`code` fields
    /// whose width varies by server version.
    pub(crate) fn numeric(&self) -> Option<f64> {
        match self {
            Bson::Double(v) => Some(*v),
            Bson::Int32(v) => Some(f64::from(*v)),
            Bson::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// First value under `key`; `Ok(None)` when absent.
    pub fn get(&self, key: &str) -> Result<Option<&Bson>> {
        Ok(self.as_document()?.get(key))
    }

    /// Insert-or-replace under `key`.
    pub fn set(&mut self, key: &str, value: impl Into<Bson>) -> Result<()> {
        self.as_document_mut()?.insert(key, value);
        Ok(())
    }

    /// Append to an array.
    pub fn push(&mut self, value: impl Into<Bson>) -> Result<()> {
        self.as_array_mut()?.push(value.into());
        Ok(())
    }

    /// Bounds-checked array element access.
    pub fn at(&self, index: usize) -> Result<&Bson> {
        let items = self.as_array()?;
        items
            .get(index)
            .ok_or_else(|| Error::MissingKey(format!("array index {index}")))
    }

    /// Element count of a document or array.
    pub fn len(&self) -> Result<usize> {
        match self {
            Bson::Document(doc) => Ok(doc.len()),
            Bson::Array(items) => Ok(items.len()),
            other => Err(Error::kind_mismatch("document or array", other.kind())),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.len(), Ok(0))
    }

    /// True only when this is a document containing `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        match self {
            Bson::Document(doc) => doc.contains_key(key),
            _ => false,
        }
    }

    /// Walk nested documents; `None` when any hop is absent or not a
    /// document.
    pub fn lookup(&self, path: &[&str]) -> Option<&Bson> {
        let mut node = self;
        for key in path {
            node = match node {
                Bson::Document(doc) => doc.get(key)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Write at a nested path, creating intermediate documents as needed.
    /// A non-document intermediate is replaced by a fresh document.
    pub fn put(&mut self, path: &[&str], value: impl Into<Bson>) -> Result<()> {
        let (last, rest) = match path.split_last() {
            Some(parts) => parts,
            None => return Err(Error::InvalidState("empty path".to_string())),
        };
        let mut node = self;
        for key in rest {
            let doc = node.as_document_mut()?;
            if !matches!(doc.get(key), Some(Bson::Document(_))) {
                doc.insert(*key, Bson::Document(Document::new()));
            }
            node = doc.get_mut(key).expect("intermediate document just inserted");
        }
        node.as_document_mut()?.insert(*last, value);
        Ok(())
    }

    pub fn into_document(self) -> Result<Document> {
        match self {
            Bson::Document(doc) => Ok(doc),
            other => Err(Error::kind_mismatch("document", other.kind())),
        }
    }
}

/// Deep merge: keys of `a` win, keys present in both recurse when both
/// sides are containers, keys only in `b` are appended. Non-container
/// inputs return `a`.
pub fn merge(a: &Bson, b: &Bson) -> Bson {
    match (a, b) {
        (Bson::Document(da), Bson::Document(db)) => {
            let mut out = Document::new();
            for (key, va) in da.iter() {
                match db.get(key) {
                    Some(vb) => out.push(key.clone(), merge(va, vb)),
                    None => out.push(key.clone(), va.clone()),
                }
            }
            for (key, vb) in db.iter() {
                if !da.contains_key(key) {
                    out.push(key.clone(), vb.clone());
                }
            }
            Bson::Document(out)
        }
        (Bson::Array(xs), Bson::Array(ys)) => {
            let mut out = Vec::with_capacity(xs.len().max(ys.len()));
            for (i, x) in xs.iter().enumerate() {
                match ys.get(i) {
                    Some(y) => out.push(merge(x, y)),
                    None => out.push(x.clone()),
                }
            }
            if ys.len() > xs.len() {
                out.extend(ys[xs.len()..].iter().cloned());
            }
            Bson::Array(out)
        }
        _ => a.clone(),
    }
}

/// In-place variant of [`merge`]: fold `b` into `a` under the same rule.
pub fn update(a: &mut Bson, b: &Bson) {
    let merged = merge(a, b);
    *a = merged;
}

/// An insertion-ordered sequence of key/value pairs. Unlike a map, keys are
/// ordered, not unique: `push` always appends, `insert` replaces the first
/// occurrence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    entries: Vec<(String, Bson)>,
}

impl Document {
    pub fn new() -> Document {
        Document { entries: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Document {
        Document { entries: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Bson> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Append a pair; duplicate keys are kept.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Replace the first occurrence of `key` or append.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Remove and return the first occurrence of `key`.
    pub fn remove(&mut self, key: &str) -> Option<Bson> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bson)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.require(key)?.as_str()
    }

    pub fn get_i32(&self, key: &str) -> Result<i32> {
        self.require(key)?.as_i32()
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.require(key)?.as_i64()
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.require(key)?.as_int()
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.require(key)?.as_bool()
    }

    pub fn get_document(&self, key: &str) -> Result<&Document> {
        self.require(key)?.as_document()
    }

    pub fn get_array(&self, key: &str) -> Result<&Vec<Bson>> {
        self.require(key)?.as_array()
    }

    fn require(&self, key: &str) -> Result<&Bson> {
        self.get(key).ok_or_else(|| Error::MissingKey(key.to_string()))
    }
}

impl FromIterator<(String, Bson)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Bson)>>(iter: I) -> Self {
        Document { entries: iter.into_iter().collect() }
    }
}

impl IntoIterator for Document {
    type Item = (String, Bson);
    type IntoIter = std::vec::IntoIter<(String, Bson)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Bson);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, Bson)>,
        fn(&'a (String, Bson)) -> (&'a String, &'a Bson),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

/// A 12-byte BSON object id: 4-byte big-endian unix seconds, 5 random
/// bytes fixed per process, 3-byte incrementing counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub fn new() -> ObjectId {
        let mut bytes = [0u8; 12];
        let seconds = Utc::now().timestamp() as u32;
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process_entropy());
        let count = counter().fetch_add(1, Ordering::Relaxed);
        bytes[9..12].copy_from_slice(&count.to_be_bytes()[1..4]);
        ObjectId(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> ObjectId {
        ObjectId(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    pub fn parse_str(hex_str: &str) -> Result<ObjectId> {
        let raw = hex::decode(hex_str)
            .map_err(|_| Error::Bson(format!("invalid object id hex: {hex_str:?}")))?;
        let bytes: [u8; 12] = raw
            .try_into()
            .map_err(|_| Error::Bson("object id must be 12 bytes".to_string()))?;
        Ok(ObjectId(bytes))
    }

    /// The embedded creation time, at seconds resolution.
    pub fn generation_time(&self) -> DateTime<Utc> {
        let seconds = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        DateTime::from_timestamp(i64::from(seconds), 0).unwrap_or_default()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        ObjectId::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", hex::encode(self.0))
    }
}

impl std::str::FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<ObjectId> {
        ObjectId::parse_str(s)
    }
}

fn process_entropy() -> &'static [u8; 5] {
    static ENTROPY: OnceLock<[u8; 5]> = OnceLock::new();
    ENTROPY.get_or_init(|| rand::thread_rng().gen())
}

fn counter() -> &'static AtomicU32 {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    COUNTER.get_or_init(|| AtomicU32::new(rand::thread_rng().gen()))
}

/// Binary payload plus its subtype byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub subtype: BinarySubtype,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub fn generic(bytes: impl Into<Vec<u8>>) -> Binary {
        Binary { subtype: BinarySubtype::Generic, bytes: bytes.into() }
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Binary {
        Binary { subtype: BinarySubtype::Uuid, bytes: uuid.as_bytes().to_vec() }
    }

    pub fn to_uuid(&self) -> Result<uuid::Uuid> {
        if self.subtype != BinarySubtype::Uuid {
            return Err(Error::kind_mismatch("binary subtype uuid", "other subtype"));
        }
        let bytes: [u8; 16] = self
            .bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::Bson("uuid binary must be 16 bytes".to_string()))?;
        Ok(uuid::Uuid::from_bytes(bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinarySubtype {
    Generic,
    Function,
    BinaryOld,
    UuidOld,
    Uuid,
    Md5,
    UserDefined(u8),
}

impl From<u8> for BinarySubtype {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => BinarySubtype::Generic,
            0x01 => BinarySubtype::Function,
            0x02 => BinarySubtype::BinaryOld,
            0x03 => BinarySubtype::UuidOld,
            0x04 => BinarySubtype::Uuid,
            0x05 => BinarySubtype::Md5,
            other => BinarySubtype::UserDefined(other),
        }
    }
}

impl From<BinarySubtype> for u8 {
    fn from(subtype: BinarySubtype) -> u8 {
        match subtype {
            BinarySubtype::Generic => 0x00,
            BinarySubtype::Function => 0x01,
            BinarySubtype::BinaryOld => 0x02,
            BinarySubtype::UuidOld => 0x03,
            BinarySubtype::Uuid => 0x04,
            BinarySubtype::Md5 => 0x05,
            BinarySubtype::UserDefined(other) => other,
        }
    }
}

impl From<f64> for Bson {
    fn from(v: f64) -> Bson {
        Bson::Double(v)
    }
}

impl From<f32> for Bson {
    fn from(v: f32) -> Bson {
        Bson::Double(f64::from(v))
    }
}

impl From<i32> for Bson {
    fn from(v: i32) -> Bson {
        Bson::Int32(v)
    }
}

impl From<i64> for Bson {
    fn from(v: i64) -> Bson {
        Bson::Int64(v)
    }
}

impl From<u32> for Bson {
    fn from(v: u32) -> Bson {
        Bson::Int64(i64::from(v))
    }
}

impl From<usize> for Bson {
    fn from(v: usize) -> Bson {
        Bson::Int64(v as i64)
    }
}

impl From<bool> for Bson {
    fn from(v: bool) -> Bson {
        Bson::Boolean(v)
    }
}

impl From<&str> for Bson {
    fn from(v: &str) -> Bson {
        Bson::String(v.to_string())
    }
}

impl From<String> for Bson {
    fn from(v: String) -> Bson {
        Bson::String(v)
    }
}

impl From<&String> for Bson {
    fn from(v: &String) -> Bson {
        Bson::String(v.clone())
    }
}

impl From<ObjectId> for Bson {
    fn from(v: ObjectId) -> Bson {
        Bson::ObjectId(v)
    }
}

impl From<DateTime<Utc>> for Bson {
    fn from(v: DateTime<Utc>) -> Bson {
        Bson::DateTime(v)
    }
}

impl From<Binary> for Bson {
    fn from(v: Binary) -> Bson {
        Bson::Binary(v)
    }
}

impl From<Document> for Bson {
    fn from(v: Document) -> Bson {
        Bson::Document(v)
    }
}

impl From<uuid::Uuid> for Bson {
    fn from(v: uuid::Uuid) -> Bson {
        Bson::Binary(Binary::from_uuid(v))
    }
}

impl<T: Into<Bson>> From<Vec<T>> for Bson {
    fn from(items: Vec<T>) -> Bson {
        Bson::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Bson> + Clone> From<&[T]> for Bson {
    fn from(items: &[T]) -> Bson {
        Bson::Array(items.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<Bson>> From<Option<T>> for Bson {
    fn from(value: Option<T>) -> Bson {
        match value {
            Some(v) => v.into(),
            None => Bson::Null,
        }
    }
}

impl fmt::Display for Bson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bson::Double(v) => write!(f, "{v}"),
            Bson::String(v) => write!(f, "{v:?}"),
            Bson::Document(doc) => write!(f, "{doc}"),
            Bson::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Bson::Binary(bin) => {
                write!(f, "Binary({:#04x}, {} bytes)", u8::from(bin.subtype), bin.bytes.len())
            }
            Bson::Undefined => f.write_str("undefined"),
            Bson::ObjectId(oid) => write!(f, "ObjectId(\"{oid}\")"),
            Bson::Boolean(v) => write!(f, "{v}"),
            Bson::DateTime(v) => write!(f, "ISODate(\"{}\")", v.to_rfc3339()),
            Bson::Null => f.write_str("null"),
            Bson::RegExp { pattern, options } => write!(f, "/{pattern}/{options}"),
            Bson::DbPointer { namespace, id } => write!(f, "DBPointer({namespace:?}, {id})"),
            Bson::JavaScript(code) => write!(f, "Code({code:?})"),
            Bson::JavaScriptWithScope { code, scope } => write!(f, "Code({code:?}, {scope})"),
            Bson::Int32(v) => write!(f, "{v}"),
            Bson::Timestamp { increment, timestamp } => {
                write!(f, "Timestamp({timestamp}, {increment})")
            }
            Bson::Int64(v) => write!(f, "{v}"),
            Bson::MinKey => f.write_str("MinKey"),
            Bson::MaxKey => f.write_str("MaxKey"),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key:?}: {value}")?;
        }
        f.write_str("}")
    }
}

/// Construct a [`Bson`] value with JSON-like syntax; accepts anything
/// implementing `Into<Bson>` in value position.
#[macro_export(local_inner_macros)]
macro_rules! bson {
    ($($tokens:tt)+) => {
        bson_internal!($($tokens)+)
    };
}

/// Construct a [`Document`](crate::Document); duplicate keys are kept in
/// order of appearance.
#[macro_export(local_inner_macros)]
macro_rules! doc {
    () => { $crate::Document::new() };
    ($($tokens:tt)+) => {{
        let mut object = $crate::Document::new();
        bson_internal!(@object object () ($($tokens)+) ($($tokens)+));
        object
    }};
}

#[macro_export(local_inner_macros)]
#[doc(hidden)]
macro_rules! bson_internal {
    //
    // @array: accumulate array elements into [$($elems,)*].
    //
    (@array [$($elems:expr,)*]) => {
        bson_internal_vec![$($elems,)*]
    };
    (@array [$($elems:expr),*]) => {
        bson_internal_vec![$($elems),*]
    };
    (@array [$($elems:expr,)*] null $($rest:tt)*) => {
        bson_internal!(@array [$($elems,)* bson_internal!(null)] $($rest)*)
    };
    (@array [$($elems:expr,)*] [$($array:tt)*] $($rest:tt)*) => {
        bson_internal!(@array [$($elems,)* bson_internal!([$($array)*])] $($rest)*)
    };
    (@array [$($elems:expr,)*] {$($map:tt)*} $($rest:tt)*) => {
        bson_internal!(@array [$($elems,)* bson_internal!({$($map)*})] $($rest)*)
    };
    (@array [$($elems:expr,)*] $next:expr, $($rest:tt)*) => {
        bson_internal!(@array [$($elems,)* bson_internal!($next),] $($rest)*)
    };
    (@array [$($elems:expr,)*] $last:expr) => {
        bson_internal!(@array [$($elems,)* bson_internal!($last)])
    };
    (@array [$($elems:expr),*] , $($rest:tt)*) => {
        bson_internal!(@array [$($elems,)*] $($rest)*)
    };
    (@array [$($elems:expr),*] $unexpected:tt $($rest:tt)*) => {
        bson_unexpected!($unexpected)
    };

    //
    // @object: munch key tokens, then the value, pushing each pair.
    //
    (@object $object:ident () () ()) => {};
    (@object $object:ident [$($key:tt)+] ($value:expr) , $($rest:tt)*) => {
        $object.push(($($key)+), $value);
        bson_internal!(@object $object () ($($rest)*) ($($rest)*));
    };
    (@object $object:ident [$($key:tt)+] ($value:expr) $unexpected:tt $($rest:tt)*) => {
        bson_unexpected!($unexpected)
    };
    (@object $object:ident [$($key:tt)+] ($value:expr)) => {
        $object.push(($($key)+), $value);
    };
    (@object $object:ident ($($key:tt)+) (: null $($rest:tt)*) $copy:tt) => {
        bson_internal!(@object $object [$($key)+] (bson_internal!(null)) $($rest)*);
    };
    (@object $object:ident ($($key:tt)+) (: [$($array:tt)*] $($rest:tt)*) $copy:tt) => {
        bson_internal!(@object $object [$($key)+] (bson_internal!([$($array)*])) $($rest)*);
    };
    (@object $object:ident ($($key:tt)+) (: {$($map:tt)*} $($rest:tt)*) $copy:tt) => {
        bson_internal!(@object $object [$($key)+] (bson_internal!({$($map)*})) $($rest)*);
    };
    (@object $object:ident ($($key:tt)+) (: $value:expr , $($rest:tt)*) $copy:tt) => {
        bson_internal!(@object $object [$($key)+] (bson_internal!($value)) , $($rest)*);
    };
    (@object $object:ident ($($key:tt)+) (: $value:expr) $copy:tt) => {
        bson_internal!(@object $object [$($key)+] (bson_internal!($value)));
    };
    (@object $object:ident ($($key:tt)+) (:) $copy:tt) => {
        // Missing value for the last entry.
        bson_internal!()
    };
    (@object $object:ident ($($key:tt)+) () $copy:tt) => {
        // Missing colon and value for the last entry.
        bson_internal!()
    };
    (@object $object:ident () (: $($rest:tt)*) ($colon:tt $($copy:tt)*)) => {
        // Misplaced colon.
        bson_unexpected!($colon)
    };
    (@object $object:ident ($($key:tt)*) (, $($rest:tt)*) ($comma:tt $($copy:tt)*)) => {
        // Comma inside a key.
        bson_unexpected!($comma)
    };
    (@object $object:ident () (($key:expr) : $($rest:tt)*) $copy:tt) => {
        bson_internal!(@object $object ($key) (: $($rest)*) (: $($rest)*));
    };
    (@object $object:ident ($($key:tt)*) ($tt:tt $($rest:tt)*) $copy:tt) => {
        bson_internal!(@object $object ($($key)* $tt) ($($rest)*) ($($rest)*));
    };

    //
    // Entry points.
    //
    (null) => {
        $crate::Bson::Null
    };
    ([]) => {
        $crate::Bson::Array(bson_internal_vec![])
    };
    ([ $($tt:tt)+ ]) => {
        $crate::Bson::Array(bson_internal!(@array [] $($tt)+))
    };
    ({}) => {
        $crate::Bson::Document($crate::Document::new())
    };
    ({ $($tt:tt)+ }) => {
        $crate::Bson::Document($crate::doc! { $($tt)+ })
    };
    ($other:expr) => {
        $crate::Bson::from($other)
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! bson_internal_vec {
    ($($content:tt)*) => {
        vec![$($content)*]
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! bson_unexpected {
    () => {};
}
