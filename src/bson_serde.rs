/*!
 * @file bson_serde.rs
 * @brief serde-driven object mapping to and from BSON values
 */

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::de::{
    self, DeserializeOwned, Deserializer as _, DeserializeSeed, EnumAccess, IntoDeserializer,
    MapAccess, SeqAccess, VariantAccess, Visitor,
};
use serde::ser::{self, Serialize, SerializeMap, SerializeSeq};

use crate::bson::{Binary, BinarySubtype, Bson, Document, ObjectId};
use crate::doc;
use crate::error::{Error, Result};

/// Encode any `Serialize` value as a BSON value. Structs and string-keyed
/// maps become documents, sequences become arrays, unit enum variants
/// become their name string.
pub fn to_bson<T: Serialize + ?Sized>(value: &T) -> Result<Bson> {
    value.serialize(BsonSerializer)
}

/// [`to_bson`] restricted to values that map to a document.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> Result<Document> {
    to_bson(value)?.into_document()
}

/// Decode a BSON value into any `Deserialize` type. A key absent for a
/// non-defaulted field fails with `MissingKey`; a wrong kind fails with
/// `KindMismatch`.
pub fn from_bson<T: DeserializeOwned>(value: Bson) -> Result<T> {
    T::deserialize(BsonDeserializer { value })
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    from_bson(Bson::Document(doc))
}

// Special BSON kinds travel through serde as single-purpose signal
// documents keyed by `$`-names, the shape MongoDB's extended JSON uses.

fn from_extended(doc: Document) -> Bson {
    let dollar_keyed = doc.iter().next().map(|(k, _)| k.starts_with('$')).unwrap_or(false);
    if !dollar_keyed {
        return Bson::Document(doc);
    }
    if doc.len() == 1 {
        if let Some(Bson::String(hex)) = doc.get("$oid") {
            if let Ok(oid) = ObjectId::parse_str(hex) {
                return Bson::ObjectId(oid);
            }
        }
        if let Some(value) = doc.get("$date") {
            if let Some(millis) = value.numeric() {
                if let Some(datetime) = DateTime::from_timestamp_millis(millis as i64) {
                    return Bson::DateTime(datetime);
                }
            }
        }
        if let Some(Bson::String(code)) = doc.get("$code") {
            return Bson::JavaScript(code.clone());
        }
        if let Some(Bson::Document(ts)) = doc.get("$timestamp") {
            if let (Ok(t), Ok(i)) = (ts.get_int("t"), ts.get_int("i")) {
                return Bson::Timestamp { increment: i as u32, timestamp: t as u32 };
            }
        }
        if doc.contains_key("$minKey") {
            return Bson::MinKey;
        }
        if doc.contains_key("$maxKey") {
            return Bson::MaxKey;
        }
        if doc.contains_key("$undefined") {
            return Bson::Undefined;
        }
        if let Some(Bson::Document(ptr)) = doc.get("$dbPointer") {
            if let (Ok(ns), Some(Bson::ObjectId(id))) = (ptr.get_str("$ref"), ptr.get("$id")) {
                return Bson::DbPointer { namespace: ns.to_string(), id: *id };
            }
        }
    }
    if doc.len() == 2 {
        if let (Some(Bson::String(payload)), Some(subtype)) = (doc.get("$binary"), doc.get("$type"))
        {
            if let (Ok(bytes), Ok(subtype)) = (BASE64.decode(payload), subtype.as_int()) {
                return Bson::Binary(Binary {
                    subtype: BinarySubtype::from(subtype as u8),
                    bytes,
                });
            }
        }
        if let (Some(Bson::String(pattern)), Some(Bson::String(options))) =
            (doc.get("$regex"), doc.get("$options"))
        {
            return Bson::RegExp { pattern: pattern.clone(), options: options.clone() };
        }
        if let (Some(Bson::String(code)), Some(Bson::Document(scope))) =
            (doc.get("$code"), doc.get("$scope"))
        {
            return Bson::JavaScriptWithScope { code: code.clone(), scope: scope.clone() };
        }
    }
    Bson::Document(doc)
}

fn to_extended(value: &Bson) -> Document {
    match value {
        Bson::ObjectId(oid) => doc! { "$oid": oid.to_string() },
        Bson::DateTime(dt) => doc! { "$date": dt.timestamp_millis() },
        Bson::Binary(Binary { subtype, bytes }) => {
            doc! { "$binary": BASE64.encode(bytes), "$type": i32::from(u8::from(*subtype)) }
        }
        Bson::RegExp { pattern, options } => {
            doc! { "$regex": pattern.clone(), "$options": options.clone() }
        }
        Bson::Timestamp { increment, timestamp } => {
            doc! { "$timestamp": { "t": *timestamp as i64, "i": *increment as i64 } }
        }
        Bson::JavaScript(code) => doc! { "$code": code.clone() },
        Bson::JavaScriptWithScope { code, scope } => {
            doc! { "$code": code.clone(), "$scope": scope.clone() }
        }
        Bson::DbPointer { namespace, id } => {
            doc! { "$dbPointer": { "$ref": namespace.clone(), "$id": Bson::ObjectId(*id) } }
        }
        Bson::MinKey => doc! { "$minKey": 1 },
        Bson::MaxKey => doc! { "$maxKey": 1 },
        Bson::Undefined => doc! { "$undefined": true },
        other => doc! { "value": other.clone() },
    }
}

impl Serialize for Document {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for Bson {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Bson::Double(v) => serializer.serialize_f64(*v),
            Bson::String(v) => serializer.serialize_str(v),
            Bson::Document(doc) => doc.serialize(serializer),
            Bson::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Bson::Boolean(v) => serializer.serialize_bool(*v),
            Bson::Null => serializer.serialize_unit(),
            Bson::Int32(v) => serializer.serialize_i32(*v),
            Bson::Int64(v) => serializer.serialize_i64(*v),
            other => to_extended(other).serialize(serializer),
        }
    }
}

impl Serialize for ObjectId {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("$oid", &self.to_string())?;
        map.end()
    }
}

impl Serialize for Binary {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("$binary", &BASE64.encode(&self.bytes))?;
        map.serialize_entry("$type", &i32::from(u8::from(self.subtype)))?;
        map.end()
    }
}

struct BsonSerializer;

impl ser::Serializer for BsonSerializer {
    type Ok = Bson;
    type Error = Error;
    type SerializeSeq = ArraySerializer;
    type SerializeTuple = ArraySerializer;
    type SerializeTupleStruct = ArraySerializer;
    type SerializeTupleVariant = VariantArraySerializer;
    type SerializeMap = DocumentSerializer;
    type SerializeStruct = DocumentSerializer;
    type SerializeStructVariant = VariantDocumentSerializer;

    fn serialize_bool(self, v: bool) -> Result<Bson> {
        Ok(Bson::Boolean(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Bson> {
        Ok(Bson::Int32(i32::from(v)))
    }

    fn serialize_i16(self, v: i16) -> Result<Bson> {
        Ok(Bson::Int32(i32::from(v)))
    }

    fn serialize_i32(self, v: i32) -> Result<Bson> {
        Ok(Bson::Int32(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Bson> {
        Ok(Bson::Int64(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Bson> {
        Ok(Bson::Int32(i32::from(v)))
    }

    fn serialize_u16(self, v: u16) -> Result<Bson> {
        Ok(Bson::Int32(i32::from(v)))
    }

    fn serialize_u32(self, v: u32) -> Result<Bson> {
        Ok(Bson::Int64(i64::from(v)))
    }

    fn serialize_u64(self, v: u64) -> Result<Bson> {
        i64::try_from(v)
            .map(Bson::Int64)
            .map_err(|_| Error::Bson(format!("u64 value {v} exceeds int64")))
    }

    fn serialize_f32(self, v: f32) -> Result<Bson> {
        Ok(Bson::Double(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<Bson> {
        Ok(Bson::Double(v))
    }

    fn serialize_char(self, v: char) -> Result<Bson> {
        Ok(Bson::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Bson> {
        Ok(Bson::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Bson> {
        Ok(Bson::Binary(Binary::generic(v)))
    }

    fn serialize_none(self) -> Result<Bson> {
        Ok(Bson::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Bson> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Bson> {
        Ok(Bson::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Bson> {
        Ok(Bson::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Bson> {
        Ok(Bson::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Bson> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Bson> {
        let mut doc = Document::with_capacity(1);
        doc.push(variant, value.serialize(BsonSerializer)?);
        Ok(Bson::Document(doc))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq> {
        Ok(ArraySerializer { items: Vec::with_capacity(len.unwrap_or(0)) })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Ok(VariantArraySerializer { variant, items: Vec::with_capacity(len) })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap> {
        Ok(DocumentSerializer {
            doc: Document::with_capacity(len.unwrap_or(0)),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<Self::SerializeStruct> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Ok(VariantDocumentSerializer { variant, doc: Document::with_capacity(len) })
    }
}

struct ArraySerializer {
    items: Vec<Bson>,
}

impl ser::SerializeSeq for ArraySerializer {
    type Ok = Bson;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(value.serialize(BsonSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Bson> {
        Ok(Bson::Array(self.items))
    }
}

impl ser::SerializeTuple for ArraySerializer {
    type Ok = Bson;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Bson> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for ArraySerializer {
    type Ok = Bson;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Bson> {
        ser::SerializeSeq::end(self)
    }
}

struct VariantArraySerializer {
    variant: &'static str,
    items: Vec<Bson>,
}

impl ser::SerializeTupleVariant for VariantArraySerializer {
    type Ok = Bson;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(value.serialize(BsonSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Bson> {
        let mut doc = Document::with_capacity(1);
        doc.push(self.variant, Bson::Array(self.items));
        Ok(Bson::Document(doc))
    }
}

struct DocumentSerializer {
    doc: Document,
    pending_key: Option<String>,
}

impl ser::SerializeMap for DocumentSerializer {
    type Ok = Bson;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        match key.serialize(BsonSerializer)? {
            Bson::String(key) => {
                self.pending_key = Some(key);
                Ok(())
            }
            other => Err(Error::Bson(format!(
                "document keys must be strings, found {}",
                other.kind()
            ))),
        }
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| Error::Bson("map value without key".to_string()))?;
        self.doc.push(key, value.serialize(BsonSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Bson> {
        Ok(from_extended(self.doc))
    }
}

impl ser::SerializeStruct for DocumentSerializer {
    type Ok = Bson;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.doc.push(key, value.serialize(BsonSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Bson> {
        Ok(Bson::Document(self.doc))
    }
}

struct VariantDocumentSerializer {
    variant: &'static str,
    doc: Document,
}

impl ser::SerializeStructVariant for VariantDocumentSerializer {
    type Ok = Bson;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.doc.push(key, value.serialize(BsonSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Bson> {
        let mut outer = Document::with_capacity(1);
        outer.push(self.variant, Bson::Document(self.doc));
        Ok(Bson::Document(outer))
    }
}

struct BsonDeserializer {
    value: Bson,
}

impl<'de> de::Deserializer<'de> for BsonDeserializer {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Bson::Double(v) => visitor.visit_f64(v),
            Bson::String(v) => visitor.visit_string(v),
            Bson::Document(doc) => visitor.visit_map(DocumentAccess::new(doc)),
            Bson::Array(items) => visitor.visit_seq(ArrayAccess::new(items)),
            Bson::Boolean(v) => visitor.visit_bool(v),
            Bson::Null | Bson::Undefined => visitor.visit_unit(),
            Bson::Int32(v) => visitor.visit_i32(v),
            Bson::Int64(v) => visitor.visit_i64(v),
            other => visitor.visit_map(DocumentAccess::new(to_extended(&other))),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Bson::Null | Bson::Undefined => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.value {
            Bson::String(name) => visitor.visit_enum(name.into_deserializer()),
            Bson::Document(doc) => {
                let mut iter = doc.into_iter();
                let (variant, value) = iter
                    .next()
                    .ok_or_else(|| Error::Bson("empty document for enum".to_string()))?;
                if iter.next().is_some() {
                    return Err(Error::Bson(
                        "enum document must have exactly one key".to_string(),
                    ));
                }
                visitor.visit_enum(EnumDeserializer { variant, value })
            }
            other => Err(Error::kind_mismatch("string or document", other.kind())),
        }
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Bson::Binary(bin) => visitor.visit_byte_buf(bin.bytes),
            Bson::String(s) => visitor.visit_string(s),
            other => BsonDeserializer { value: other }.deserialize_any(visitor),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Bson::Binary(bin) => visitor.visit_seq(BytesAccess { iter: bin.bytes.into_iter() }),
            other => BsonDeserializer { value: other }.deserialize_any(visitor),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            // chrono and friends ask for a string form.
            Bson::DateTime(dt) => visitor.visit_string(dt.to_rfc3339()),
            Bson::ObjectId(oid) => visitor.visit_string(oid.to_string()),
            other => BsonDeserializer { value: other }.deserialize_any(visitor),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char
        unit unit_struct tuple tuple_struct map struct identifier
    }
}

struct DocumentAccess {
    iter: std::vec::IntoIter<(String, Bson)>,
    value: Option<Bson>,
}

impl DocumentAccess {
    fn new(doc: Document) -> DocumentAccess {
        DocumentAccess { iter: doc.into_iter(), value: None }
    }
}

impl<'de> MapAccess<'de> for DocumentAccess {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(BsonDeserializer { value: Bson::String(key) })
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let value = self
            .value
            .take()
            .ok_or_else(|| Error::Bson("map value requested before key".to_string()))?;
        seed.deserialize(BsonDeserializer { value })
    }
}

struct ArrayAccess {
    iter: std::vec::IntoIter<Bson>,
}

impl ArrayAccess {
    fn new(items: Vec<Bson>) -> ArrayAccess {
        ArrayAccess { iter: items.into_iter() }
    }
}

impl<'de> SeqAccess<'de> for ArrayAccess {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        match self.iter.next() {
            Some(value) => seed.deserialize(BsonDeserializer { value }).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct BytesAccess {
    iter: std::vec::IntoIter<u8>,
}

impl<'de> SeqAccess<'de> for BytesAccess {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        match self.iter.next() {
            Some(byte) => seed
                .deserialize(BsonDeserializer { value: Bson::Int32(i32::from(byte)) })
                .map(Some),
            None => Ok(None),
        }
    }
}

struct EnumDeserializer {
    variant: String,
    value: Bson,
}

impl<'de> EnumAccess<'de> for EnumDeserializer {
    type Error = Error;
    type Variant = VariantDeserializer;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant)> {
        let variant = seed.deserialize(BsonDeserializer { value: Bson::String(self.variant) })?;
        Ok((variant, VariantDeserializer { value: self.value }))
    }
}

struct VariantDeserializer {
    value: Bson,
}

impl<'de> VariantAccess<'de> for VariantDeserializer {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        match self.value {
            Bson::Null => Ok(()),
            other => Err(Error::kind_mismatch("null", other.kind())),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(BsonDeserializer { value: self.value })
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        BsonDeserializer { value: self.value }.deserialize_any(visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        BsonDeserializer { value: self.value }.deserialize_any(visitor)
    }
}

impl<'de> de::Deserialize<'de> for Bson {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> std::result::Result<Bson, D::Error> {
        deserializer.deserialize_any(BsonVisitor)
    }
}

impl<'de> de::Deserialize<'de> for Document {
    fn deserialize<D: de::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Document, D::Error> {
        match deserializer.deserialize_any(BsonVisitor)? {
            Bson::Document(doc) => Ok(doc),
            other => Err(de::Error::invalid_type(
                de::Unexpected::Other(other.kind()),
                &"a document",
            )),
        }
    }
}

impl<'de> de::Deserialize<'de> for ObjectId {
    fn deserialize<D: de::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<ObjectId, D::Error> {
        match deserializer.deserialize_any(BsonVisitor)? {
            Bson::ObjectId(oid) => Ok(oid),
            Bson::String(hex) => ObjectId::parse_str(&hex).map_err(de::Error::custom),
            other => Err(de::Error::invalid_type(
                de::Unexpected::Other(other.kind()),
                &"an object id",
            )),
        }
    }
}

impl<'de> de::Deserialize<'de> for Binary {
    fn deserialize<D: de::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Binary, D::Error> {
        match deserializer.deserialize_any(BsonVisitor)? {
            Bson::Binary(bin) => Ok(bin),
            other => Err(de::Error::invalid_type(
                de::Unexpected::Other(other.kind()),
                &"binary data",
            )),
        }
    }
}

struct BsonVisitor;

impl<'de> Visitor<'de> for BsonVisitor {
    type Value = Bson;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a BSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Bson, E> {
        Ok(Bson::Boolean(v))
    }

    fn visit_i8<E: de::Error>(self, v: i8) -> std::result::Result<Bson, E> {
        Ok(Bson::Int32(i32::from(v)))
    }

    fn visit_i16<E: de::Error>(self, v: i16) -> std::result::Result<Bson, E> {
        Ok(Bson::Int32(i32::from(v)))
    }

    fn visit_i32<E: de::Error>(self, v: i32) -> std::result::Result<Bson, E> {
        Ok(Bson::Int32(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Bson, E> {
        Ok(Bson::Int64(v))
    }

    fn visit_u8<E: de::Error>(self, v: u8) -> std::result::Result<Bson, E> {
        Ok(Bson::Int32(i32::from(v)))
    }

    fn visit_u16<E: de::Error>(self, v: u16) -> std::result::Result<Bson, E> {
        Ok(Bson::Int32(i32::from(v)))
    }

    fn visit_u32<E: de::Error>(self, v: u32) -> std::result::Result<Bson, E> {
        Ok(Bson::Int64(i64::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Bson, E> {
        i64::try_from(v)
            .map(Bson::Int64)
            .map_err(|_| E::custom(format!("u64 value {v} exceeds int64")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Bson, E> {
        Ok(Bson::Double(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Bson, E> {
        Ok(Bson::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Bson, E> {
        Ok(Bson::String(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Bson, E> {
        Ok(Bson::Binary(Binary::generic(v)))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Bson, E> {
        Ok(Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes: v }))
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Bson, E> {
        Ok(Bson::Null)
    }

    fn visit_some<D: de::Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Bson, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Bson, E> {
        Ok(Bson::Null)
    }

    fn visit_newtype_struct<D: de::Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Bson, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Bson, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Bson::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Bson, A::Error> {
        let mut doc = Document::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Bson>()? {
            doc.push(key, value);
        }
        Ok(from_extended(doc))
    }
}

/// `#[serde(with = "...")]` helpers for fields the default serde impls
/// would otherwise encode as strings.
pub mod serde_helpers {
    /// Map a `chrono::DateTime<Utc>` field to the BSON datetime kind
    /// instead of an RFC 3339 string.
    pub mod bson_datetime {
        use chrono::{DateTime, Utc};
        use serde::de::{self, Visitor};
        use serde::ser::SerializeMap;
        use serde::{Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &DateTime<Utc>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry("$date", &value.timestamp_millis())?;
            map.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<DateTime<Utc>, D::Error> {
            struct DateTimeVisitor;

            impl<'de> Visitor<'de> for DateTimeVisitor {
                type Value = DateTime<Utc>;

                fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str("a BSON datetime")
                }

                fn visit_i64<E: de::Error>(self, millis: i64) -> Result<Self::Value, E> {
                    DateTime::from_timestamp_millis(millis)
                        .ok_or_else(|| E::custom(format!("datetime {millis}ms out of range")))
                }

                fn visit_str<E: de::Error>(self, text: &str) -> Result<Self::Value, E> {
                    text.parse::<DateTime<Utc>>().map_err(E::custom)
                }

                fn visit_map<A: de::MapAccess<'de>>(
                    self,
                    mut map: A,
                ) -> Result<Self::Value, A::Error> {
                    match map.next_entry::<String, i64>()? {
                        Some((key, millis)) if key == "$date" => {
                            DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                                de::Error::custom(format!("datetime {millis}ms out of range"))
                            })
                        }
                        _ => Err(de::Error::custom("expected a {\"$date\": millis} document")),
                    }
                }
            }

            deserializer.deserialize_any(DateTimeVisitor)
        }
    }
}
