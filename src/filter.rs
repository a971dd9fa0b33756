/*!
 * @file filter.rs
 * @brief Predicate builder compiled to BSON filter documents
 */

use crate::bson::{Bson, Document};
use crate::doc;

/// Start a predicate on one document field: `field("age").gte(21)`.
pub fn field(name: impl Into<String>) -> Field {
    Field { name: name.into() }
}

/// A field name awaiting its operator.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
}

/// One compiled filter statement. Convertible into a document or combined
/// with [`and`], [`or`], [`nor`], [`not`] and [`query`].
#[derive(Debug, Clone, PartialEq)]
pub struct Expr(Document);

/// BSON type codes accepted by `$type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ElementKind {
    Double = 1,
    String = 2,
    Document = 3,
    Array = 4,
    Binary = 5,
    Undefined = 6,
    ObjectId = 7,
    Boolean = 8,
    DateTime = 9,
    Null = 10,
    RegExp = 11,
    DbPointer = 12,
    JavaScript = 13,
    JavaScriptWithScope = 15,
    Int32 = 16,
    Timestamp = 17,
    Int64 = 18,
    MinKey = -1,
    MaxKey = 127,
}

impl Field {
    fn compare(self, operator: &str, value: Bson) -> Expr {
        Expr(doc! { (self.name): { operator: value } })
    }

    pub fn eq(self, value: impl Into<Bson>) -> Expr {
        self.compare("$eq", value.into())
    }

    pub fn ne(self, value: impl Into<Bson>) -> Expr {
        self.compare("$ne", value.into())
    }

    pub fn gt(self, value: impl Into<Bson>) -> Expr {
        self.compare("$gt", value.into())
    }

    pub fn lt(self, value: impl Into<Bson>) -> Expr {
        self.compare("$lt", value.into())
    }

    pub fn gte(self, value: impl Into<Bson>) -> Expr {
        self.compare("$gte", value.into())
    }

    pub fn lte(self, value: impl Into<Bson>) -> Expr {
        self.compare("$lte", value.into())
    }

    pub fn is_in<I>(self, values: I) -> Expr
    where
        I: IntoIterator,
        I::Item: Into<Bson>,
    {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.compare("$in", Bson::Array(values))
    }

    pub fn not_in<I>(self, values: I) -> Expr
    where
        I: IntoIterator,
        I::Item: Into<Bson>,
    {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.compare("$nin", Bson::Array(values))
    }

    pub fn is_type(self, kind: ElementKind) -> Expr {
        self.compare("$type", Bson::Int32(kind as i32))
    }

    pub fn is_type_any(self, kinds: impl IntoIterator<Item = ElementKind>) -> Expr {
        let codes: Vec<Bson> = kinds.into_iter().map(|k| Bson::Int32(k as i32)).collect();
        self.compare("$type", Bson::Array(codes))
    }

    /// Array length equality (`$size`).
    pub fn size(self, count: i64) -> Expr {
        self.compare("$size", Bson::Int64(count))
    }

    /// Array containment of every listed value (`$all`).
    pub fn all<I>(self, values: I) -> Expr
    where
        I: IntoIterator,
        I::Item: Into<Bson>,
    {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.compare("$all", Bson::Array(values))
    }

    pub fn exists(self, present: bool) -> Expr {
        self.compare("$exists", Bson::Boolean(present))
    }
}

fn combine(operator: &str, exprs: impl IntoIterator<Item = Expr>) -> Expr {
    let branches: Vec<Bson> = exprs.into_iter().map(|e| Bson::Document(e.0)).collect();
    Expr(doc! { operator: Bson::Array(branches) })
}

pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    combine("$and", exprs)
}

pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    combine("$or", exprs)
}

pub fn nor(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    combine("$nor", exprs)
}

pub fn not(expr: Expr) -> Expr {
    combine("$not", [expr])
}

/// Concatenate statements as sibling keys of one filter document,
/// preserving order and duplicates.
pub fn query(exprs: impl IntoIterator<Item = Expr>) -> Document {
    let mut out = Document::new();
    for expr in exprs {
        for (key, value) in expr.0 {
            out.push(key, value);
        }
    }
    out
}

impl Expr {
    pub fn into_document(self) -> Document {
        self.0
    }
}

impl From<Expr> for Document {
    fn from(expr: Expr) -> Document {
        expr.0
    }
}

impl From<Expr> for Bson {
    fn from(expr: Expr) -> Bson {
        Bson::Document(expr.0)
    }
}
