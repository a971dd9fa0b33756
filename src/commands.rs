/*!
 * @file commands.rs
 * @brief Typed command replies and shared reply checks
 */

use crate::bson::{Bson, Document};
use crate::error::{Error, Result};

/// Outcome of a `$cmd` round trip. `ok` mirrors the server's numeric `ok`
/// field; `err` concatenates whatever error text the reply carried.
#[derive(Debug, Clone, Default)]
pub struct StatusReply {
    pub ok: bool,
    pub err: String,
    pub raw: Document,
    /// Object ids generated client-side for inserted documents that lacked
    /// an `_id`.
    pub inserted_ids: Vec<Bson>,
}

impl StatusReply {
    pub(crate) fn from_reply(raw: Document) -> StatusReply {
        let ok = raw
            .get("ok")
            .and_then(Bson::numeric)
            .map(|v| v != 0.0)
            .unwrap_or(false);
        let mut messages: Vec<String> = Vec::new();
        for key in ["errmsg", "$err"] {
            if let Some(Bson::String(message)) = raw.get(key) {
                messages.push(message.clone());
            }
        }
        if let Some(Bson::Array(write_errors)) = raw.get("writeErrors") {
            for error in write_errors {
                if let Ok(Some(Bson::String(message))) = error.get("errmsg") {
                    messages.push(message.clone());
                }
            }
        }
        StatusReply {
            ok,
            err: messages.join("; "),
            raw,
            inserted_ids: Vec::new(),
        }
    }

    /// Number of documents the write touched (the reply's `n`).
    pub fn affected(&self) -> i64 {
        self.raw
            .get("n")
            .and_then(Bson::numeric)
            .map(|v| v as i64)
            .unwrap_or(0)
    }
}

/// Reply documents carrying `$err` abort the operation; the server uses
/// code 50 for `$maxTimeMS` expiry.
pub(crate) fn check_reply_document(doc: &Document) -> Result<()> {
    let Some(err) = doc.get("$err") else {
        return Ok(());
    };
    let message = match err {
        Bson::String(text) => text.clone(),
        other => other.to_string(),
    };
    let code = doc.get("code").and_then(Bson::numeric).unwrap_or(0.0) as i32;
    if code == 50 {
        return Err(Error::OperationTimeout(message));
    }
    Err(Error::Protocol(format!("query failure: {message}")))
}
