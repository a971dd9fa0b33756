/*!
 * mongolink — client library for the legacy MongoDB wire protocol.
 *
 * Speaks OP_QUERY / OP_GET_MORE over TCP or TLS, carries its own BSON
 * value model and codec, streams results through cursors backed by a
 * channel-based connection pool, and authenticates with SCRAM-SHA-1.
 */

pub mod bson;
pub mod bson_codec;
pub mod bson_serde;
pub mod client;
pub mod collection;
pub mod commands;
pub mod config;
pub mod cursor;
pub mod database;
pub mod error;
pub mod filter;
pub mod wire;

mod auth;
mod pool;
mod srv;

// Re-export the main types for external use
pub use bson::{merge, update, Binary, BinarySubtype, Bson, Document, ObjectId};
pub use bson_serde::{from_bson, from_document, serde_helpers, to_bson, to_document};
pub use client::Client;
pub use collection::{Collection, FindAndModify};
pub use commands::StatusReply;
pub use config::{
    AuthMechanism, ClientOptions, Credentials, Replica, TlsOptions, TlsProtocol,
};
pub use cursor::Cursor;
pub use database::{CreateOptions, Database};
pub use error::{Error, Result};
pub use pool::free_slot_scan;
