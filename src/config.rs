/*!
 * @file config.rs
 * @brief Client options, credentials and connection-URI parsing
 */

use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::bson::Document;
use crate::doc;
use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 27017;

/// One addressable MongoDB endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
    pub auth_db: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMechanism {
    ScramSha1,
    MongodbCr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Pool slots per replica.
    pub max_connections: usize,
    /// OP_QUERY flag bits applied to every query.
    pub query_flags: i32,
    /// Default write concern attached to write commands; must contain "w".
    pub write_concern: Document,
    pub auth_mechanism: AuthMechanism,
    pub tls: TlsOptions,
    /// Resolver for SRV lookups; falls back to `DNS_SERVER` env, then 8.8.8.8.
    pub dns_server: Option<IpAddr>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_connections: 4,
            query_flags: 0,
            write_concern: doc! { "w": 1 },
            auth_mechanism: AuthMechanism::ScramSha1,
            tls: TlsOptions::default(),
            dns_server: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsOptions {
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub verify_peer: bool,
    pub protocol: TlsProtocol,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            ca_file: None,
            cert_file: None,
            key_file: None,
            verify_peer: true,
            protocol: TlsProtocol::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsProtocol {
    Auto,
    Tls12,
    Tls13,
}

/// A write concern is any document carrying a "w" key.
pub fn validate_write_concern(concern: &Document) -> Result<()> {
    if !concern.contains_key("w") {
        return Err(Error::Config("write concern must contain key \"w\"".to_string()));
    }
    Ok(())
}

/// Decomposed connection URI, before SRV resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriParts {
    pub srv: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub auth_db: String,
}

impl UriParts {
    /// Authenticated mode needs user, password and a non-empty path.
    pub fn credentials(&self) -> Option<Credentials> {
        if self.user.is_empty() || self.auth_db.is_empty() {
            return None;
        }
        Some(Credentials {
            user: self.user.clone(),
            pass: self.pass.clone(),
            auth_db: self.auth_db.clone(),
        })
    }
}

/// Accepts `mongodb://`, `mongodb+srv://` and the `mongo://` aliases.
/// `+srv` schemes imply TLS and defer the replica list to DNS.
pub fn parse_uri(uri: &str) -> Result<UriParts> {
    let url = Url::parse(uri).map_err(|e| Error::Config(format!("invalid connection uri: {e}")))?;
    let srv = match url.scheme() {
        "mongodb" | "mongo" => false,
        "mongodb+srv" | "mongo+srv" => true,
        other => {
            return Err(Error::Config(format!("unsupported uri scheme {other:?}")));
        }
    };
    let host = url
        .host_str()
        .ok_or_else(|| Error::Config(format!("connection uri {uri:?} has no host")))?
        .to_string();
    Ok(UriParts {
        srv,
        host,
        port: url.port().unwrap_or(DEFAULT_PORT),
        user: url.username().to_string(),
        pass: url.password().unwrap_or("").to_string(),
        auth_db: url.path().trim_start_matches('/').to_string(),
    })
}
