/*!
 * @file client.rs
 * @brief Refcounted client handle: replicas, pool, request ids, auth state
 */

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::auth;
use crate::bson::{Bson, Document};
use crate::commands::StatusReply;
use crate::config::{
    parse_uri, validate_write_concern, ClientOptions, Credentials, Replica,
};
use crate::database::Database;
use crate::doc;
use crate::error::{Error, Result};
use crate::pool::{ConnectionPool, PooledSocket};
use crate::srv;
use crate::wire::{self, Reply};

/// Cheap-clone handle over the shared client state. Databases and
/// collections borrow it; workers only ever see their channel endpoints.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    replicas: Vec<Replica>,
    pool: ConnectionPool,
    options: ClientOptions,
    credentials: Option<Credentials>,
    authenticated: AtomicBool,
}

impl Client {
    /// Connect with default options. `mongodb+srv://` URIs resolve their
    /// replica list over DNS and force TLS.
    pub async fn connect(uri: &str) -> Result<Client> {
        Client::connect_with_options(uri, ClientOptions::default()).await
    }

    pub async fn connect_with_options(uri: &str, options: ClientOptions) -> Result<Client> {
        validate_write_concern(&options.write_concern)?;
        let parts = parse_uri(uri)?;
        let replicas = if parts.srv {
            srv::resolve_srv(&parts.host, options.dns_server).await?
        } else {
            vec![Replica { host: parts.host.clone(), port: parts.port, tls: false }]
        };
        let credentials = parts.credentials();
        let pool = ConnectionPool::new(&replicas, options.max_connections, &options.tls)?;
        info!(
            replicas = replicas.len(),
            slots = replicas.len() * options.max_connections,
            authenticated_mode = credentials.is_some(),
            "client connected"
        );
        Ok(Client {
            inner: Arc::new(ClientInner {
                replicas,
                pool,
                options,
                credentials,
                authenticated: AtomicBool::new(false),
            }),
        })
    }

    pub fn database(&self, name: &str) -> Database {
        Database::new(self.clone(), name)
    }

    pub fn replicas(&self) -> &[Replica] {
        &self.inner.replicas
    }

    pub fn write_concern(&self) -> &Document {
        &self.inner.options.write_concern
    }

    pub fn query_flags(&self) -> i32 {
        self.inner.options.query_flags
    }

    /// True once any slot has completed authentication.
    pub fn authenticated(&self) -> bool {
        self.inner.authenticated.load(Ordering::Relaxed)
    }

    pub(crate) fn next_request_id(&self) -> i32 {
        self.inner.pool.next_request_id()
    }

    /// Acquire a slot, authenticating it first when the client holds
    /// credentials and the slot has not yet been through SCRAM.
    pub(crate) async fn acquire(&self) -> Result<PooledSocket> {
        let mut socket = self.inner.pool.acquire().await?;
        if let Some(credentials) = &self.inner.credentials {
            if !socket.authenticated {
                let outcome = auth::authenticate_socket(
                    &mut socket,
                    &self.inner.pool,
                    credentials,
                    self.inner.options.auth_mechanism,
                )
                .await;
                match outcome {
                    Ok(()) => {
                        self.inner.pool.mark_authenticated(socket.index);
                        self.inner.authenticated.store(true, Ordering::Relaxed);
                    }
                    Err(err) => {
                        let _ = self.inner.pool.release(socket);
                        return Err(err);
                    }
                }
            }
        }
        Ok(socket)
    }

    pub(crate) fn release(&self, socket: PooledSocket) -> Result<()> {
        self.inner.pool.release(socket)
    }

    /// One framed message, one reply, on a locally acquired slot.
    pub(crate) async fn round_trip(&self, packet: Vec<u8>) -> Result<Reply> {
        let mut socket = self.acquire().await?;
        let reply = socket.round_trip(packet).await;
        self.release(socket)?;
        reply
    }

    /// Frame and send an OP_QUERY, merging in the client-wide flags.
    pub(crate) async fn send_query(
        &self,
        flags: i32,
        namespace: &str,
        number_to_skip: i32,
        number_to_return: i32,
        query: &Document,
        projection: Option<&Document>,
    ) -> Result<Reply> {
        let packet = wire::encode_query(
            self.next_request_id(),
            flags | self.query_flags(),
            namespace,
            number_to_skip,
            number_to_return,
            query,
            projection,
        )?;
        self.round_trip(packet).await
    }

    /// Run a command against the `admin` database.
    pub async fn run_admin_command(&self, command: Document) -> Result<Document> {
        self.database("admin").run_command(command).await
    }

    pub async fn is_master(&self) -> Result<Document> {
        self.run_admin_command(doc! { "isMaster": 1 }).await
    }

    pub async fn ping(&self) -> Result<bool> {
        let reply = self.run_admin_command(doc! { "ping": 1 }).await?;
        Ok(reply.get("ok").and_then(Bson::numeric).unwrap_or(0.0) != 0.0)
    }

    pub async fn server_status(&self) -> Result<Document> {
        self.run_admin_command(doc! { "serverStatus": 1 }).await
    }

    pub async fn list_databases(&self) -> Result<Vec<Document>> {
        let reply = self.run_admin_command(doc! { "listDatabases": 1 }).await?;
        let databases = reply
            .get_array("databases")
            .map_err(|_| Error::Protocol("listDatabases reply lacks databases".to_string()))?;
        databases
            .iter()
            .map(|entry| entry.as_document().cloned())
            .collect()
    }

    pub async fn database_names(&self) -> Result<Vec<String>> {
        let databases = self.list_databases().await?;
        databases
            .iter()
            .map(|db| db.get_str("name").map(str::to_string))
            .collect()
    }

    /// `renameCollection` runs against `admin` with fully qualified
    /// namespaces.
    pub async fn rename_collection(
        &self,
        from_namespace: &str,
        to_namespace: &str,
        drop_target: bool,
    ) -> Result<StatusReply> {
        let command = doc! {
            "renameCollection": from_namespace,
            "to": to_namespace,
            "dropTarget": drop_target,
        };
        let reply = self.run_admin_command(command).await?;
        Ok(StatusReply::from_reply(reply))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("replicas", &self.inner.replicas)
            .field("authenticated", &self.authenticated())
            .finish()
    }
}
