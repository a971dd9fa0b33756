/*!
 * @file database.rs
 * @brief Database handle and the $cmd command facade
 */

use crate::bson::{Bson, Document};
use crate::client::Client;
use crate::collection::Collection;
use crate::commands::{check_reply_document, StatusReply};
use crate::doc;
use crate::error::{Error, Result};
use crate::wire;

/// A named database behind a client handle; cheap to create and clone.
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    name: String,
}

/// Options for `create`; capped collections need `size`.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub capped: bool,
    pub size: Option<i64>,
    pub max: Option<i64>,
}

impl Database {
    pub(crate) fn new(client: Client, name: &str) -> Database {
        Database { client, name: name.to_string() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(self.clone(), name)
    }

    /// Submit a command document through the `$cmd` pseudo-collection and
    /// return the first reply document.
    pub async fn run_command(&self, command: Document) -> Result<Document> {
        let namespace = format!("{}.$cmd", self.name);
        let reply = self
            .client
            .send_query(0, &namespace, 0, -1, &command, None)
            .await?;
        let doc = reply
            .documents
            .into_iter()
            .next()
            .ok_or_else(|| Error::Protocol("command returned no reply document".to_string()))?;
        check_reply_document(&doc)?;
        Ok(doc)
    }

    pub async fn run_status(&self, command: Document) -> Result<StatusReply> {
        Ok(StatusReply::from_reply(self.run_command(command).await?))
    }

    pub async fn list_collections(&self) -> Result<Vec<Document>> {
        let reply = self.run_command(doc! { "listCollections": 1 }).await?;
        self.drain_command_cursor(reply).await
    }

    pub async fn collection_names(&self) -> Result<Vec<String>> {
        let collections = self.list_collections().await?;
        collections
            .iter()
            .map(|info| info.get_str("name").map(str::to_string))
            .collect()
    }

    pub async fn create_collection(
        &self,
        name: &str,
        options: CreateOptions,
    ) -> Result<StatusReply> {
        let mut command = doc! { "create": name };
        if options.capped {
            command.push("capped", true);
        }
        if let Some(size) = options.size {
            command.push("size", size);
        }
        if let Some(max) = options.max {
            command.push("max", max);
        }
        self.run_status(command).await
    }

    pub async fn drop_collection(&self, name: &str) -> Result<StatusReply> {
        self.run_status(doc! { "drop": name }).await
    }

    /// dropDatabase.
    pub async fn drop(&self) -> Result<StatusReply> {
        self.run_status(doc! { "dropDatabase": 1 }).await
    }

    /// Create a user in this database. `roles` are role names granted on
    /// this database.
    pub async fn create_user(
        &self,
        user: &str,
        pass: &str,
        roles: &[&str],
    ) -> Result<StatusReply> {
        let roles: Vec<Bson> = roles
            .iter()
            .map(|role| Bson::Document(doc! { "role": *role, "db": self.name.clone() }))
            .collect();
        let command = doc! {
            "createUser": user,
            "pwd": pass,
            "roles": Bson::Array(roles),
        };
        self.run_status(command).await
    }

    pub async fn drop_user(&self, user: &str) -> Result<StatusReply> {
        self.run_status(doc! { "dropUser": user }).await
    }

    pub async fn get_last_error(&self) -> Result<Document> {
        self.run_command(doc! { "getLastError": 1 }).await
    }

    /// Commands like listCollections answer with a command cursor
    /// (`{cursor: {firstBatch, id, ns}}`); follow it with OP_GET_MORE
    /// until drained.
    async fn drain_command_cursor(&self, reply: Document) -> Result<Vec<Document>> {
        let cursor_doc = reply
            .get_document("cursor")
            .map_err(|_| Error::Protocol("command reply lacks a cursor document".to_string()))?;
        let namespace = cursor_doc.get_str("ns")?.to_string();
        let mut cursor_id = cursor_doc.get_i64("id")?;
        let mut out = Vec::new();
        for item in cursor_doc.get_array("firstBatch")? {
            out.push(item.as_document()?.clone());
        }
        while cursor_id != 0 {
            let packet =
                wire::encode_get_more(self.client.next_request_id(), &namespace, 0, cursor_id)?;
            let batch = self.client.round_trip(packet).await?;
            cursor_id = batch.cursor_id;
            out.extend(batch.documents);
        }
        Ok(out)
    }
}
