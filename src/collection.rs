/*!
 * @file collection.rs
 * @brief Collection handle: queries, CRUD commands, DDL
 */

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bson::{Bson, Document, ObjectId};
use crate::bson_serde::{from_document, to_document};
use crate::commands::StatusReply;
use crate::cursor::Cursor;
use crate::database::Database;
use crate::doc;
use crate::error::{Error, Result};

/// A named collection; its string form is `"<db>.<name>"`.
#[derive(Debug, Clone)]
pub struct Collection {
    db: Database,
    name: String,
}

/// Options for [`Collection::find_and_modify`].
#[derive(Debug, Clone, Default)]
pub struct FindAndModify {
    pub query: Document,
    pub sort: Option<Document>,
    /// Update document; ignored when `remove` is set.
    pub update: Option<Document>,
    pub remove: bool,
    /// Return the post-image instead of the pre-image.
    pub return_new: bool,
    pub upsert: bool,
    pub fields: Option<Document>,
}

impl Collection {
    pub(crate) fn new(db: Database, name: &str) -> Collection {
        Collection { db, name: name.to_string() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.db.name(), self.name)
    }

    fn write_concern(&self) -> Document {
        self.db.client().write_concern().clone()
    }

    /// Lazy query; nothing is sent until the cursor is first drained.
    pub fn find(&self, filter: Document) -> Cursor {
        self.find_with(filter, None, 0)
    }

    pub fn find_with(
        &self,
        filter: Document,
        projection: Option<Document>,
        max_time_ms: i64,
    ) -> Cursor {
        Cursor::new(
            self.db.client().clone(),
            self.full_name(),
            filter,
            projection,
            max_time_ms,
        )
    }

    pub async fn find_one(&self, filter: Document) -> Result<Document> {
        self.find(filter).first().await
    }

    pub async fn find_one_opt(&self, filter: Document) -> Result<Option<Document>> {
        self.find(filter).first_or_none().await
    }

    /// [`find_one`](Collection::find_one) decoded through the object
    /// mapper.
    pub async fn find_one_as<T: DeserializeOwned>(&self, filter: Document) -> Result<T> {
        from_document(self.find_one(filter).await?)
    }

    pub async fn insert_one(&self, document: Document) -> Result<StatusReply> {
        self.insert_many(vec![document]).await
    }

    /// Documents lacking `_id` get a fresh ObjectId before the command is
    /// framed; the generated ids come back in
    /// [`StatusReply::inserted_ids`].
    pub async fn insert_many(&self, documents: Vec<Document>) -> Result<StatusReply> {
        let mut generated = Vec::new();
        let documents: Vec<Bson> = documents
            .into_iter()
            .map(|mut doc| {
                if !doc.contains_key("_id") {
                    let id = ObjectId::new();
                    doc.insert("_id", Bson::ObjectId(id));
                    generated.push(Bson::ObjectId(id));
                }
                Bson::Document(doc)
            })
            .collect();
        let command = doc! {
            "insert": self.name.clone(),
            "documents": Bson::Array(documents),
            "writeConcern": self.write_concern(),
        };
        let mut status = self.db.run_status(command).await?;
        status.inserted_ids = generated;
        Ok(status)
    }

    /// Insert a mapped value.
    pub async fn insert_object<T: Serialize>(&self, value: &T) -> Result<StatusReply> {
        self.insert_one(to_document(value)?).await
    }

    pub async fn update(
        &self,
        selector: Document,
        update: Document,
        multi: bool,
        upsert: bool,
    ) -> Result<StatusReply> {
        let command = doc! {
            "update": self.name.clone(),
            "updates": [{
                "q": selector,
                "u": update,
                "multi": multi,
                "upsert": upsert,
            }],
            "writeConcern": self.write_concern(),
        };
        self.db.run_status(command).await
    }

    /// `limit` 0 removes every match, 1 removes the first.
    pub async fn delete(&self, selector: Document, limit: i32) -> Result<StatusReply> {
        let command = doc! {
            "delete": self.name.clone(),
            "deletes": [{ "q": selector, "limit": limit }],
            "writeConcern": self.write_concern(),
        };
        self.db.run_status(command).await
    }

    pub async fn count(&self, filter: Document) -> Result<i64> {
        let command = doc! { "count": self.name.clone(), "query": filter };
        let reply = self.db.run_command(command).await?;
        reply
            .get("n")
            .and_then(Bson::numeric)
            .map(|n| n as i64)
            .ok_or_else(|| Error::Protocol("count reply lacks n".to_string()))
    }

    pub async fn distinct(&self, key: &str, filter: Option<Document>) -> Result<Vec<Bson>> {
        let mut command = doc! { "distinct": self.name.clone(), "key": key };
        if let Some(filter) = filter {
            command.push("query", filter);
        }
        let reply = self.db.run_command(command).await?;
        Ok(reply.get_array("values")?.clone())
    }

    /// Atomic read-and-mutate. Returns the pre- or post-image under the
    /// options' `return_new`, absent when nothing matched.
    pub async fn find_and_modify(&self, options: FindAndModify) -> Result<Option<Document>> {
        let mut command = doc! { "findAndModify": self.name.clone(), "query": options.query };
        if let Some(sort) = options.sort {
            command.push("sort", sort);
        }
        if options.remove {
            command.push("remove", true);
        } else if let Some(update) = options.update {
            command.push("update", update);
        } else {
            return Err(Error::Config(
                "findAndModify needs either an update document or remove".to_string(),
            ));
        }
        if options.return_new {
            command.push("new", true);
        }
        if options.upsert {
            command.push("upsert", true);
        }
        if let Some(fields) = options.fields {
            command.push("fields", fields);
        }
        let reply = self.db.run_command(command).await?;
        match reply.get("value") {
            Some(Bson::Document(doc)) => Ok(Some(doc.clone())),
            _ => Ok(None),
        }
    }

    pub async fn drop(&self) -> Result<StatusReply> {
        self.db.drop_collection(&self.name).await
    }

    pub async fn rename(&self, new_name: &str, drop_target: bool) -> Result<StatusReply> {
        let target = format!("{}.{}", self.db.name(), new_name);
        self.db
            .client()
            .rename_collection(&self.full_name(), &target, drop_target)
            .await
    }

    /// collStats.
    pub async fn stats(&self) -> Result<Document> {
        self.db.run_command(doc! { "collStats": self.name.clone() }).await
    }
}
