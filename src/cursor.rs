/*!
 * @file cursor.rs
 * @brief Lazy server-side iteration over query results
 */

use std::collections::VecDeque;

use futures::stream::{self, Stream};
use tracing::trace;

use crate::bson::{Bson, Document};
use crate::client::Client;
use crate::commands::check_reply_document;
use crate::error::{Error, Result};
use crate::wire::{self, query_flags};

/// Client-side handle to a server cursor. Built by
/// [`Collection::find`](crate::Collection::find), shaped by the builder
/// methods, drained by [`next`](Cursor::next) or the stream adapter.
/// A cursor id of zero means the server has nothing further.
#[derive(Debug)]
pub struct Cursor {
    client: Client,
    namespace: String,
    query: Document,
    projection: Option<Document>,
    flags: i32,
    skip: i32,
    limit: i32,
    batch_size: i32,
    cursor_id: i64,
    delivered: i32,
    closed: bool,
    buffer: VecDeque<Document>,
}

impl Cursor {
    pub(crate) fn new(
        client: Client,
        namespace: String,
        filter: Document,
        projection: Option<Document>,
        max_time_ms: i64,
    ) -> Cursor {
        let mut query = Document::new();
        query.push("$query", Bson::Document(filter));
        if max_time_ms > 0 {
            query.push("$maxTimeMS", Bson::Int64(max_time_ms));
        }
        Cursor {
            client,
            namespace,
            query,
            projection,
            flags: 0,
            skip: 0,
            limit: 0,
            batch_size: 0,
            cursor_id: 0,
            delivered: 0,
            closed: false,
            buffer: VecDeque::new(),
        }
    }

    pub fn skip(mut self, count: i32) -> Self {
        self.skip = count;
        self
    }

    /// Cap on documents across all batches; negative asks the server for a
    /// single hard-capped batch.
    pub fn limit(mut self, count: i32) -> Self {
        self.limit = count;
        self
    }

    pub fn batch_size(mut self, size: i32) -> Self {
        self.batch_size = size;
        self
    }

    /// Server-side sort (`$orderby`).
    pub fn order_by(mut self, sort: Document) -> Self {
        self.query.insert("$orderby", Bson::Document(sort));
        self
    }

    pub fn projection(mut self, fields: Document) -> Self {
        self.projection = Some(fields);
        self
    }

    /// Keep the server cursor alive after draining a capped collection;
    /// with `await_data` the server blocks briefly instead of returning
    /// empty batches.
    pub fn tailable(mut self, await_data: bool) -> Self {
        self.flags |= query_flags::TAILABLE_CURSOR;
        if await_data {
            self.flags |= query_flags::AWAIT_DATA;
        }
        self
    }

    pub fn no_cursor_timeout(mut self) -> Self {
        self.flags |= query_flags::NO_CURSOR_TIMEOUT;
        self
    }

    pub fn query_flags(mut self, flags: i32) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn cursor_id(&self) -> i64 {
        self.cursor_id
    }

    pub fn delivered(&self) -> i32 {
        self.delivered
    }

    fn is_tailable(&self) -> bool {
        self.flags & query_flags::TAILABLE_CURSOR != 0
    }

    /// Mark the cursor closed locally. No killCursors traffic is sent; the
    /// server reaps idle cursors on its own timeout.
    pub fn close(&mut self) {
        self.closed = true;
        self.buffer.clear();
    }

    /// Fetch the next batch from the server: OP_QUERY while no server
    /// cursor exists yet, OP_GET_MORE afterwards.
    pub async fn refresh(&mut self) -> Result<Vec<Document>> {
        if self.closed {
            return Err(Error::Communication("cursor is closed".to_string()));
        }
        let number_to_return = match wire::next_batch_size(self.limit, self.batch_size, self.delivered)
        {
            Some(n) => n,
            None => {
                self.closed = true;
                return Ok(Vec::new());
            }
        };

        let reply = if self.cursor_id == 0 {
            self.client
                .send_query(
                    self.flags,
                    &self.namespace,
                    self.skip,
                    number_to_return,
                    &self.query,
                    self.projection.as_ref(),
                )
                .await?
        } else {
            let packet = wire::encode_get_more(
                self.client.next_request_id(),
                &self.namespace,
                number_to_return,
                self.cursor_id,
            )?;
            self.client.round_trip(packet).await?
        };
        trace!(
            namespace = %self.namespace,
            returned = reply.documents.len(),
            cursor_id = reply.cursor_id,
            "cursor refresh"
        );

        if reply.cursor_not_found() {
            self.cursor_id = 0;
            self.closed = true;
        } else if self.is_tailable() {
            // A live tail never lets an empty batch overwrite the cursor id.
            if reply.cursor_id != 0 {
                self.cursor_id = reply.cursor_id;
            }
        } else {
            self.cursor_id = reply.cursor_id;
            if self.cursor_id == 0 {
                self.closed = true;
            }
        }

        self.delivered += reply.documents.len() as i32;
        for doc in &reply.documents {
            check_reply_document(doc)?;
        }
        if reply.documents.is_empty() && number_to_return == 1 {
            return Err(Error::NotFound);
        }
        Ok(reply.documents)
    }

    /// Pull one document, refreshing whenever the local buffer runs dry.
    /// `None` means the cursor is exhausted, or, for a tailable cursor,
    /// that no new data arrived yet.
    pub async fn next(&mut self) -> Result<Option<Document>> {
        loop {
            if let Some(doc) = self.buffer.pop_front() {
                return Ok(Some(doc));
            }
            if self.closed {
                return Ok(None);
            }
            let batch = self.refresh().await?;
            if batch.is_empty() && self.is_tailable() {
                return Ok(None);
            }
            self.buffer.extend(batch);
        }
    }

    /// At most one batch; `NotFound` when nothing matched.
    pub async fn first(mut self) -> Result<Document> {
        if let Some(doc) = self.buffer.pop_front() {
            return Ok(doc);
        }
        if self.closed {
            return Err(Error::NotFound);
        }
        self.limit = 1;
        let batch = self.refresh().await?;
        batch.into_iter().next().ok_or(Error::NotFound)
    }

    /// [`first`](Cursor::first) with `NotFound` mapped to `None`.
    pub async fn first_or_none(self) -> Result<Option<Document>> {
        match self.first().await {
            Ok(doc) => Ok(Some(doc)),
            Err(Error::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Drain every remaining document.
    pub async fn collect_all(mut self) -> Result<Vec<Document>> {
        let mut out = Vec::new();
        while let Some(doc) = self.next().await? {
            out.push(doc);
        }
        Ok(out)
    }

    /// Adapt to a `futures` stream of documents.
    pub fn into_stream(self) -> impl Stream<Item = Result<Document>> {
        stream::try_unfold(self, |mut cursor| async move {
            match cursor.next().await? {
                Some(doc) => Ok(Some((doc, cursor))),
                None => Ok(None),
            }
        })
    }
}
