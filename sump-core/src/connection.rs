use crate::{Record, Result};
use serde_json::Value as Document;
use std::future::Future;

/// Metadata about a write (INSERT/UPDATE/DELETE).
#[derive(Debug, Default, Clone, Copy)]
pub struct WriteResult {
    /// Total number of rows impacted.
    pub affected: u64,
    /// Identifier of the first inserted row when the backend reports one;
    /// ids of later rows of the same statement follow sequentially.
    pub first_insert_id: Option<i64>,
}

/// A live relational connection, exclusively owned by one querier.
///
/// Rows come back flat: joined columns keep their dotted aliases and are
/// nested afterwards by [`map_rows`](crate::map_rows).
pub trait SqlConnection: Send {
    /// Executes `sql` and returns every result row.
    fn all(&mut self, sql: &str) -> impl Future<Output = Result<Vec<Record>>> + Send;

    /// Executes `sql` and returns the write metadata.
    fn run(&mut self, sql: &str) -> impl Future<Output = Result<WriteResult>> + Send;

    /// Returns the connection to wherever it came from.
    fn release(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// The cursor-level knobs of a non-aggregate document read.
#[derive(Debug, Clone, Default)]
pub struct FindCommand {
    pub filter: Option<Document>,
    pub project: Option<Document>,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// A live document-store connection, exclusively owned by one querier.
pub trait DocumentConnection: Send {
    fn find(
        &mut self,
        collection: &str,
        command: FindCommand,
    ) -> impl Future<Output = Result<Vec<Document>>> + Send;

    fn aggregate(
        &mut self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> impl Future<Output = Result<Vec<Document>>> + Send;

    /// Inserts the documents and returns their generated identifiers, in
    /// order.
    fn insert_many(
        &mut self,
        collection: &str,
        documents: Vec<Document>,
    ) -> impl Future<Output = Result<Vec<Document>>> + Send;

    fn update_many(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> impl Future<Output = Result<u64>> + Send;

    fn delete_many(
        &mut self,
        collection: &str,
        filter: Document,
    ) -> impl Future<Output = Result<u64>> + Send;

    fn count(
        &mut self,
        collection: &str,
        filter: Document,
    ) -> impl Future<Output = Result<u64>> + Send;

    fn begin_session(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn commit_session(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn abort_session(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn release(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Supplies queriers already bound to a live connection.
pub trait QuerierPool: Send + Sync {
    type Querier: crate::Querier;

    fn get_querier(&self) -> impl Future<Output = Result<Self::Querier>> + Send;

    /// Closes the pool and every idle connection.
    fn end(&self) -> impl Future<Output = Result<()>> + Send;
}
