use crate::{Filter, Query, QueryOptions, Querier, Record, Result, Value};

/// A per-entity convenience facade over a [`Querier`]: the same operations
/// with the entity name bound once.
pub struct Repository<'q, Q: Querier> {
    entity: &'static str,
    querier: &'q mut Q,
}

impl<'q, Q: Querier> Repository<'q, Q> {
    pub fn new(querier: &'q mut Q, entity: &'static str) -> Self {
        Self { entity, querier }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub async fn count(&mut self, filter: Option<Filter>) -> Result<u64> {
        self.querier.count(self.entity, filter).await
    }

    pub async fn find_one_by_id(&mut self, id: Value, query: Query) -> Result<Option<Record>> {
        self.querier.find_one_by_id(self.entity, id, query).await
    }

    pub async fn find_one(&mut self, query: Query) -> Result<Option<Record>> {
        self.querier.find_one(self.entity, query).await
    }

    pub async fn find_many(&mut self, query: Query) -> Result<Vec<Record>> {
        self.querier.find_many(self.entity, query).await
    }

    pub async fn insert_one(&mut self, payload: Record) -> Result<Value> {
        self.querier.insert_one(self.entity, payload).await
    }

    pub async fn insert_many(&mut self, payload: Vec<Record>) -> Result<Vec<Value>> {
        self.querier.insert_many(self.entity, payload).await
    }

    pub async fn update_one_by_id(&mut self, id: Value, payload: Record) -> Result<u64> {
        self.querier.update_one_by_id(self.entity, id, payload).await
    }

    pub async fn update_many(&mut self, filter: Filter, payload: Record) -> Result<u64> {
        self.querier.update_many(self.entity, filter, payload).await
    }

    pub async fn delete_one_by_id(&mut self, id: Value) -> Result<u64> {
        self.querier.delete_one_by_id(self.entity, id).await
    }

    pub async fn delete_many(&mut self, filter: Filter, opts: QueryOptions) -> Result<u64> {
        self.querier.delete_many(self.entity, filter, opts).await
    }
}
