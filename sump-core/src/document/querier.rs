use crate::{
    DocumentConnection, DocumentDialect, Error, Filter, Query, QueryOptions, Querier, Record,
    Result, Schema, Value, document::record_to_document, document_to_record, document_to_value,
    fill_on_insert, fill_on_update,
};
use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Arc;

/// The document-store querier: compiles every operation through a
/// [`DocumentDialect`] and sends the native documents to one
/// [`DocumentConnection`]. Transactions ride on the connection's session
/// commands, guarded by the same local state machine as the SQL side.
pub struct DocumentQuerier<C: DocumentConnection> {
    conn: C,
    dialect: DocumentDialect,
    schema: Arc<Schema>,
    pending_transaction: bool,
}

impl<C: DocumentConnection> DocumentQuerier<C> {
    pub fn new(conn: C, schema: Arc<Schema>) -> Self {
        Self {
            conn,
            dialect: DocumentDialect::new(),
            schema,
            pending_transaction: false,
        }
    }

    pub fn dialect(&self) -> &DocumentDialect {
        &self.dialect
    }
}

impl<C: DocumentConnection> Querier for DocumentQuerier<C> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn count<'a>(
        &'a mut self,
        entity: &'a str,
        filter: Option<Filter>,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let (collection, filter) = {
                let meta = self.schema.meta(entity)?;
                let filter = self.dialect.filter(
                    &self.schema,
                    meta,
                    filter.as_ref(),
                    QueryOptions::default(),
                )?;
                (meta.name(), filter)
            };
            log::debug!("count {} {}", collection, filter);
            self.conn.count(collection, filter).await
        })
    }

    fn find_many<'a>(
        &'a mut self,
        entity: &'a str,
        query: Query,
    ) -> BoxFuture<'a, Result<Vec<Record>>> {
        Box::pin(async move {
            let documents = if query.populate.is_empty() {
                let (collection, command) = {
                    let meta = self.schema.meta(entity)?;
                    let command = self.dialect.find_command(
                        &self.schema,
                        meta,
                        &query,
                        QueryOptions::default(),
                    )?;
                    (meta.name(), command)
                };
                log::debug!("find {}", collection);
                self.conn.find(collection, command).await?
            } else {
                let (collection, pipeline) = {
                    let meta = self.schema.meta(entity)?;
                    let pipeline = self.dialect.aggregation_pipeline(
                        &self.schema,
                        meta,
                        &query,
                        QueryOptions::default(),
                    )?;
                    (meta.name(), pipeline)
                };
                log::debug!("aggregate {}", collection);
                self.conn.aggregate(collection, pipeline).await?
            };
            let mut founds = {
                let meta = self.schema.meta(entity)?;
                documents
                    .into_iter()
                    .map(|document| document_to_record(&self.schema, meta, document))
                    .collect::<Vec<_>>()
            };
            if !query.populate.is_empty() {
                self.populate_to_many_relations(entity, &mut founds, &query.populate)
                    .await?;
            }
            Ok(founds)
        })
    }

    fn insert_many<'a>(
        &'a mut self,
        entity: &'a str,
        mut payload: Vec<Record>,
    ) -> BoxFuture<'a, Result<Vec<Value>>> {
        Box::pin(async move {
            if payload.is_empty() {
                return Ok(Vec::new());
            }
            let (collection, id_key, documents) = {
                let meta = self.schema.meta(entity)?;
                fill_on_insert(meta, &mut payload);
                let documents = payload
                    .iter()
                    .map(|record| record_to_document(meta, record))
                    .collect::<Vec<_>>();
                (meta.name(), meta.id(), documents)
            };
            log::debug!("insert {} ({} documents)", collection, documents.len());
            let inserted = self.conn.insert_many(collection, documents).await?;
            if inserted.len() != payload.len() {
                return Err(Error::msg(format!(
                    "The backend inserted {} documents into `{}` instead of {}",
                    inserted.len(),
                    entity,
                    payload.len()
                )));
            }
            let mut ids = Vec::with_capacity(payload.len());
            for (record, inserted_id) in payload.iter_mut().zip(inserted) {
                let id = match record.value(id_key) {
                    Some(id) if !id.is_null() => id.clone(),
                    _ => {
                        let id = document_to_value(&inserted_id);
                        record.set(id_key, id.clone());
                        id
                    }
                };
                ids.push(id);
            }
            self.insert_relations(entity, &payload).await?;
            Ok(ids)
        })
    }

    fn update_many<'a>(
        &'a mut self,
        entity: &'a str,
        filter: Filter,
        mut payload: Record,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let (collection, filter_document, set) = {
                let meta = self.schema.meta(entity)?;
                fill_on_update(meta, std::slice::from_mut(&mut payload));
                let filter_document = self.dialect.filter(
                    &self.schema,
                    meta,
                    Some(&filter),
                    QueryOptions::default(),
                )?;
                let mut set = record_to_document(meta, &payload);
                // The identifier is immutable on the document side.
                if let Some(object) = set.as_object_mut() {
                    object.remove("_id");
                }
                (meta.name(), filter_document, set)
            };
            log::debug!("update {} {}", collection, filter_document);
            let affected = self
                .conn
                .update_many(collection, filter_document, json!({ "$set": set }))
                .await?;
            self.update_relations(entity, &filter, &payload).await?;
            Ok(affected)
        })
    }

    fn delete_many<'a>(
        &'a mut self,
        entity: &'a str,
        filter: Filter,
        opts: QueryOptions,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let id_key = self.schema.meta(entity)?.id();
            let founds = self
                .find_many(
                    entity,
                    Query {
                        filter: Some(filter),
                        project: Some(vec![id_key.into()]),
                        ..Query::default()
                    },
                )
                .await?;
            if founds.is_empty() {
                return Ok(0);
            }
            let ids: Vec<Value> = founds
                .iter()
                .filter_map(|row| row.value(id_key).cloned())
                .collect();
            self.delete_relations(entity, ids.clone()).await?;
            let by_id = Filter::is_in(id_key, ids);
            let (collection, filter_document, soft_set) = {
                let meta = self.schema.meta(entity)?;
                let filter_document =
                    self.dialect
                        .filter(&self.schema, meta, Some(&by_id), opts)?;
                let soft_set = match meta.soft_delete_key().filter(|_| !opts.hard_delete) {
                    Some(key) => {
                        let callback = meta
                            .field_def(key)
                            .and_then(|field| field.on_delete)
                            .ok_or_else(|| {
                                Error::msg(format!(
                                    "`{}.{}` is the soft-delete field and needs an on_delete callback",
                                    meta.name(),
                                    key
                                ))
                            })?;
                        Some(json!({ "$set": {
                            crate::document::document_key(meta, key): crate::value_to_document(&callback())
                        } }))
                    }
                    None => None,
                };
                (meta.name(), filter_document, soft_set)
            };
            log::debug!("delete {} {}", collection, filter_document);
            match soft_set {
                Some(update) => self.conn.update_many(collection, filter_document, update).await,
                None => self.conn.delete_many(collection, filter_document).await,
            }
        })
    }

    fn has_open_transaction(&self) -> bool {
        self.pending_transaction
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        if self.pending_transaction {
            return Err(Error::msg("There is a pending transaction"));
        }
        self.conn.begin_session().await?;
        self.pending_transaction = true;
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        if !self.pending_transaction {
            return Err(Error::msg("There is not a pending transaction"));
        }
        self.conn.commit_session().await?;
        self.pending_transaction = false;
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        if !self.pending_transaction {
            return Err(Error::msg("There is not a pending transaction"));
        }
        self.conn.abort_session().await?;
        self.pending_transaction = false;
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        if self.pending_transaction {
            return Err(Error::msg(
                "The querier must not be released while a transaction is pending",
            ));
        }
        self.conn.release().await
    }
}
