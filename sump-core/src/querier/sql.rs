use crate::{
    Context, Error, Filter, Query, QueryOptions, Querier, Record, Result, Schema, SqlConnection,
    SqlDialect, Value, WriteResult, fill_on_insert, fill_on_update, map_rows, truncate_long,
};
use futures::future::BoxFuture;
use std::sync::Arc;

/// The relational querier: compiles every operation through a
/// [`SqlDialect`] and sends the text to one [`SqlConnection`].
pub struct SqlQuerier<C: SqlConnection> {
    conn: C,
    dialect: Box<dyn SqlDialect>,
    schema: Arc<Schema>,
    pending_transaction: bool,
}

impl<C: SqlConnection> SqlQuerier<C> {
    pub fn new(conn: C, dialect: impl SqlDialect + 'static, schema: Arc<Schema>) -> Self {
        Self {
            conn,
            dialect: Box::new(dialect),
            schema,
            pending_transaction: false,
        }
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    async fn all(&mut self, sql: String) -> Result<Vec<Record>> {
        log::debug!("{}", truncate_long!(sql));
        self.conn
            .all(&sql)
            .await
            .with_context(|| format!("While executing the query:\n{}", truncate_long!(sql)))
    }

    async fn run(&mut self, sql: String) -> Result<WriteResult> {
        log::debug!("{}", truncate_long!(sql));
        self.conn
            .run(&sql)
            .await
            .with_context(|| format!("While executing the statement:\n{}", truncate_long!(sql)))
    }
}

impl<C: SqlConnection> Querier for SqlQuerier<C> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn count<'a>(
        &'a mut self,
        entity: &'a str,
        filter: Option<Filter>,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let sql = {
                let meta = self.schema.meta(entity)?;
                self.dialect
                    .count(&self.schema, meta, filter.as_ref(), QueryOptions::default())?
            };
            let rows = self.all(sql).await?;
            rows.first()
                .and_then(|row| row.value("count"))
                .and_then(Value::as_u64)
                .ok_or_else(|| Error::msg(format!("Count of `{}` returned no value", entity)))
        })
    }

    fn find_many<'a>(
        &'a mut self,
        entity: &'a str,
        query: Query,
    ) -> BoxFuture<'a, Result<Vec<Record>>> {
        Box::pin(async move {
            let sql = {
                let meta = self.schema.meta(entity)?;
                self.dialect
                    .find(&self.schema, meta, &query, QueryOptions::default())?
            };
            let rows = self.all(sql).await?;
            let mut founds = map_rows(rows);
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
            let (sql, id_key) = {
                let meta = self.schema.meta(entity)?;
                fill_on_insert(meta, &mut payload);
                (self.dialect.insert(meta, &payload)?, meta.id())
            };
            let result = self.run(sql).await?;
            let mut ids = Vec::with_capacity(payload.len());
            for (index, record) in payload.iter_mut().enumerate() {
                let id = match record.value(id_key) {
                    Some(id) if !id.is_null() => id.clone(),
                    _ => {
                        let first = result.first_insert_id.ok_or_else(|| {
                            Error::msg(format!(
                                "The backend reported no inserted id for `{}`",
                                entity
                            ))
                        })?;
                        let id = Value::Int(first + index as i64);
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
            let sql = {
                let meta = self.schema.meta(entity)?;
                fill_on_update(meta, std::slice::from_mut(&mut payload));
                self.dialect.update(
                    &self.schema,
                    meta,
                    Some(&filter),
                    &payload,
                    QueryOptions::default(),
                )?
            };
            let result = self.run(sql).await?;
            self.update_relations(entity, &filter, &payload).await?;
            Ok(result.affected)
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
            let sql = {
                let meta = self.schema.meta(entity)?;
                self.dialect
                    .delete(&self.schema, meta, Some(&Filter::is_in(id_key, ids)), opts)?
            };
            let result = self.run(sql).await?;
            Ok(result.affected)
        })
    }

    fn has_open_transaction(&self) -> bool {
        self.pending_transaction
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        if self.pending_transaction {
            return Err(Error::msg("There is a pending transaction"));
        }
        let command = self.dialect.begin_transaction_command();
        self.run(command.into()).await?;
        self.pending_transaction = true;
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        if !self.pending_transaction {
            return Err(Error::msg("There is not a pending transaction"));
        }
        self.run("COMMIT".into()).await?;
        self.pending_transaction = false;
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        if !self.pending_transaction {
            return Err(Error::msg("There is not a pending transaction"));
        }
        self.run("ROLLBACK".into()).await?;
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
