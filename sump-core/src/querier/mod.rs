mod sql;

pub use sql::*;

use crate::{
    Cardinality, CascadeAction, Entry, Error, Filter, Query, QueryOptions, Record, RelationDef,
    Result, Schema, Value, persistable_relation_keys,
};
use futures::future::BoxFuture;
use std::future::Future;

/// Uniform CRUD and transaction contract over one backend connection.
///
/// Implementors supply the primitive batch operations (`count`, `find_many`,
/// `insert_many`, `update_many`, `delete_many`) and the transaction
/// commands; the relation-resolution algorithms — population of to-many
/// relations, cascading saves and cascading deletes — are provided here once
/// and run against those primitives, whatever the backend.
///
/// A querier owns exactly one connection. Operations are asynchronous but
/// not re-entrant: issue one logical operation at a time.
pub trait Querier: Send {
    fn schema(&self) -> &Schema;

    fn count<'a>(
        &'a mut self,
        entity: &'a str,
        filter: Option<Filter>,
    ) -> BoxFuture<'a, Result<u64>>;

    /// Runs the query and maps the result rows back to records. When the
    /// query populates relations, the to-one side comes back joined and the
    /// to-many side is fetched by [`populate_to_many_relations`](Self::populate_to_many_relations).
    fn find_many<'a>(&'a mut self, entity: &'a str, query: Query)
    -> BoxFuture<'a, Result<Vec<Record>>>;

    /// Writes the rows and returns their identifiers, generated or supplied.
    /// Cascades the relations present in the payload afterwards.
    fn insert_many<'a>(
        &'a mut self,
        entity: &'a str,
        payload: Vec<Record>,
    ) -> BoxFuture<'a, Result<Vec<Value>>>;

    /// Returns the affected row count. Cascades the relations present in the
    /// payload afterwards.
    fn update_many<'a>(
        &'a mut self,
        entity: &'a str,
        filter: Filter,
        payload: Record,
    ) -> BoxFuture<'a, Result<u64>>;

    /// Returns the affected row count. Relations configured for delete
    /// cascade go first, so children never dangle behind a constraint.
    fn delete_many<'a>(
        &'a mut self,
        entity: &'a str,
        filter: Filter,
        opts: QueryOptions,
    ) -> BoxFuture<'a, Result<u64>>;

    fn has_open_transaction(&self) -> bool;

    fn begin_transaction(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn commit_transaction(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn rollback_transaction(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Only valid outside a transaction: a connection never goes back to its
    /// pool with work pending.
    fn release(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn find_one<'a>(
        &'a mut self,
        entity: &'a str,
        mut query: Query,
    ) -> BoxFuture<'a, Result<Option<Record>>> {
        Box::pin(async move {
            query.limit = Some(1);
            Ok(self.find_many(entity, query).await?.into_iter().next())
        })
    }

    fn find_one_by_id<'a>(
        &'a mut self,
        entity: &'a str,
        id: Value,
        query: Query,
    ) -> BoxFuture<'a, Result<Option<Record>>> {
        Box::pin(async move {
            let id_key = self.schema().meta(entity)?.id();
            self.find_one(entity, query.filter(Filter::eq(id_key, id)))
                .await
        })
    }

    fn insert_one<'a>(&'a mut self, entity: &'a str, payload: Record) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let mut ids = self.insert_many(entity, vec![payload]).await?;
            ids.pop().ok_or_else(|| {
                Error::msg(format!("Insert into `{}` produced no identifier", entity))
            })
        })
    }

    fn update_one_by_id<'a>(
        &'a mut self,
        entity: &'a str,
        id: Value,
        payload: Record,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let id_key = self.schema().meta(entity)?.id();
            self.update_many(entity, Filter::eq(id_key, id), payload)
                .await
        })
    }

    fn delete_one_by_id<'a>(&'a mut self, entity: &'a str, id: Value) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let id_key = self.schema().meta(entity)?.id();
            self.delete_many(entity, Filter::eq(id_key, id), QueryOptions::default())
                .await
        })
    }

    /// Eagerly loads the requested to-many relations into `payload`: one
    /// batched query per relation key, grouped by the parent id. Parents
    /// without a match simply keep the key absent.
    fn populate_to_many_relations<'a>(
        &'a mut self,
        entity: &'a str,
        payload: &'a mut [Record],
        populate: &'a [(String, Query)],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if payload.is_empty() {
                return Ok(());
            }
            for (rel_key, rel_query) in populate {
                let (relation, id_key) = {
                    let meta = self.schema().meta(entity)?;
                    let Some(relation) = meta.relation_def(rel_key) else {
                        return Err(Error::msg(format!(
                            "`{}.{}` is not a declared relation",
                            meta.name(),
                            rel_key
                        )));
                    };
                    (relation.clone(), meta.id())
                };
                let ids: Vec<Value> = payload
                    .iter()
                    .filter_map(|it| it.value(id_key).cloned())
                    .collect();
                match (relation.cardinality(), relation.through()) {
                    (Cardinality::ManyToMany, Some(through)) => {
                        let target_key = {
                            let through_meta = self.schema().meta(through)?;
                            let index = usize::from(!relation.mapped_by);
                            through_meta
                                .relations()
                                .get(index)
                                .map(RelationDef::key)
                                .ok_or_else(|| {
                                    Error::msg(format!(
                                        "Join entity `{}` must declare both side relations",
                                        through
                                    ))
                                })?
                        };
                        let reference = first_reference(&relation, entity, rel_key)?;
                        let mut sub = rel_query.clone();
                        sub.required = true;
                        let query = Query::new()
                            .project([reference.source])
                            .filter(Filter::is_in(reference.source, ids))
                            .populate(target_key, sub);
                        let founds = self.find_many(through, query).await?;
                        let mut children = Vec::with_capacity(founds.len());
                        for mut row in founds {
                            let Some(parent_id) = row.value(reference.source).cloned() else {
                                continue;
                            };
                            if let Some(Entry::One(target)) = row.take(target_key) {
                                children.push((parent_id, target));
                            }
                        }
                        put_children_in_parents(payload, id_key, rel_key, children);
                    }
                    (Cardinality::OneToMany, _) => {
                        let reference = first_reference(&relation, entity, rel_key)?;
                        let mut sub = rel_query.clone();
                        if let Some(project) = &mut sub.project {
                            if !project.iter().any(|key| key == reference.source) {
                                project.push(reference.source.to_owned());
                            }
                        }
                        sub.filter = Some(Filter::is_in(reference.source, ids));
                        let founds = self.find_many(relation.target(), sub).await?;
                        let children = founds
                            .into_iter()
                            .filter_map(|child| {
                                child
                                    .value(reference.source)
                                    .cloned()
                                    .map(|parent_id| (parent_id, child))
                            })
                            .collect();
                        put_children_in_parents(payload, id_key, rel_key, children);
                    }
                    // To-one relations come back joined with the primary query.
                    _ => {}
                }
            }
            Ok(())
        })
    }

    /// Cascades the relations present in freshly inserted rows. The parent
    /// ids must be set on the payload already.
    fn insert_relations<'a>(
        &'a mut self,
        entity: &'a str,
        payload: &'a [Record],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for record in payload {
                let keys = persistable_relation_keys(
                    self.schema().meta(entity)?,
                    record,
                    CascadeAction::Persist,
                );
                for key in keys {
                    self.save_relation(entity, record, key, false).await?;
                }
            }
            Ok(())
        })
    }

    /// Cascades the relations of an update to every row the filter matched.
    fn update_relations<'a>(
        &'a mut self,
        entity: &'a str,
        filter: &'a Filter,
        payload: &'a Record,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let (keys, id_key) = {
                let meta = self.schema().meta(entity)?;
                (
                    persistable_relation_keys(meta, payload, CascadeAction::Persist),
                    meta.id(),
                )
            };
            if keys.is_empty() {
                return Ok(());
            }
            let founds = self
                .find_many(
                    entity,
                    Query {
                        filter: Some(filter.clone()),
                        project: Some(vec![id_key.into()]),
                        ..Query::default()
                    },
                )
                .await?;
            for found in founds {
                let Some(id) = found.value(id_key).cloned() else {
                    continue;
                };
                let mut with_id = payload.clone();
                with_id.set(id_key, id);
                for key in &keys {
                    self.save_relation(entity, &with_id, key, true).await?;
                }
            }
            Ok(())
        })
    }

    /// Deletes the rows related to `ids` for every relation configured with
    /// a delete cascade: join rows of `mm` relations, matching children of
    /// the direct relations. Every qualifying relation key is processed.
    fn delete_relations<'a>(&'a mut self, entity: &'a str, ids: Vec<Value>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let relations: Vec<RelationDef> = self
                .schema()
                .meta(entity)?
                .relations()
                .iter()
                .filter(|rel| rel.cascade.is_some_and(|c| c.allows(CascadeAction::Delete)))
                .cloned()
                .collect();
            for relation in relations {
                if let Some(through) = relation.through() {
                    let reference = if relation.mapped_by {
                        relation.references().get(1).copied()
                    } else {
                        relation.references().first().copied()
                    };
                    let Some(reference) = reference else {
                        return Err(Error::msg(format!(
                            "`{}.{}` declares no reference",
                            entity,
                            relation.key()
                        )));
                    };
                    self.delete_many(
                        through,
                        Filter::is_in(reference.source, ids.clone()),
                        QueryOptions::default(),
                    )
                    .await?;
                    continue;
                }
                let reference = first_reference(&relation, entity, relation.key())?;
                let key = if relation.mapped_by {
                    reference.target
                } else {
                    reference.source
                };
                self.delete_many(
                    relation.target(),
                    Filter::is_in(key, ids.clone()),
                    QueryOptions::default(),
                )
                .await?;
            }
            Ok(())
        })
    }

    /// Inserts, updates or merely links each record: no id means insert, an
    /// id next to other fields means update, an id alone is a bare link.
    /// Returns the ids in link, insert, update order.
    fn save_many<'a>(
        &'a mut self,
        entity: &'a str,
        payload: Vec<Record>,
    ) -> BoxFuture<'a, Result<Vec<Value>>> {
        Box::pin(async move {
            let id_key = self.schema().meta(entity)?.id();
            let mut links = Vec::new();
            let mut inserts = Vec::new();
            let mut updates = Vec::new();
            for record in payload {
                match record.value(id_key) {
                    Some(id) if !id.is_null() => {
                        let id = id.clone();
                        if record.len() == 1 {
                            links.push(id);
                        } else {
                            updates.push((id, record));
                        }
                    }
                    _ => inserts.push(record),
                }
            }
            let mut ids = links;
            if !inserts.is_empty() {
                ids.extend(self.insert_many(entity, inserts).await?);
            }
            for (id, record) in updates {
                self.update_one_by_id(entity, id.clone(), record).await?;
                ids.push(id);
            }
            Ok(ids)
        })
    }

    /// Cascades one relation key of `payload`. The parent id must be set.
    /// On update, the non-join to-many branches replace wholesale: existing
    /// children matching the foreign key are deleted first.
    fn save_relation<'a>(
        &'a mut self,
        entity: &'a str,
        payload: &'a Record,
        rel_key: &'a str,
        is_update: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let (relation, id_key) = {
                let meta = self.schema().meta(entity)?;
                let Some(relation) = meta.relation_def(rel_key) else {
                    return Err(Error::msg(format!(
                        "`{}.{}` is not a declared relation",
                        meta.name(),
                        rel_key
                    )));
                };
                (relation.clone(), meta.id())
            };
            let Some(id) = payload.value(id_key).cloned() else {
                return Err(Error::msg(format!(
                    "Cannot cascade `{}.{}` without the parent id",
                    entity, rel_key
                )));
            };
            let entry = payload.get(rel_key);
            match relation.cardinality() {
                Cardinality::OneToMany | Cardinality::ManyToMany => {
                    let reference = first_reference(&relation, entity, rel_key)?;
                    if let Some(through) = relation.through() {
                        self.delete_many(
                            through,
                            Filter::eq(reference.source, id.clone()),
                            QueryOptions::default(),
                        )
                        .await?;
                        if let Some(Entry::Many(children)) = entry {
                            let saved = self.save_many(relation.target(), children.clone()).await?;
                            let Some(pair) = relation.references().get(1).copied() else {
                                return Err(Error::msg(format!(
                                    "`{}.{}` must declare the target-side reference",
                                    entity, rel_key
                                )));
                            };
                            let rows = saved
                                .into_iter()
                                .map(|child_id| {
                                    Record::new()
                                        .with(reference.source, id.clone())
                                        .with(pair.source, child_id)
                                })
                                .collect();
                            self.insert_many(through, rows).await?;
                        }
                        return Ok(());
                    }
                    if is_update {
                        self.delete_many(
                            relation.target(),
                            Filter::eq(reference.source, id.clone()),
                            QueryOptions::default(),
                        )
                        .await?;
                    }
                    if let Some(Entry::Many(children)) = entry {
                        let children = children
                            .iter()
                            .cloned()
                            .map(|mut child| {
                                child.set(reference.source, id.clone());
                                child
                            })
                            .collect();
                        self.save_many(relation.target(), children).await?;
                    }
                    Ok(())
                }
                Cardinality::OneToOne => {
                    let reference = first_reference(&relation, entity, rel_key)?;
                    match entry {
                        // An explicit null unlinks by deleting the related row.
                        Some(Entry::Value(Value::Null)) => {
                            self.delete_many(
                                relation.target(),
                                Filter::eq(reference.target, id),
                                QueryOptions::default(),
                            )
                            .await?;
                        }
                        Some(Entry::One(child)) => {
                            let mut child = child.clone();
                            child.set(reference.target, id);
                            self.save_many(relation.target(), vec![child]).await?;
                        }
                        _ => {}
                    }
                    Ok(())
                }
                Cardinality::ManyToOne => {
                    let reference = first_reference(&relation, entity, rel_key)?;
                    // A directly supplied foreign key wins over the nested payload.
                    if payload
                        .value(reference.source)
                        .is_some_and(|value| !value.is_null())
                    {
                        return Ok(());
                    }
                    if let Some(Entry::One(child)) = entry {
                        let child_id = self.insert_one(relation.target(), child.clone()).await?;
                        self.update_one_by_id(
                            entity,
                            id,
                            Record::new().with(reference.source, child_id),
                        )
                        .await?;
                    }
                    Ok(())
                }
            }
        })
    }
}

fn first_reference(
    relation: &RelationDef,
    entity: &str,
    rel_key: &str,
) -> Result<crate::Reference> {
    relation.references().first().copied().ok_or_else(|| {
        Error::msg(format!("`{}.{}` declares no reference", entity, rel_key))
    })
}

/// Groups `children` by the parent id they reference and attaches each group
/// to its parent under `rel_key`.
fn put_children_in_parents(
    parents: &mut [Record],
    id_key: &str,
    rel_key: &str,
    children: Vec<(Value, Record)>,
) {
    let mut groups: Vec<(Value, Vec<Record>)> = Vec::new();
    for (parent_id, child) in children {
        match groups.iter_mut().find(|(key, _)| *key == parent_id) {
            Some((_, group)) => group.push(child),
            None => groups.push((parent_id, vec![child])),
        }
    }
    for parent in parents {
        let Some(parent_id) = parent.value(id_key) else {
            continue;
        };
        if let Some(index) = groups.iter().position(|(key, _)| key == parent_id) {
            parent.set(rel_key, Entry::Many(groups[index].1.clone()));
        }
    }
}
