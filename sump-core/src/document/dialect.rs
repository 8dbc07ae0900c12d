use crate::{
    Cardinality, Compare, EntityMeta, Error, Filter, FindCommand, Query, QueryOptions, Result,
    Schema, SortDirection, document::document_key, value_to_document,
};
use serde_json::{Map, Value as Document, json};

/// Translates entity metadata and the structured query model into native
/// filter documents and aggregation pipelines.
///
/// Pure and I/O free, like its SQL sibling. One `$lookup`/`$unwind` stage
/// pair is emitted per populated to-one relation; to-many relations are
/// resolved after the primary command.
pub struct DocumentDialect;

impl DocumentDialect {
    pub const fn new() -> Self {
        Self {}
    }

    /// The filter document, including the soft-delete guard when the entity
    /// declares one.
    pub fn filter(
        &self,
        schema: &Schema,
        meta: &EntityMeta,
        filter: Option<&Filter>,
        opts: QueryOptions,
    ) -> Result<Document> {
        let user = match filter {
            Some(filter) => Some(self.filter_node(schema, meta, filter)?),
            None => None,
        };
        let guard = meta
            .soft_delete_key()
            .filter(|_| !opts.with_deleted)
            .map(|key| json!({ document_key(meta, key): Document::Null }));
        Ok(match (user, guard) {
            (None, None) => json!({}),
            (Some(user), None) => user,
            (None, Some(guard)) => guard,
            (Some(user), Some(guard)) => json!({ "$and": [user, guard] }),
        })
    }

    fn filter_node(&self, schema: &Schema, meta: &EntityMeta, filter: &Filter) -> Result<Document> {
        match filter {
            Filter::All(items) if items.len() == 1 => self.filter_node(schema, meta, &items[0]),
            Filter::All(items) => Ok(json!({ "$and": self.filter_list(schema, meta, items)? })),
            Filter::Any(items) => Ok(json!({ "$or": self.filter_list(schema, meta, items)? })),
            Filter::Cmp(key, ops) => {
                let field = self.resolve_field(schema, meta, key)?;
                // A single equality reads better as the bare value.
                if let [Compare::Eq(v)] = ops.as_slice() {
                    if !v.is_null() {
                        return Ok(json!({ field: value_to_document(v) }));
                    }
                }
                let mut object = Map::new();
                for op in ops {
                    let (operator, value) = match op {
                        Compare::Eq(v) => ("$eq", value_to_document(v)),
                        Compare::Ne(v) => ("$ne", value_to_document(v)),
                        Compare::Gt(v) => ("$gt", value_to_document(v)),
                        Compare::Gte(v) => ("$gte", value_to_document(v)),
                        Compare::Lt(v) => ("$lt", value_to_document(v)),
                        Compare::Lte(v) => ("$lte", value_to_document(v)),
                        Compare::In(values) => (
                            "$in",
                            Document::Array(values.iter().map(value_to_document).collect()),
                        ),
                        Compare::NotIn(values) => (
                            "$nin",
                            Document::Array(values.iter().map(value_to_document).collect()),
                        ),
                        Compare::StartsWith(prefix) => {
                            object.insert(
                                "$regex".into(),
                                Document::String(format!("^{}", regex_escaped(prefix))),
                            );
                            object.insert("$options".into(), Document::String("i".into()));
                            continue;
                        }
                        Compare::Regex(pattern) => ("$regex", Document::String(pattern.clone())),
                    };
                    object.insert(operator.into(), value);
                }
                Ok(json!({ field: Document::Object(object) }))
            }
        }
    }

    fn filter_list(
        &self,
        schema: &Schema,
        meta: &EntityMeta,
        items: &[Filter],
    ) -> Result<Vec<Document>> {
        items
            .iter()
            .map(|item| self.filter_node(schema, meta, item))
            .collect()
    }

    /// A declared field of `meta`, or a dotted path through its relations.
    fn resolve_field(&self, schema: &Schema, meta: &EntityMeta, key: &str) -> Result<String> {
        let mut current = meta;
        let mut consumed = String::new();
        let mut remainder = key;
        while let Some((head, rest)) = remainder.split_once('.') {
            let Some(relation) = current.relation_def(head) else {
                return Err(Error::msg(format!(
                    "`{}.{}` is not a declared relation",
                    current.name(),
                    head
                )));
            };
            current = schema.meta(relation.target())?;
            if !consumed.is_empty() {
                consumed.push('.');
            }
            consumed.push_str(head);
            remainder = rest;
        }
        if current.field_def(remainder).is_none() {
            return Err(Error::msg(format!(
                "Unknown field `{}.{}`",
                current.name(),
                remainder
            )));
        }
        let field = document_key(current, remainder);
        Ok(if consumed.is_empty() {
            field
        } else {
            format!("{}.{}", consumed, field)
        })
    }

    pub fn project(&self, meta: &EntityMeta, project: Option<&[String]>) -> Result<Option<Document>> {
        let Some(project) = project else {
            return Ok(None);
        };
        let mut object = Map::new();
        for key in project {
            if meta.field_def(key).is_none() {
                return Err(Error::msg(format!(
                    "Unknown field `{}.{}`",
                    meta.name(),
                    key
                )));
            }
            object.insert(document_key(meta, key), json!(1));
        }
        Ok(Some(Document::Object(object)))
    }

    pub fn sort(
        &self,
        meta: &EntityMeta,
        sort: &[(String, SortDirection)],
    ) -> Result<Option<Document>> {
        if sort.is_empty() {
            return Ok(None);
        }
        let mut object = Map::new();
        for (key, direction) in sort {
            if meta.field_def(key).is_none() {
                return Err(Error::msg(format!(
                    "Unknown field `{}.{}`",
                    meta.name(),
                    key
                )));
            }
            let direction = match direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            object.insert(document_key(meta, key), json!(direction));
        }
        Ok(Some(Document::Object(object)))
    }

    /// The cursor-level form of a query without population.
    pub fn find_command(
        &self,
        schema: &Schema,
        meta: &EntityMeta,
        query: &Query,
        opts: QueryOptions,
    ) -> Result<FindCommand> {
        Ok(FindCommand {
            filter: Some(self.filter(schema, meta, query.filter.as_ref(), opts)?),
            project: self.project(meta, query.project.as_deref())?,
            sort: self.sort(meta, &query.sort)?,
            skip: query.skip,
            limit: query.limit,
        })
    }

    /// The aggregation form of a query populating to-one relations.
    pub fn aggregation_pipeline(
        &self,
        schema: &Schema,
        meta: &EntityMeta,
        query: &Query,
        opts: QueryOptions,
    ) -> Result<Vec<Document>> {
        let mut pipeline = Vec::new();
        let filter = self.filter(schema, meta, query.filter.as_ref(), opts)?;
        if filter.as_object().is_some_and(|object| !object.is_empty()) {
            pipeline.push(json!({ "$match": filter }));
        }
        let mut populated = Vec::new();
        for (key, sub) in &query.populate {
            let Some(relation) = meta.relation_def(key) else {
                return Err(Error::msg(format!(
                    "`{}.{}` is not a declared relation",
                    meta.name(),
                    key
                )));
            };
            if matches!(
                relation.cardinality(),
                Cardinality::OneToMany | Cardinality::ManyToMany
            ) {
                continue;
            }
            if !sub.populate.is_empty() {
                return Err(Error::msg(format!(
                    "`{}.{}`: the document backend does not support nested population",
                    meta.name(),
                    key
                )));
            }
            let Some(reference) = relation.references().first() else {
                return Err(Error::msg(format!(
                    "`{}.{}` declares no reference",
                    meta.name(),
                    key
                )));
            };
            let rel_meta = schema.meta(relation.target())?;
            pipeline.push(json!({
                "$lookup": {
                    "from": rel_meta.name(),
                    "localField": document_key(meta, reference.source),
                    "foreignField": document_key(rel_meta, reference.target),
                    "as": key,
                }
            }));
            pipeline.push(json!({
                "$unwind": {
                    "path": format!("${}", key),
                    "preserveNullAndEmptyArrays": !sub.required,
                }
            }));
            populated.push(key.as_str());
        }
        if let Some(sort) = self.sort(meta, &query.sort)? {
            pipeline.push(json!({ "$sort": sort }));
        }
        if let Some(skip) = query.skip {
            pipeline.push(json!({ "$skip": skip }));
        }
        if let Some(limit) = query.limit {
            pipeline.push(json!({ "$limit": limit }));
        }
        if let Some(Document::Object(mut project)) = self.project(meta, query.project.as_deref())? {
            for key in populated {
                project.insert(key.into(), json!(1));
            }
            pipeline.push(json!({ "$project": project }));
        }
        Ok(pipeline)
    }
}

fn regex_escaped(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if "\\.^$|?*+()[]{}".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
