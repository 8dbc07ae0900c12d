use crate::{Entry, Record, Value};

/// Fills a field at persistence time when the payload did not supply it.
pub type FieldCallback = fn() -> Value;

/// Static description of one persistable column of an entity.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub(crate) key: &'static str,
    pub(crate) column: &'static str,
    pub(crate) is_id: bool,
    pub(crate) on_insert: Option<FieldCallback>,
    pub(crate) on_update: Option<FieldCallback>,
    pub(crate) on_delete: Option<FieldCallback>,
}

impl FieldDef {
    pub const fn new(key: &'static str) -> Self {
        Self {
            key,
            column: key,
            is_id: false,
            on_insert: None,
            on_update: None,
            on_delete: None,
        }
    }

    /// The identifier field. Exactly one per entity.
    pub const fn id(key: &'static str) -> Self {
        let mut field = Self::new(key);
        field.is_id = true;
        field
    }

    /// Overrides the backing column name (defaults to the field key).
    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }

    pub fn on_insert(mut self, callback: FieldCallback) -> Self {
        self.on_insert = Some(callback);
        self
    }

    pub fn on_update(mut self, callback: FieldCallback) -> Self {
        self.on_update = Some(callback);
        self
    }

    pub fn on_delete(mut self, callback: FieldCallback) -> Self {
        self.on_delete = Some(callback);
        self
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn column_name(&self) -> &'static str {
        self.column
    }

    pub fn is_id(&self) -> bool {
        self.is_id
    }
}

/// Shape of a relation between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

/// Which parent writes propagate to the related rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cascade {
    Persist,
    Delete,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeAction {
    Persist,
    Delete,
}

impl Cascade {
    pub fn allows(self, action: CascadeAction) -> bool {
        match self {
            Cascade::All => true,
            Cascade::Persist => action == CascadeAction::Persist,
            Cascade::Delete => action == CascadeAction::Delete,
        }
    }
}

/// A foreign-key column pair. Orientation depends on the cardinality:
///
/// - `m1`: `source` is the FK field on this entity, `target` the id of the
///   related entity;
/// - `11`: `source` is the id of this entity, `target` the FK on the related
///   entity pointing back at it;
/// - `1m`: `source` is the FK field on the child, `target` the id of this
///   entity;
/// - `mm`: the first reference's `source` is the parent-side column on the
///   join entity, the second reference's `source` the target-side column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub source: &'static str,
    pub target: &'static str,
}

/// Static description of one relation of an entity.
#[derive(Debug, Clone)]
pub struct RelationDef {
    pub(crate) key: &'static str,
    pub(crate) target: &'static str,
    pub(crate) cardinality: Cardinality,
    pub(crate) cascade: Option<Cascade>,
    pub(crate) references: Vec<Reference>,
    pub(crate) through: Option<&'static str>,
    pub(crate) mapped_by: bool,
}

impl RelationDef {
    fn new(key: &'static str, target: &'static str, cardinality: Cardinality) -> Self {
        Self {
            key,
            target,
            cardinality,
            cascade: None,
            references: Vec::new(),
            through: None,
            mapped_by: false,
        }
    }

    pub fn one_to_one(key: &'static str, target: &'static str) -> Self {
        Self::new(key, target, Cardinality::OneToOne)
    }

    pub fn many_to_one(key: &'static str, target: &'static str) -> Self {
        Self::new(key, target, Cardinality::ManyToOne)
    }

    pub fn one_to_many(key: &'static str, target: &'static str) -> Self {
        Self::new(key, target, Cardinality::OneToMany)
    }

    pub fn many_to_many(key: &'static str, target: &'static str, through: &'static str) -> Self {
        let mut relation = Self::new(key, target, Cardinality::ManyToMany);
        relation.through = Some(through);
        relation
    }

    pub fn reference(mut self, source: &'static str, target: &'static str) -> Self {
        self.references.push(Reference { source, target });
        self
    }

    pub fn cascade(mut self, cascade: Cascade) -> Self {
        self.cascade = Some(cascade);
        self
    }

    /// Marks the non-owning side of a `11`/`1m` relation, or the inverse
    /// side of an `mm` relation.
    pub fn mapped_by(mut self) -> Self {
        self.mapped_by = true;
        self
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn through(&self) -> Option<&'static str> {
        self.through
    }
}

/// Immutable description of an entity type: identifier, column list and
/// relation list. Built once, registered in a [`Schema`](crate::Schema) and
/// never mutated afterward.
#[derive(Debug, Clone)]
pub struct EntityMeta {
    pub(crate) name: &'static str,
    pub(crate) id: &'static str,
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) relations: Vec<RelationDef>,
    pub(crate) soft_delete: Option<&'static str>,
}

impl EntityMeta {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            id: "",
            fields: Vec::new(),
            relations: Vec::new(),
            soft_delete: None,
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Declares `key` as the soft-delete marker: deletes become updates
    /// setting it through its `on_delete` callback, and reads filter out
    /// rows where it is not NULL.
    pub fn soft_delete(mut self, key: &'static str) -> Self {
        self.soft_delete = Some(key);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Key of the identifier field. Set when the meta is registered.
    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field_def(&self, key: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    pub fn relation_def(&self, key: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.key == key)
    }

    pub fn soft_delete_key(&self) -> Option<&'static str> {
        self.soft_delete
    }
}

/// Keys of `record` that are eligible to be written to storage: declared as
/// fields of `meta`, present, and carrying a scalar value.
pub fn persistable_keys(meta: &EntityMeta, record: &Record) -> Vec<&'static str> {
    record
        .iter()
        .filter(|(_, entry)| matches!(entry, Entry::Value(..)))
        .filter_map(|(key, _)| meta.field_def(key).map(FieldDef::key))
        .collect()
}

/// Relation keys of `record` whose cascade policy permits `action`.
pub fn persistable_relation_keys(
    meta: &EntityMeta,
    record: &Record,
    action: CascadeAction,
) -> Vec<&'static str> {
    record
        .keys()
        .filter_map(|key| meta.relation_def(key))
        .filter(|rel| rel.cascade.is_some_and(|c| c.allows(action)))
        .map(RelationDef::key)
        .collect()
}

pub fn fill_on_insert(meta: &EntityMeta, records: &mut [Record]) {
    fill_callbacks(meta, records, |field| field.on_insert);
}

pub fn fill_on_update(meta: &EntityMeta, records: &mut [Record]) {
    fill_callbacks(meta, records, |field| field.on_update);
}

fn fill_callbacks(
    meta: &EntityMeta,
    records: &mut [Record],
    callback: impl Fn(&FieldDef) -> Option<FieldCallback>,
) {
    for field in &meta.fields {
        let Some(callback) = callback(field) else {
            continue;
        };
        for record in records.iter_mut() {
            if !record.contains_key(field.key) {
                record.set(field.key, callback());
            }
        }
    }
}
