use crate::{Cardinality, EntityMeta, Error, Result};
use std::collections::HashMap;

/// The process-wide registry of entity metadata.
///
/// Built once at startup through [`Schema::builder`], validated, then shared
/// read-only (typically behind an `Arc`) by every querier. Lookups by entity
/// name are the only way queriers and dialect compilers reach metadata.
#[derive(Debug, Default)]
pub struct Schema {
    entities: HashMap<&'static str, EntityMeta>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn get(&self, entity: &str) -> Option<&EntityMeta> {
        self.entities.get(entity)
    }

    pub fn meta(&self, entity: &str) -> Result<&EntityMeta> {
        self.entities
            .get(entity)
            .ok_or_else(|| Error::msg(format!("Entity `{}` is not registered in the schema", entity)))
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    entities: Vec<EntityMeta>,
}

impl SchemaBuilder {
    pub fn entity(mut self, meta: EntityMeta) -> Self {
        self.entities.push(meta);
        self
    }

    /// Validates the metadata invariants and freezes the registry.
    pub fn build(self) -> Result<Schema> {
        let names: Vec<&'static str> = self.entities.iter().map(|m| m.name).collect();
        let mut entities = HashMap::with_capacity(self.entities.len());
        for mut meta in self.entities {
            let name = meta.name;
            let mut ids = meta.fields.iter().filter(|f| f.is_id);
            meta.id = match (ids.next(), ids.next()) {
                (Some(id), None) => id.key,
                (None, _) => {
                    return Err(Error::msg(format!(
                        "Entity `{}` must declare exactly one id field",
                        name
                    )));
                }
                (Some(_), Some(_)) => {
                    return Err(Error::msg(format!(
                        "Entity `{}` declares more than one id field",
                        name
                    )));
                }
            };
            for relation in &meta.relations {
                if meta.fields.iter().any(|f| f.key == relation.key) {
                    return Err(Error::msg(format!(
                        "`{}.{}` is declared both as a field and as a relation",
                        name, relation.key
                    )));
                }
                if !names.contains(&relation.target) {
                    return Err(Error::msg(format!(
                        "`{}.{}` targets the unregistered entity `{}`",
                        name, relation.key, relation.target
                    )));
                }
                let many_to_many = relation.cardinality == Cardinality::ManyToMany;
                match relation.through {
                    Some(through) if !many_to_many => {
                        return Err(Error::msg(format!(
                            "`{}.{}` is not many-to-many and cannot go through `{}`",
                            name, relation.key, through
                        )));
                    }
                    Some(through) if !names.contains(&through) => {
                        return Err(Error::msg(format!(
                            "`{}.{}` goes through the unregistered entity `{}`",
                            name, relation.key, through
                        )));
                    }
                    None if many_to_many => {
                        return Err(Error::msg(format!(
                            "`{}.{}` is many-to-many and must declare a join entity",
                            name, relation.key
                        )));
                    }
                    _ => {}
                }
                let required = if many_to_many { 2 } else { 1 };
                if relation.references.len() < required {
                    return Err(Error::msg(format!(
                        "`{}.{}` must declare {} reference(s)",
                        name, relation.key, required
                    )));
                }
                if relation.mapped_by && relation.cardinality == Cardinality::ManyToOne {
                    return Err(Error::msg(format!(
                        "`{}.{}`: mapped_by only applies to the non-owning side of a relation",
                        name, relation.key
                    )));
                }
            }
            if let Some(key) = meta.soft_delete {
                let field = meta.fields.iter().find(|f| f.key == key);
                match field {
                    None => {
                        return Err(Error::msg(format!(
                            "Entity `{}` marks the undeclared field `{}` as soft-delete",
                            name, key
                        )));
                    }
                    Some(field) if field.on_delete.is_none() => {
                        return Err(Error::msg(format!(
                            "`{}.{}` is the soft-delete field and needs an on_delete callback",
                            name, key
                        )));
                    }
                    _ => {}
                }
            }
            if entities.insert(name, meta).is_some() {
                return Err(Error::msg(format!("Entity `{}` is registered twice", name)));
            }
        }
        Ok(Schema { entities })
    }
}
