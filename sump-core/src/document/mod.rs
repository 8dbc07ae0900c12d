mod dialect;
mod querier;

pub use dialect::*;
pub use querier::*;

use crate::{Entry, EntityMeta, Record, Schema, Value, persistable_keys};
use serde_json::{Map, Number, Value as Document};
use std::fmt::Write;

pub fn value_to_document(value: &Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(v) => Document::Bool(*v),
        Value::Int(v) => Document::Number((*v).into()),
        Value::Float(v) => Number::from_f64(*v).map_or(Document::Null, Document::Number),
        Value::Decimal(v) => Document::String(v.to_string()),
        Value::Text(v) => Document::String(v.clone()),
        Value::Bytes(v) => {
            let mut hex = String::with_capacity(v.len() * 2);
            for b in v {
                let _ = write!(hex, "{:02x}", b);
            }
            Document::String(hex)
        }
        Value::Date(v) => Document::String(v.to_string()),
        Value::Timestamp(v) => Document::String(v.to_string()),
        Value::Uuid(v) => Document::String(v.to_string()),
        Value::List(v) => Document::Array(v.iter().map(value_to_document).collect()),
    }
}

pub fn document_to_value(document: &Document) -> Value {
    match document {
        Document::Null => Value::Null,
        Document::Bool(v) => Value::Bool(*v),
        Document::Number(v) => match v.as_i64() {
            Some(int) => Value::Int(int),
            None => Value::Float(v.as_f64().unwrap_or(f64::NAN)),
        },
        Document::String(v) => Value::Text(v.clone()),
        Document::Array(v) => Value::List(v.iter().map(document_to_value).collect()),
        Document::Object(..) => Value::Null,
    }
}

/// The persistable subset of `record` as a document, with the id field
/// stored under `_id`.
pub fn record_to_document(meta: &EntityMeta, record: &Record) -> Document {
    let mut document = Map::new();
    for key in persistable_keys(meta, record) {
        let Some(value) = record.value(key) else {
            continue;
        };
        document.insert(document_key(meta, key), value_to_document(value));
    }
    Document::Object(document)
}

/// Maps a record back out of a document: `_id` lands in the declared id
/// field and populated relations recurse through their target entity.
pub fn document_to_record(schema: &Schema, meta: &EntityMeta, document: Document) -> Record {
    let Document::Object(document) = document else {
        return Record::new();
    };
    let mut record = Record::new();
    for (key, value) in document {
        let key = if key == "_id" {
            meta.id().to_owned()
        } else {
            meta.fields()
                .iter()
                .find(|f| f.column_name() == key)
                .map_or(key, |f| f.key().to_owned())
        };
        if let Some(relation) = meta.relation_def(&key) {
            if let Ok(rel_meta) = schema.meta(relation.target()) {
                match value {
                    Document::Object(..) => {
                        record.set(key, Entry::One(document_to_record(schema, rel_meta, value)));
                        continue;
                    }
                    Document::Array(items) => {
                        let records = items
                            .into_iter()
                            .map(|item| document_to_record(schema, rel_meta, item))
                            .collect::<Vec<_>>();
                        record.set(key, Entry::Many(records));
                        continue;
                    }
                    _ => {}
                }
            }
        }
        record.set(key, document_to_value(&value));
    }
    record
}

/// Document key of a declared field: the id maps to `_id`, everything else
/// to its column name.
pub(crate) fn document_key(meta: &EntityMeta, key: &str) -> String {
    if key == meta.id() {
        "_id".to_owned()
    } else {
        meta.field_def(key).map_or(key, |f| f.column_name()).to_owned()
    }
}
