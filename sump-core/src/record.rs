use crate::Value;
use rust_decimal::Decimal;
use time::{Date, PrimitiveDateTime};
use uuid::Uuid;

/// A single slot of a [`Record`]: either a scalar column value, a nested
/// record (`11`/`m1` payloads and populated to-one results) or a list of
/// records (`1m`/`mm` payloads and populated to-many results).
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Value(Value),
    One(Record),
    Many(Vec<Record>),
}

impl Entry {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Entry::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Entry::One(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_many(&self) -> Option<&[Record]> {
        match self {
            Entry::Many(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! entry_from_value {
    ($($type:ty),+ $(,)?) => {$(
        impl From<$type> for Entry {
            fn from(value: $type) -> Self {
                Entry::Value(value.into())
            }
        }
    )+};
}
entry_from_value!(
    Value,
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    f32,
    f64,
    Decimal,
    &str,
    String,
    Date,
    PrimitiveDateTime,
    Uuid,
);

impl From<Record> for Entry {
    fn from(value: Record) -> Self {
        Entry::One(value)
    }
}

impl From<Vec<Record>> for Entry {
    fn from(value: Vec<Record>) -> Self {
        Entry::Many(value)
    }
}

/// An entity instance as an ordered field-name to value mapping.
///
/// Records are validated against an [`EntityMeta`](crate::EntityMeta) at the
/// persistence boundary: undeclared keys are dropped from writes, declared
/// relation keys trigger cascades, everything else is a column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Entry)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, key: impl Into<String>, entry: impl Into<Entry>) -> Self {
        self.set(key, entry);
        self
    }

    /// Sets `key`, replacing any previous entry in place to preserve order.
    pub fn set(&mut self, key: impl Into<String>, entry: impl Into<Entry>) {
        let key = key.into();
        let entry = entry.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = entry;
        } else {
            self.entries.push((key, entry));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    /// The scalar value at `key`, if the entry holds one.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.get(key).and_then(Entry::as_value)
    }

    pub fn take(&mut self, key: &str) -> Option<Entry> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Record {
    type Item = (String, Entry);
    type IntoIter = std::vec::IntoIter<(String, Entry)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, E: Into<Entry>> FromIterator<(K, E)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, E)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (key, entry) in iter {
            record.set(key, entry);
        }
        record
    }
}
