use crate::{Entry, Record, Value};

/// Nests flat result rows by their dotted join aliases.
///
/// A row `{id, name, "profile.id", "profile.bio"}` becomes
/// `{id, name, profile: {id, bio}}`. A joined record whose columns are all
/// NULL is an unmatched LEFT JOIN and is dropped from its parent.
pub fn map_rows(rows: Vec<Record>) -> Vec<Record> {
    rows.into_iter().map(nest_row).collect()
}

fn nest_row(row: Record) -> Record {
    let mut root = Record::new();
    let mut groups: Vec<(String, Record)> = Vec::new();
    for (key, entry) in row {
        match key.split_once('.') {
            None => root.set(key, entry),
            Some((head, rest)) => {
                let rest = rest.to_owned();
                match groups.iter_mut().find(|(k, _)| k == head) {
                    Some((_, group)) => group.set(rest, entry),
                    None => groups.push((head.to_owned(), Record::new().with(rest, entry))),
                }
            }
        }
    }
    for (head, group) in groups {
        let nested = nest_row(group);
        if !all_null(&nested) {
            root.set(head, Entry::One(nested));
        }
    }
    root
}

fn all_null(record: &Record) -> bool {
    record.iter().all(|(_, entry)| match entry {
        Entry::Value(value) => value.is_null(),
        Entry::One(record) => all_null(record),
        Entry::Many(records) => records.iter().all(all_null),
    })
}
