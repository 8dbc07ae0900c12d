use sump_core::{Entry, Record, Value, map_rows};

#[test]
fn set_replaces_in_place_and_preserves_order() {
    let mut record = Record::new().with("a", 1).with("b", 2).with("c", 3);
    record.set("b", 20);
    assert_eq!(record.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    assert_eq!(record.value("b"), Some(&Value::Int(20)));
}

#[test]
fn value_only_reads_scalar_entries() {
    let record = Record::new()
        .with("id", 1)
        .with("profile", Record::new().with("bio", "hi"));
    assert_eq!(record.value("id"), Some(&Value::Int(1)));
    assert!(record.value("profile").is_none());
    assert!(record.get("profile").unwrap().as_one().is_some());
}

#[test]
fn take_removes_the_entry() {
    let mut record = Record::new().with("a", 1).with("b", 2);
    assert!(matches!(record.take("a"), Some(Entry::Value(Value::Int(1)))));
    assert!(!record.contains_key("a"));
    assert!(record.take("a").is_none());
}

#[test]
fn map_rows_nests_dotted_aliases() {
    let rows = vec![
        Record::new()
            .with("id", 1)
            .with("profile.id", 5)
            .with("profile.bio", "hi")
            .with("profile.address.id", 9),
    ];
    let mapped = map_rows(rows);
    let profile = mapped[0].get("profile").unwrap().as_one().unwrap();
    assert_eq!(profile.value("id"), Some(&Value::Int(5)));
    let address = profile.get("address").unwrap().as_one().unwrap();
    assert_eq!(address.value("id"), Some(&Value::Int(9)));
}

#[test]
fn map_rows_drops_all_null_joins() {
    let rows = vec![
        Record::new()
            .with("id", 1)
            .with("profile.id", Value::Null)
            .with("profile.bio", Value::Null),
    ];
    let mapped = map_rows(rows);
    assert_eq!(mapped[0].value("id"), Some(&Value::Int(1)));
    assert!(mapped[0].get("profile").is_none());
}
