mod common;

use common::schema;
use sump::{
    Compare, Filter, GenericSqlDialect, MySqlDialect, PostgresDialect, Query, QueryOptions, Record,
    SqlDialect, SqliteDialect, Value, fill_on_insert, fill_on_update,
};

const DIALECT: GenericSqlDialect = GenericSqlDialect::new();

#[test]
fn insert_multi_row() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let mut payload = vec![
        Record::new().with("name", "a").with("email", "a@x"),
        Record::new().with("name", "b").with("email", "b@x"),
    ];
    fill_on_insert(meta, &mut payload);
    let sql = DIALECT.insert(meta, &payload).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO \"User\" (\"name\", \"email\", \"created_at\") \
         VALUES ('a', 'a@x', 1700000000), ('b', 'b@x', 1700000000)"
    );
}

#[test]
fn insert_keeps_supplied_callback_fields() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let mut payload = vec![Record::new().with("name", "a").with("created_at", 5)];
    fill_on_insert(meta, &mut payload);
    let sql = DIALECT.insert(meta, &payload).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO \"User\" (\"name\", \"created_at\") VALUES ('a', 5)"
    );
}

#[test]
fn insert_rejects_diverging_row_shapes() {
    let schema = schema();
    let meta = schema.meta("Tag").unwrap();
    let payload = vec![
        Record::new().with("name", "a"),
        Record::new().with("id", 1).with("name", "b"),
    ];
    let error = DIALECT.insert(meta, &payload).unwrap_err();
    assert!(error.to_string().contains("diverging field sets"));
}

#[test]
fn insert_drops_undeclared_keys() {
    let schema = schema();
    let meta = schema.meta("Tag").unwrap();
    let payload = vec![Record::new().with("name", "a").with("nickname", "ignored")];
    let sql = DIALECT.insert(meta, &payload).unwrap();
    assert_eq!(sql, "INSERT INTO \"Tag\" (\"name\") VALUES ('a')");
}

#[test]
fn update_runs_callbacks_and_filter() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let mut payload = Record::new().with("name", "c");
    fill_on_update(meta, std::slice::from_mut(&mut payload));
    let sql = DIALECT
        .update(
            &schema,
            meta,
            Some(&Filter::eq("id", 1)),
            &payload,
            QueryOptions::default(),
        )
        .unwrap();
    assert_eq!(
        sql,
        "UPDATE \"User\" SET \"name\" = 'c', \"updated_at\" = 1700000001 WHERE \"id\" = 1"
    );
}

#[test]
fn find_defaults_to_all_declared_fields() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let query = Query::new().filter(Filter::eq("name", "a")).limit(10);
    let sql = DIALECT
        .find(&schema, meta, &query, QueryOptions::default())
        .unwrap();
    assert_eq!(
        sql,
        "SELECT \"id\", \"name\", \"email\", \"created_at\", \"updated_at\" \
         FROM \"User\" WHERE \"name\" = 'a' LIMIT 10"
    );
}

#[test]
fn find_joins_populated_to_one_relations() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let query = Query::new().populate("profile", Query::new());
    let sql = DIALECT
        .find(&schema, meta, &query, QueryOptions::default())
        .unwrap();
    assert_eq!(
        sql,
        "SELECT \"User\".\"id\", \"User\".\"name\", \"User\".\"email\", \
         \"User\".\"created_at\", \"User\".\"updated_at\", \
         \"profile\".\"id\" \"profile.id\", \"profile\".\"user_id\" \"profile.user_id\", \
         \"profile\".\"bio\" \"profile.bio\" \
         FROM \"User\" LEFT JOIN \"Profile\" \"profile\" ON \"profile\".\"user_id\" = \"User\".\"id\""
    );
}

#[test]
fn find_aliases_nested_populates_by_dotted_path() {
    let schema = schema();
    let meta = schema.meta("Item").unwrap();
    let query = Query::new().populate(
        "owner",
        Query::new()
            .project(["id", "name"])
            .populate("profile", Query::new().project(["id", "bio"])),
    );
    let sql = DIALECT
        .find(&schema, meta, &query, QueryOptions::default())
        .unwrap();
    assert_eq!(
        sql,
        "SELECT \"Item\".\"id\", \"Item\".\"owner_id\", \"Item\".\"name\", \
         \"owner\".\"id\" \"owner.id\", \"owner\".\"name\" \"owner.name\", \
         \"owner.profile\".\"id\" \"owner.profile.id\", \"owner.profile\".\"bio\" \"owner.profile.bio\" \
         FROM \"Item\" \
         LEFT JOIN \"User\" \"owner\" ON \"owner\".\"id\" = \"Item\".\"owner_id\" \
         LEFT JOIN \"Profile\" \"owner.profile\" ON \"owner.profile\".\"user_id\" = \"owner\".\"id\""
    );
}

#[test]
fn find_requires_declared_relations() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let query = Query::new().populate("followers", Query::new());
    let error = DIALECT
        .find(&schema, meta, &query, QueryOptions::default())
        .unwrap_err();
    assert!(
        error
            .to_string()
            .contains("`User.followers` is not a declared relation")
    );
}

#[test]
fn find_requires_declared_fields() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let query = Query::new().filter(Filter::eq("age", 1));
    let error = DIALECT
        .find(&schema, meta, &query, QueryOptions::default())
        .unwrap_err();
    assert!(error.to_string().contains("Unknown field `User.age`"));
}

#[test]
fn comparison_operators() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let cases: Vec<(Filter, &str)> = vec![
        (Filter::eq("email", Value::Null), "\"email\" IS NULL"),
        (Filter::ne("email", Value::Null), "\"email\" IS NOT NULL"),
        (Filter::ne("name", "a"), "\"name\" <> 'a'"),
        (Filter::gt("created_at", 5), "\"created_at\" > 5"),
        (Filter::gte("created_at", 5), "\"created_at\" >= 5"),
        (Filter::lt("created_at", 5), "\"created_at\" < 5"),
        (Filter::lte("created_at", 5), "\"created_at\" <= 5"),
        (
            Filter::is_in("id", [Value::Int(1), Value::Int(2)]),
            "\"id\" IN (1, 2)",
        ),
        (
            Filter::not_in("id", [Value::Int(3)]),
            "\"id\" NOT IN (3)",
        ),
        (
            Filter::starts_with("name", "An"),
            "LOWER(\"name\") LIKE 'an%'",
        ),
        (Filter::regex("name", "^a+$"), "\"name\" REGEXP '^a+$'"),
        (
            Filter::cmp(
                "created_at",
                [Compare::Gte(Value::Int(1)), Compare::Lte(Value::Int(9))],
            ),
            "(\"created_at\" >= 1 AND \"created_at\" <= 9)",
        ),
    ];
    for (filter, expected) in cases {
        let query = Query::new().filter(filter);
        let sql = DIALECT
            .find(&schema, meta, &query, QueryOptions::default())
            .unwrap();
        let where_clause = sql.split_once(" WHERE ").unwrap().1;
        assert_eq!(where_clause, expected);
    }
}

#[test]
fn lone_top_level_or_stays_unparenthesized() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let query = Query::new().filter(Filter::any([
        Filter::gt("created_at", 18),
        Filter::eq("name", "x"),
    ]));
    let sql = DIALECT
        .find(&schema, meta, &query, QueryOptions::default())
        .unwrap();
    assert!(sql.ends_with("WHERE \"created_at\" > 18 OR \"name\" = 'x'"));
}

#[test]
fn nested_or_is_parenthesized_next_to_siblings() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let query = Query::new().filter(Filter::all([
        Filter::any([Filter::gt("created_at", 18), Filter::eq("name", "x")]),
        Filter::eq("email", "e"),
    ]));
    let sql = DIALECT
        .find(&schema, meta, &query, QueryOptions::default())
        .unwrap();
    assert!(
        sql.ends_with("WHERE (\"created_at\" > 18 OR \"name\" = 'x') AND \"email\" = 'e'")
    );
}

#[test]
fn pager_emits_offset_only_with_limit_and_skip() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let limit_only = DIALECT
        .find(
            &schema,
            meta,
            &Query::new().limit(10),
            QueryOptions::default(),
        )
        .unwrap();
    assert!(limit_only.ends_with("FROM \"User\" LIMIT 10"));
    let zero_skip = DIALECT
        .find(
            &schema,
            meta,
            &Query::new().limit(10).skip(0),
            QueryOptions::default(),
        )
        .unwrap();
    assert!(zero_skip.ends_with("LIMIT 10 OFFSET 0"));
    let skip_only = DIALECT
        .find(
            &schema,
            meta,
            &Query::new().skip(5),
            QueryOptions::default(),
        )
        .unwrap();
    assert!(skip_only.ends_with("FROM \"User\""));
}

#[test]
fn sort_descends_on_marker() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let query = Query::new().sort("name").sort_desc("created_at");
    let sql = DIALECT
        .find(&schema, meta, &query, QueryOptions::default())
        .unwrap();
    assert!(sql.ends_with("ORDER BY \"name\", \"created_at\" DESC"));
}

#[test]
fn count_uses_the_trusted_projection() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let sql = DIALECT
        .count(
            &schema,
            meta,
            Some(&Filter::eq("name", "a")),
            QueryOptions::default(),
        )
        .unwrap();
    assert_eq!(
        sql,
        "SELECT COUNT(*) \"count\" FROM \"User\" WHERE \"name\" = 'a'"
    );
}

#[test]
fn soft_delete_compiles_to_an_update() {
    let schema = schema();
    let meta = schema.meta("Post").unwrap();
    let sql = DIALECT
        .delete(
            &schema,
            meta,
            Some(&Filter::eq("id", 1)),
            QueryOptions::default(),
        )
        .unwrap();
    assert_eq!(
        sql,
        "UPDATE \"Post\" SET \"deleted_at\" = 1700000002 \
         WHERE \"id\" = 1 AND \"deleted_at\" IS NULL"
    );
}

#[test]
fn soft_delete_guards_reads() {
    let schema = schema();
    let meta = schema.meta("Post").unwrap();
    let sql = DIALECT
        .find(&schema, meta, &Query::new(), QueryOptions::default())
        .unwrap();
    assert!(sql.ends_with("FROM \"Post\" WHERE \"deleted_at\" IS NULL"));
    let with_deleted = DIALECT
        .find(
            &schema,
            meta,
            &Query::new(),
            QueryOptions {
                with_deleted: true,
                ..QueryOptions::default()
            },
        )
        .unwrap();
    assert!(with_deleted.ends_with("FROM \"Post\""));
}

#[test]
fn hard_delete_bypasses_soft_delete() {
    let schema = schema();
    let meta = schema.meta("Post").unwrap();
    let sql = DIALECT
        .delete(
            &schema,
            meta,
            Some(&Filter::eq("id", 1)),
            QueryOptions {
                hard_delete: true,
                with_deleted: true,
                ..QueryOptions::default()
            },
        )
        .unwrap();
    assert_eq!(sql, "DELETE FROM \"Post\" WHERE \"id\" = 1");
}

#[test]
fn identifiers_and_strings_are_escaped() {
    let schema = schema();
    let meta = schema.meta("Tag").unwrap();
    let payload = vec![Record::new().with("name", "o'brien")];
    let sql = DIALECT.insert(meta, &payload).unwrap();
    assert_eq!(sql, "INSERT INTO \"Tag\" (\"name\") VALUES ('o''brien')");
}

#[test]
fn dialect_overrides() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    assert_eq!(SqliteDialect::new().begin_transaction_command(), "BEGIN TRANSACTION");
    assert_eq!(MySqlDialect::new().begin_transaction_command(), "START TRANSACTION");
    assert_eq!(GenericSqlDialect::new().begin_transaction_command(), "BEGIN");

    let postgres = PostgresDialect::new();
    let starts = postgres
        .find(
            &schema,
            meta,
            &Query::new().filter(Filter::starts_with("name", "An")),
            QueryOptions::default(),
        )
        .unwrap();
    assert!(starts.ends_with("WHERE \"name\" ILIKE 'An%'"));
    let regex = postgres
        .find(
            &schema,
            meta,
            &Query::new().filter(Filter::regex("name", "^a")),
            QueryOptions::default(),
        )
        .unwrap();
    assert!(regex.ends_with("WHERE \"name\" ~ '^a'"));

    let mysql = MySqlDialect::new();
    let payload = vec![Record::new().with("name", "x")];
    let insert = mysql.insert(schema.meta("Tag").unwrap(), &payload).unwrap();
    assert_eq!(insert, "INSERT INTO `Tag` (`name`) VALUES ('x')");
}

#[test]
fn filter_reaches_through_joined_relations() {
    let schema = schema();
    let meta = schema.meta("User").unwrap();
    let query = Query::new()
        .populate("profile", Query::new())
        .filter(Filter::eq("profile.bio", "hi"));
    let sql = DIALECT
        .find(&schema, meta, &query, QueryOptions::default())
        .unwrap();
    assert!(sql.contains("WHERE \"profile\".\"bio\" = 'hi'"));
}
