#![allow(dead_code)]

use serde_json::Value as Document;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use sump::{
    Cascade, DocumentConnection, EntityMeta, FieldDef, FindCommand, Record, RelationDef, Result,
    Schema, SqlConnection, Value, WriteResult,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// User ⇆ Profile (11, FK on Profile), User → Item (1m), Item ⇆ Tag (mm
/// through ItemTag), plus a soft-deleting Post.
pub fn schema() -> Arc<Schema> {
    let schema = Schema::builder()
        .entity(
            EntityMeta::new("User")
                .field(FieldDef::id("id"))
                .field(FieldDef::new("name"))
                .field(FieldDef::new("email"))
                .field(FieldDef::new("created_at").on_insert(|| Value::Int(1_700_000_000)))
                .field(FieldDef::new("updated_at").on_update(|| Value::Int(1_700_000_001)))
                .relation(
                    RelationDef::one_to_one("profile", "Profile")
                        .reference("id", "user_id")
                        .cascade(Cascade::All)
                        .mapped_by(),
                )
                .relation(
                    RelationDef::one_to_many("items", "Item")
                        .reference("owner_id", "id")
                        .cascade(Cascade::All),
                ),
        )
        .entity(
            EntityMeta::new("Profile")
                .field(FieldDef::id("id"))
                .field(FieldDef::new("user_id"))
                .field(FieldDef::new("bio")),
        )
        .entity(
            EntityMeta::new("Item")
                .field(FieldDef::id("id"))
                .field(FieldDef::new("owner_id"))
                .field(FieldDef::new("name"))
                .relation(
                    RelationDef::many_to_one("owner", "User")
                        .reference("owner_id", "id")
                        .cascade(Cascade::Persist),
                )
                .relation(
                    RelationDef::many_to_many("tags", "Tag", "ItemTag")
                        .reference("item_id", "id")
                        .reference("tag_id", "id")
                        .cascade(Cascade::All),
                ),
        )
        .entity(
            EntityMeta::new("Tag")
                .field(FieldDef::id("id"))
                .field(FieldDef::new("name")),
        )
        .entity(
            EntityMeta::new("ItemTag")
                .field(FieldDef::id("id"))
                .field(FieldDef::new("item_id"))
                .field(FieldDef::new("tag_id"))
                .relation(RelationDef::many_to_one("item", "Item").reference("item_id", "id"))
                .relation(RelationDef::many_to_one("tag", "Tag").reference("tag_id", "id")),
        )
        .entity(
            EntityMeta::new("Post")
                .field(FieldDef::id("id"))
                .field(FieldDef::new("title"))
                .field(FieldDef::new("deleted_at").on_delete(|| Value::Int(1_700_000_002)))
                .soft_delete("deleted_at"),
        )
        .build()
        .expect("The fixture schema is valid");
    Arc::new(schema)
}

/// Shared handle on the statements a mock connection executed.
pub type StatementLog = Arc<Mutex<Vec<String>>>;

/// Scripted relational connection: row queries pop `rows`, writes pop
/// `writes`, anything unscripted succeeds empty. Every statement lands in
/// the log in execution order.
pub struct MockSqlConnection {
    pub log: StatementLog,
    pub rows: VecDeque<Vec<Record>>,
    pub writes: VecDeque<WriteResult>,
}

impl MockSqlConnection {
    pub fn new() -> (Self, StatementLog) {
        let log = StatementLog::default();
        let conn = Self {
            log: log.clone(),
            rows: VecDeque::new(),
            writes: VecDeque::new(),
        };
        (conn, log)
    }

    pub fn queue_rows(&mut self, rows: Vec<Record>) {
        self.rows.push_back(rows);
    }

    pub fn queue_write(&mut self, affected: u64, first_insert_id: Option<i64>) {
        self.writes.push_back(WriteResult {
            affected,
            first_insert_id,
        });
    }
}

impl SqlConnection for MockSqlConnection {
    async fn all(&mut self, sql: &str) -> Result<Vec<Record>> {
        self.log.lock().unwrap().push(sql.to_owned());
        Ok(self.rows.pop_front().unwrap_or_default())
    }

    async fn run(&mut self, sql: &str) -> Result<WriteResult> {
        self.log.lock().unwrap().push(sql.to_owned());
        Ok(self.writes.pop_front().unwrap_or_default())
    }

    async fn release(&mut self) -> Result<()> {
        self.log.lock().unwrap().push("<release>".to_owned());
        Ok(())
    }
}

/// Scripted document connection, mirroring the SQL mock: reads pop `finds`,
/// inserted-id batches pop `inserted`, write counts pop `counts`.
pub struct MockDocumentConnection {
    pub log: StatementLog,
    pub finds: VecDeque<Vec<Document>>,
    pub inserted: VecDeque<Vec<Document>>,
    pub counts: VecDeque<u64>,
}

impl MockDocumentConnection {
    pub fn new() -> (Self, StatementLog) {
        let log = StatementLog::default();
        let conn = Self {
            log: log.clone(),
            finds: VecDeque::new(),
            inserted: VecDeque::new(),
            counts: VecDeque::new(),
        };
        (conn, log)
    }
}

impl DocumentConnection for MockDocumentConnection {
    async fn find(&mut self, collection: &str, command: FindCommand) -> Result<Vec<Document>> {
        self.log.lock().unwrap().push(format!(
            "find {} {}",
            collection,
            command.filter.unwrap_or_default()
        ));
        Ok(self.finds.pop_front().unwrap_or_default())
    }

    async fn aggregate(
        &mut self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>> {
        self.log.lock().unwrap().push(format!(
            "aggregate {} {}",
            collection,
            Document::Array(pipeline)
        ));
        Ok(self.finds.pop_front().unwrap_or_default())
    }

    async fn insert_many(
        &mut self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Document>> {
        self.log.lock().unwrap().push(format!(
            "insert {} {}",
            collection,
            Document::Array(documents.clone())
        ));
        Ok(self
            .inserted
            .pop_front()
            .unwrap_or_else(|| (0..documents.len() as i64).map(Document::from).collect()))
    }

    async fn update_many(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64> {
        self.log
            .lock()
            .unwrap()
            .push(format!("update {} {} {}", collection, filter, update));
        Ok(self.counts.pop_front().unwrap_or_default())
    }

    async fn delete_many(&mut self, collection: &str, filter: Document) -> Result<u64> {
        self.log
            .lock()
            .unwrap()
            .push(format!("delete {} {}", collection, filter));
        Ok(self.counts.pop_front().unwrap_or_default())
    }

    async fn count(&mut self, collection: &str, filter: Document) -> Result<u64> {
        self.log
            .lock()
            .unwrap()
            .push(format!("count {} {}", collection, filter));
        Ok(self.counts.pop_front().unwrap_or_default())
    }

    async fn begin_session(&mut self) -> Result<()> {
        self.log.lock().unwrap().push("<begin>".to_owned());
        Ok(())
    }

    async fn commit_session(&mut self) -> Result<()> {
        self.log.lock().unwrap().push("<commit>".to_owned());
        Ok(())
    }

    async fn abort_session(&mut self) -> Result<()> {
        self.log.lock().unwrap().push("<abort>".to_owned());
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        self.log.lock().unwrap().push("<release>".to_owned());
        Ok(())
    }
}
