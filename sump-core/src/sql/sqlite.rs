use crate::SqlDialect;

pub struct SqliteDialect;

impl SqliteDialect {
    pub const fn new() -> Self {
        Self {}
    }
}

impl SqlDialect for SqliteDialect {
    fn begin_transaction_command(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }
}
