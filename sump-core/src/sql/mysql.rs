use crate::SqlDialect;

pub struct MySqlDialect;

impl MySqlDialect {
    pub const fn new() -> Self {
        Self {}
    }
}

impl SqlDialect for MySqlDialect {
    fn begin_transaction_command(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn write_identifier(&self, out: &mut String, value: &str) {
        out.push('`');
        self.write_escaped(out, value, '`', "``");
        out.push('`');
    }
}
