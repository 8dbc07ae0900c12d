use crate::SqlDialect;

pub struct PostgresDialect;

impl PostgresDialect {
    pub const fn new() -> Self {
        Self {}
    }
}

impl SqlDialect for PostgresDialect {
    /// `ILIKE` spares the `LOWER()` wrapping of the generic syntax.
    fn write_starts_with(&self, out: &mut String, column: &str, value: &str) {
        out.push_str(column);
        out.push_str(" ILIKE ");
        let mut pattern = value.to_owned();
        pattern.push('%');
        self.write_string(out, &pattern);
    }

    fn write_regex(&self, out: &mut String, column: &str, value: &str) {
        out.push_str(column);
        out.push_str(" ~ ");
        self.write_string(out, value);
    }
}
