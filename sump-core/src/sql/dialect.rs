use crate::{
    Cardinality, Compare, EntityMeta, Entry, Error, Filter, Query, QueryOptions, Record, Result,
    Schema, SortDirection, Value, persistable_keys, separated_by,
};
use std::fmt::Write;
use time::{Date, Time};

macro_rules! write_integer {
    ($out:ident, $value:expr) => {{
        let mut buffer = itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}
macro_rules! write_float {
    ($out:ident, $value:expr) => {{
        if $value.is_finite() {
            let mut buffer = ryu::Buffer::new();
            $out.push_str(buffer.format($value));
        } else {
            $out.push_str("NULL");
        }
    }};
}

/// Translates entity metadata and the structured query model into SQL text.
///
/// Pure and I/O free. The default methods produce a generic syntax; concrete
/// dialects override the points that differ per backend: identifier quoting,
/// the transaction opener, prefix and regular-expression matching.
///
/// Every identifier goes through [`write_identifier`](Self::write_identifier)
/// and every literal through [`write_value`](Self::write_value) before
/// landing in the statement.
pub trait SqlDialect: Send + Sync {
    fn begin_transaction_command(&self) -> &'static str {
        "BEGIN"
    }

    fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + c.len_utf8();
            }
        }
        out.push_str(&value[position..]);
    }

    fn write_identifier(&self, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(out, value, '"', r#""""#);
        out.push('"');
    }

    fn write_string(&self, out: &mut String, value: &str) {
        out.push('\'');
        self.write_escaped(out, value, '\'', "''");
        out.push('\'');
    }

    fn write_value(&self, out: &mut String, value: &Value) {
        let _ = match value {
            Value::Null => out.push_str("NULL"),
            Value::Bool(v) => out.push_str(["false", "true"][*v as usize]),
            Value::Int(v) => write_integer!(out, *v),
            Value::Float(v) => write_float!(out, *v),
            Value::Decimal(v) => drop(write!(out, "{}", v)),
            Value::Text(v) => self.write_string(out, v),
            Value::Bytes(v) => {
                out.push('\'');
                for b in v {
                    let _ = write!(out, "\\x{:02X}", b);
                }
                out.push('\'');
            }
            Value::Date(v) => {
                out.push('\'');
                self.write_value_date(out, v);
                out.push('\'');
            }
            Value::Timestamp(v) => {
                out.push('\'');
                self.write_value_date(out, &v.date());
                out.push('T');
                self.write_value_time(out, &v.time());
                out.push('\'');
            }
            Value::Uuid(v) => drop(write!(out, "'{}'", v)),
            Value::List(v) => {
                out.push('(');
                separated_by(out, v, |out, v| self.write_value(out, v), ", ");
                out.push(')');
            }
        };
    }

    fn write_value_date(&self, out: &mut String, value: &Date) {
        let _ = write!(
            out,
            "{:04}-{:02}-{:02}",
            value.year(),
            value.month() as u8,
            value.day()
        );
    }

    fn write_value_time(&self, out: &mut String, value: &Time) {
        let mut subsecond = value.nanosecond();
        let mut width = 9;
        while width > 1 && subsecond % 10 == 0 {
            subsecond /= 10;
            width -= 1;
        }
        let _ = write!(
            out,
            "{:02}:{:02}:{:02}.{:0width$}",
            value.hour(),
            value.minute(),
            value.second(),
            subsecond
        );
    }

    /// Builds one multi-row insert. Callback fields are expected to be
    /// filled already; every row must expose the same persistable field set.
    fn insert(&self, meta: &EntityMeta, payload: &[Record]) -> Result<String> {
        let Some(first) = payload.first() else {
            return Err(Error::msg(format!(
                "Nothing to insert into `{}`",
                meta.name()
            )));
        };
        let keys = persistable_keys(meta, first);
        if keys.is_empty() {
            return Err(Error::msg(format!(
                "Insert into `{}` carries no persistable field",
                meta.name()
            )));
        }
        for row in &payload[1..] {
            let row_keys = persistable_keys(meta, row);
            if row_keys.len() != keys.len() || row_keys.iter().any(|k| !keys.contains(k)) {
                return Err(Error::msg(format!(
                    "Insert rows for `{}` have diverging field sets",
                    meta.name()
                )));
            }
        }
        let mut out = String::with_capacity(128);
        out.push_str("INSERT INTO ");
        self.write_identifier(&mut out, meta.name());
        out.push_str(" (");
        separated_by(
            &mut out,
            &keys,
            |out, key| {
                let column = meta.field_def(key).map_or(*key, |f| f.column_name());
                self.write_identifier(out, column);
            },
            ", ",
        );
        out.push_str(") VALUES ");
        let mut result = Ok(());
        separated_by(
            &mut out,
            payload,
            |out, row| {
                out.push('(');
                separated_by(
                    out,
                    &keys,
                    |out, key| match row.get(key) {
                        Some(Entry::Value(v)) => self.write_value(out, v),
                        _ => {
                            result = Err(Error::msg(format!(
                                "`{}.{}` expects a scalar value",
                                meta.name(),
                                key
                            )));
                        }
                    },
                    ", ",
                );
                out.push(')');
            },
            ", ",
        );
        result?;
        Ok(out)
    }

    /// Builds an update from the persistable subset of `payload`. Callback
    /// fields are expected to be filled already.
    fn update(
        &self,
        schema: &Schema,
        meta: &EntityMeta,
        filter: Option<&Filter>,
        payload: &Record,
        opts: QueryOptions,
    ) -> Result<String> {
        let keys = persistable_keys(meta, payload);
        if keys.is_empty() {
            return Err(Error::msg(format!(
                "Update of `{}` carries no persistable field",
                meta.name()
            )));
        }
        let mut out = String::with_capacity(128);
        out.push_str("UPDATE ");
        self.write_identifier(&mut out, meta.name());
        out.push_str(" SET ");
        let mut result = Ok(());
        separated_by(
            &mut out,
            &keys,
            |out, key| {
                let column = meta.field_def(key).map_or(*key, |f| f.column_name());
                self.write_identifier(out, column);
                out.push_str(" = ");
                match payload.get(key) {
                    Some(Entry::Value(v)) => self.write_value(out, v),
                    _ => {
                        result = Err(Error::msg(format!(
                            "`{}.{}` expects a scalar value",
                            meta.name(),
                            key
                        )));
                    }
                }
            },
            ", ",
        );
        result?;
        self.write_where(&mut out, schema, meta, filter, None, opts)?;
        Ok(out)
    }

    /// Builds a delete, or an update marking the soft-delete field when the
    /// entity declares one and the caller did not force a hard delete.
    fn delete(
        &self,
        schema: &Schema,
        meta: &EntityMeta,
        filter: Option<&Filter>,
        opts: QueryOptions,
    ) -> Result<String> {
        if !opts.hard_delete {
            if let Some(key) = meta.soft_delete_key() {
                let field = meta.field_def(key).ok_or_else(|| {
                    Error::msg(format!(
                        "`{}.{}` is not a declared field",
                        meta.name(),
                        key
                    ))
                })?;
                let callback = field.on_delete.ok_or_else(|| {
                    Error::msg(format!(
                        "`{}.{}` is the soft-delete field and needs an on_delete callback",
                        meta.name(),
                        key
                    ))
                })?;
                let mut out = String::with_capacity(128);
                out.push_str("UPDATE ");
                self.write_identifier(&mut out, meta.name());
                out.push_str(" SET ");
                self.write_identifier(&mut out, field.column_name());
                out.push_str(" = ");
                self.write_value(&mut out, &callback());
                self.write_where(&mut out, schema, meta, filter, None, opts)?;
                return Ok(out);
            }
        }
        let mut out = String::with_capacity(64);
        out.push_str("DELETE FROM ");
        self.write_identifier(&mut out, meta.name());
        self.write_where(&mut out, schema, meta, filter, None, opts)?;
        Ok(out)
    }

    /// Builds a select: projection, joins for the populated to-one
    /// relations, filter, sort and pager.
    fn find(
        &self,
        schema: &Schema,
        meta: &EntityMeta,
        query: &Query,
        opts: QueryOptions,
    ) -> Result<String> {
        let qualify = !query.populate.is_empty();
        let prefix = qualify.then(|| meta.name());
        let mut out = String::with_capacity(256);
        out.push_str("SELECT ");
        self.write_projection(&mut out, meta, query.project.as_deref(), prefix, false, opts)?;
        let mut tables = String::new();
        if qualify {
            self.write_joins(&mut out, &mut tables, schema, meta, query, "")?;
        }
        out.push_str(" FROM ");
        self.write_identifier(&mut out, meta.name());
        out.push_str(&tables);
        self.write_where(&mut out, schema, meta, query.filter.as_ref(), prefix, opts)?;
        self.write_sort(&mut out, schema, meta, &query.sort, prefix)?;
        self.write_pager(&mut out, query.skip, query.limit);
        Ok(out)
    }

    /// A find with the trusted `COUNT(*)` projection.
    fn count(
        &self,
        schema: &Schema,
        meta: &EntityMeta,
        filter: Option<&Filter>,
        opts: QueryOptions,
    ) -> Result<String> {
        let query = Query {
            filter: filter.cloned(),
            project: Some(vec!["COUNT(*) \"count\"".into()]),
            ..Query::default()
        };
        self.find(
            schema,
            meta,
            &query,
            QueryOptions {
                trusted_project: true,
                ..opts
            },
        )
    }

    fn write_projection(
        &self,
        out: &mut String,
        meta: &EntityMeta,
        project: Option<&[String]>,
        prefix: Option<&str>,
        alias: bool,
        opts: QueryOptions,
    ) -> Result<()> {
        if opts.trusted_project {
            if let Some(project) = project {
                separated_by(out, project, |out, raw| out.push_str(raw), ", ");
                return Ok(());
            }
        }
        let keys: Vec<&str> = match project {
            Some(project) => {
                for key in project {
                    if meta.field_def(key).is_none() {
                        return Err(Error::msg(format!(
                            "Unknown field `{}.{}`",
                            meta.name(),
                            key
                        )));
                    }
                }
                project.iter().map(String::as_str).collect()
            }
            None => meta.fields().iter().map(|f| f.key()).collect(),
        };
        separated_by(
            out,
            keys,
            |out, key| {
                let column = meta.field_def(key).map_or(key, |f| f.column_name());
                if let Some(prefix) = prefix {
                    self.write_identifier(out, prefix);
                    out.push('.');
                }
                self.write_identifier(out, column);
                if alias {
                    out.push(' ');
                    self.write_identifier(out, &format!("{}.{}", prefix.unwrap_or_default(), key));
                } else if column != key {
                    out.push(' ');
                    self.write_identifier(out, key);
                }
            },
            ", ",
        );
        Ok(())
    }

    /// Adds the aliased column list and the LEFT/INNER JOIN clauses of every
    /// populated to-one relation, recursing into nested populates. To-many
    /// relations are resolved after the primary query and are skipped here.
    fn write_joins(
        &self,
        select: &mut String,
        tables: &mut String,
        schema: &Schema,
        meta: &EntityMeta,
        query: &Query,
        prefix: &str,
    ) -> Result<()> {
        for (key, sub) in &query.populate {
            let Some(relation) = meta.relation_def(key) else {
                return Err(Error::msg(format!(
                    "`{}.{}` is not a declared relation",
                    meta.name(),
                    key
                )));
            };
            if matches!(
                relation.cardinality(),
                Cardinality::OneToMany | Cardinality::ManyToMany
            ) {
                continue;
            }
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            let rel_meta = schema.meta(relation.target())?;
            select.push_str(", ");
            self.write_projection(
                select,
                rel_meta,
                sub.project.as_deref(),
                Some(&path),
                true,
                QueryOptions::default(),
            )?;
            tables.push_str(if sub.required {
                " INNER JOIN "
            } else {
                " LEFT JOIN "
            });
            self.write_identifier(tables, rel_meta.name());
            tables.push(' ');
            self.write_identifier(tables, &path);
            tables.push_str(" ON ");
            let Some(reference) = relation.references().first() else {
                return Err(Error::msg(format!(
                    "`{}.{}` declares no reference",
                    meta.name(),
                    key
                )));
            };
            self.write_identifier(tables, &path);
            tables.push('.');
            self.write_identifier(tables, reference.target);
            tables.push_str(" = ");
            self.write_identifier(tables, if prefix.is_empty() { meta.name() } else { prefix });
            tables.push('.');
            self.write_identifier(tables, reference.source);
            if let Some(soft_delete) = rel_meta.soft_delete_key() {
                let column = rel_meta
                    .field_def(soft_delete)
                    .map_or(soft_delete, |f| f.column_name());
                tables.push_str(" AND ");
                self.write_identifier(tables, &path);
                tables.push('.');
                self.write_identifier(tables, column);
                tables.push_str(" IS NULL");
            }
            if !sub.populate.is_empty() {
                self.write_joins(select, tables, schema, rel_meta, sub, &path)?;
            }
        }
        Ok(())
    }

    fn write_where(
        &self,
        out: &mut String,
        schema: &Schema,
        meta: &EntityMeta,
        filter: Option<&Filter>,
        prefix: Option<&str>,
        opts: QueryOptions,
    ) -> Result<()> {
        let guard = meta
            .soft_delete_key()
            .filter(|_| !opts.with_deleted)
            .map(|key| Filter::Cmp(key.into(), vec![Compare::Eq(Value::Null)]));
        let root = match (filter, guard) {
            (None, None) => return Ok(()),
            (Some(filter), None) => filter.clone(),
            (None, Some(guard)) => guard,
            (Some(filter), Some(guard)) => Filter::All(vec![filter.clone(), guard]),
        };
        out.push_str(" WHERE ");
        self.write_filter(out, schema, meta, &root, prefix)
    }

    fn write_filter(
        &self,
        out: &mut String,
        schema: &Schema,
        meta: &EntityMeta,
        filter: &Filter,
        prefix: Option<&str>,
    ) -> Result<()> {
        match filter {
            Filter::All(items) => self.write_filter_list(out, schema, meta, items, " AND ", prefix),
            Filter::Any(items) => self.write_filter_list(out, schema, meta, items, " OR ", prefix),
            Filter::Cmp(key, ops) => self.write_comparison(out, schema, meta, key, ops, prefix),
        }
    }

    /// Writes `items` joined by `link`. A sub-tree is parenthesized only
    /// when it holds more than one condition and sits next to at least one
    /// sibling; single conditions and lone top-level combinators stay bare.
    fn write_filter_list(
        &self,
        out: &mut String,
        schema: &Schema,
        meta: &EntityMeta,
        items: &[Filter],
        link: &str,
        prefix: Option<&str>,
    ) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(link);
            }
            match item {
                Filter::Cmp(key, ops) => {
                    self.write_comparison(out, schema, meta, key, ops, prefix)?;
                }
                sub => {
                    let parenthesized = items.len() > 1 && sub.width() > 1;
                    if parenthesized {
                        out.push('(');
                    }
                    self.write_filter(out, schema, meta, sub, prefix)?;
                    if parenthesized {
                        out.push(')');
                    }
                }
            }
        }
        Ok(())
    }

    /// One field, one or more comparisons AND-combined.
    fn write_comparison(
        &self,
        out: &mut String,
        schema: &Schema,
        meta: &EntityMeta,
        key: &str,
        ops: &[Compare],
        prefix: Option<&str>,
    ) -> Result<()> {
        if ops.is_empty() {
            return Err(Error::msg(format!(
                "Empty comparison on `{}.{}`",
                meta.name(),
                key
            )));
        }
        let mut column = String::new();
        self.write_column(&mut column, schema, meta, key, prefix)?;
        let parenthesized = ops.len() > 1;
        if parenthesized {
            out.push('(');
        }
        for (i, op) in ops.iter().enumerate() {
            if i > 0 {
                out.push_str(" AND ");
            }
            self.write_comparison_operation(out, &column, op);
        }
        if parenthesized {
            out.push(')');
        }
        Ok(())
    }

    fn write_comparison_operation(&self, out: &mut String, column: &str, op: &Compare) {
        match op {
            Compare::Eq(v) if v.is_null() => {
                out.push_str(column);
                out.push_str(" IS NULL");
            }
            Compare::Eq(v) => {
                out.push_str(column);
                out.push_str(" = ");
                self.write_value(out, v);
            }
            Compare::Ne(v) if v.is_null() => {
                out.push_str(column);
                out.push_str(" IS NOT NULL");
            }
            Compare::Ne(v) => {
                out.push_str(column);
                out.push_str(" <> ");
                self.write_value(out, v);
            }
            Compare::Gt(v) => {
                out.push_str(column);
                out.push_str(" > ");
                self.write_value(out, v);
            }
            Compare::Gte(v) => {
                out.push_str(column);
                out.push_str(" >= ");
                self.write_value(out, v);
            }
            Compare::Lt(v) => {
                out.push_str(column);
                out.push_str(" < ");
                self.write_value(out, v);
            }
            Compare::Lte(v) => {
                out.push_str(column);
                out.push_str(" <= ");
                self.write_value(out, v);
            }
            Compare::In(values) => {
                out.push_str(column);
                out.push_str(" IN ");
                self.write_value_list(out, values);
            }
            Compare::NotIn(values) => {
                out.push_str(column);
                out.push_str(" NOT IN ");
                self.write_value_list(out, values);
            }
            Compare::StartsWith(value) => self.write_starts_with(out, column, value),
            Compare::Regex(value) => self.write_regex(out, column, value),
        }
    }

    fn write_value_list(&self, out: &mut String, values: &[Value]) {
        if values.is_empty() {
            out.push_str("(NULL)");
            return;
        }
        out.push('(');
        separated_by(out, values, |out, v| self.write_value(out, v), ", ");
        out.push(')');
    }

    /// Case-insensitive prefix match.
    fn write_starts_with(&self, out: &mut String, column: &str, value: &str) {
        out.push_str("LOWER(");
        out.push_str(column);
        out.push_str(") LIKE ");
        let mut pattern = value.to_lowercase();
        pattern.push('%');
        self.write_string(out, &pattern);
    }

    fn write_regex(&self, out: &mut String, column: &str, value: &str) {
        out.push_str(column);
        out.push_str(" REGEXP ");
        self.write_string(out, value);
    }

    /// Resolves a filter/sort key into its quoted column: a declared field
    /// of `meta`, or a dotted path walking populated relations whose last
    /// segment is a field of the final entity.
    fn write_column(
        &self,
        out: &mut String,
        schema: &Schema,
        meta: &EntityMeta,
        key: &str,
        prefix: Option<&str>,
    ) -> Result<()> {
        let mut current = meta;
        let mut consumed = String::new();
        let mut remainder = key;
        while let Some((head, rest)) = remainder.split_once('.') {
            let Some(relation) = current.relation_def(head) else {
                return Err(Error::msg(format!(
                    "`{}.{}` is not a declared relation",
                    current.name(),
                    head
                )));
            };
            current = schema.meta(relation.target())?;
            if !consumed.is_empty() {
                consumed.push('.');
            }
            consumed.push_str(head);
            remainder = rest;
        }
        let Some(field) = current.field_def(remainder) else {
            return Err(Error::msg(format!(
                "Unknown field `{}.{}`",
                current.name(),
                remainder
            )));
        };
        let qualifier = if consumed.is_empty() {
            prefix
        } else {
            Some(consumed.as_str())
        };
        if let Some(qualifier) = qualifier {
            self.write_identifier(out, qualifier);
            out.push('.');
        }
        self.write_identifier(out, field.column_name());
        Ok(())
    }

    fn write_sort(
        &self,
        out: &mut String,
        schema: &Schema,
        meta: &EntityMeta,
        sort: &[(String, SortDirection)],
        prefix: Option<&str>,
    ) -> Result<()> {
        if sort.is_empty() {
            return Ok(());
        }
        out.push_str(" ORDER BY ");
        for (i, (key, direction)) in sort.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_column(out, schema, meta, key, prefix)?;
            if *direction == SortDirection::Desc {
                out.push_str(" DESC");
            }
        }
        Ok(())
    }

    /// OFFSET only ever appears together with LIMIT.
    fn write_pager(&self, out: &mut String, skip: Option<u64>, limit: Option<u64>) {
        if let Some(limit) = limit {
            out.push_str(" LIMIT ");
            write_integer!(out, limit);
            if let Some(skip) = skip {
                out.push_str(" OFFSET ");
                write_integer!(out, skip);
            }
        }
    }
}

/// The portable syntax shared by the concrete dialects.
pub struct GenericSqlDialect;

impl GenericSqlDialect {
    pub const fn new() -> Self {
        Self {}
    }
}

impl SqlDialect for GenericSqlDialect {}
