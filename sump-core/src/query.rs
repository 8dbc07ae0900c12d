use crate::Value;

/// A single comparison applied to a field. A bare value in the builder API
/// is sugar for `Eq`.
#[derive(Debug, Clone, PartialEq)]
pub enum Compare {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// Case-insensitive prefix match.
    StartsWith(String),
    Regex(String),
}

/// A finite, backend-neutral predicate tree.
///
/// Children of `All`/`Any` combine with AND/OR; a `Cmp` node carries one or
/// more comparisons on a single field, which AND-combine. Every `Cmp` field
/// must be declared on the target entity, or be a dotted path through a
/// populated relation.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All(Vec<Filter>),
    Any(Vec<Filter>),
    Cmp(String, Vec<Compare>),
}

impl Filter {
    pub fn all(children: impl IntoIterator<Item = Filter>) -> Self {
        Filter::All(children.into_iter().collect())
    }

    pub fn any(children: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Any(children.into_iter().collect())
    }

    pub fn cmp(field: impl Into<String>, ops: impl IntoIterator<Item = Compare>) -> Self {
        Filter::Cmp(field.into(), ops.into_iter().collect())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cmp(field.into(), vec![Compare::Eq(value.into())])
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cmp(field.into(), vec![Compare::Ne(value.into())])
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cmp(field.into(), vec![Compare::Gt(value.into())])
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cmp(field.into(), vec![Compare::Gte(value.into())])
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cmp(field.into(), vec![Compare::Lt(value.into())])
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cmp(field.into(), vec![Compare::Lte(value.into())])
    }

    pub fn is_in(field: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        Filter::Cmp(field.into(), vec![Compare::In(values.into_iter().collect())])
    }

    pub fn not_in(field: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        Filter::Cmp(
            field.into(),
            vec![Compare::NotIn(values.into_iter().collect())],
        )
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Filter::Cmp(field.into(), vec![Compare::StartsWith(prefix.into())])
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Cmp(field.into(), vec![Compare::Regex(pattern.into())])
    }

    /// Number of direct conditions, used to decide parenthesization.
    pub(crate) fn width(&self) -> usize {
        match self {
            Filter::All(children) | Filter::Any(children) => children.len(),
            Filter::Cmp(..) => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// The structured, backend-neutral description of a read.
///
/// `populate` requests eager loading of relations, each with its own nested
/// `Query`; population order follows declaration order. `required` marks a
/// populate sub-query whose join must drop parents without a match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub project: Option<Vec<String>>,
    pub sort: Vec<(String, SortDirection)>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub populate: Vec<(String, Query)>,
    pub required: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn project<K: Into<String>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.project = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn sort(mut self, key: impl Into<String>) -> Self {
        self.sort.push((key.into(), SortDirection::Asc));
        self
    }

    pub fn sort_desc(mut self, key: impl Into<String>) -> Self {
        self.sort.push((key.into(), SortDirection::Desc));
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn populate(mut self, key: impl Into<String>, query: Query) -> Self {
        self.populate.push((key.into(), query));
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl From<Filter> for Query {
    fn from(filter: Filter) -> Self {
        Query::new().filter(filter)
    }
}

/// Compilation switches that never come from untrusted input.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Skips column validation for an internally built projection, such as
    /// the `COUNT(*)` of [`SqlDialect::count`](crate::SqlDialect::count).
    pub trusted_project: bool,
    /// Includes soft-deleted rows in reads.
    pub with_deleted: bool,
    /// Physically deletes rows even when the entity is soft-delete.
    pub hard_delete: bool,
}
