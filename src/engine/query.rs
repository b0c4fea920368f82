//! # Query Algebra and Executor
//!
//! Queries form a small algebra over one collection. Every variant knows
//! two executions: an index walk (used when the target field is indexed)
//! and a document predicate (the full-scan form, which also closes the
//! algebra for `Not` and powers the equivalence tests).
//!
//! | Query | Index execution |
//! |-------|-----------------|
//! | Eq/Gt/Gte/Lt/Lte/Between | skip-list walk on the field's index |
//! | StartsWith | walk from first `>= prefix`, stop at non-prefix |
//! | In | union of Eq walks, deduplicated |
//! | All | forward/reverse traversal |
//! | And | intersection by data block |
//! | Or | union by data block |
//! | Not | `All` minus the inner result |
//!
//! `run` yields data-block addresses in index order for leaf queries
//! (ascending key order, so `find` results follow the index). A leaf
//! query on an unindexed field fails with `IndexNotFound`; the engine
//! facade resolves that by building the index and retrying.

use hashbrown::HashSet;

use crate::document::{Document, Value};
use crate::error::{Error, Result};
use crate::storage::{CollectionPage, PageAddress, PageCache};

use super::index::SkipIndex;

/// A query over one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Eq { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    Between { field: String, from: Value, to: Value },
    StartsWith { field: String, prefix: String },
    In { field: String, values: Vec<Value> },
    All { field: String, ascending: bool },
    And(Box<Query>, Box<Query>),
    Or(Box<Query>, Box<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Query {
        Query::Eq { field: field.into(), value: value.into() }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Query {
        Query::Gt { field: field.into(), value: value.into() }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Query {
        Query::Gte { field: field.into(), value: value.into() }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Query {
        Query::Lt { field: field.into(), value: value.into() }
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Query {
        Query::Lte { field: field.into(), value: value.into() }
    }

    /// Inclusive on both bounds.
    pub fn between(
        field: impl Into<String>,
        from: impl Into<Value>,
        to: impl Into<Value>,
    ) -> Query {
        Query::Between {
            field: field.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Query {
        Query::StartsWith {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Query {
        Query::In {
            field: field.into(),
            values,
        }
    }

    /// Every document, in ascending `_id` order.
    pub fn all() -> Query {
        Query::all_by("_id", true)
    }

    /// Every document, ordered by `field`.
    pub fn all_by(field: impl Into<String>, ascending: bool) -> Query {
        Query::All {
            field: field.into(),
            ascending,
        }
    }

    pub fn and(a: Query, b: Query) -> Query {
        Query::And(Box::new(a), Box::new(b))
    }

    pub fn or(a: Query, b: Query) -> Query {
        Query::Or(Box::new(a), Box::new(b))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(q: Query) -> Query {
        Query::Not(Box::new(q))
    }

    /// Full-scan form: does `doc` satisfy this query?
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Query::Eq { field, value } => doc.get_or_null(field) == *value,
            Query::Gt { field, value } => doc.get_or_null(field) > *value,
            Query::Gte { field, value } => doc.get_or_null(field) >= *value,
            Query::Lt { field, value } => doc.get_or_null(field) < *value,
            Query::Lte { field, value } => doc.get_or_null(field) <= *value,
            Query::Between { field, from, to } => {
                let v = doc.get_or_null(field);
                v >= *from && v <= *to
            }
            Query::StartsWith { field, prefix } => doc
                .get_or_null(field)
                .as_str()
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Query::In { field, values } => {
                let v = doc.get_or_null(field);
                values.iter().any(|candidate| v == *candidate)
            }
            Query::All { .. } => true,
            Query::And(a, b) => a.matches(doc) && b.matches(doc),
            Query::Or(a, b) => a.matches(doc) || b.matches(doc),
            Query::Not(q) => !q.matches(doc),
        }
    }

    /// Index execution: data-block addresses of matching documents, in
    /// index order for leaf queries.
    pub(crate) fn run(&self, cache: &mut PageCache, col_id: u32) -> Result<Vec<PageAddress>> {
        match self {
            Query::Eq { field, value } => {
                let mut index = indexed(cache, col_id, field)?;
                walk_gte(&mut index, value, |k| k == value)
            }
            Query::Gt { field, value } => {
                let mut index = indexed(cache, col_id, field)?;
                let mut out = Vec::new();
                let mut addr = index.find_first_gte(value)?;
                loop {
                    let node = index.node_at(addr)?;
                    if node.is_sentinel() {
                        break;
                    }
                    if node.key != *value {
                        out.push(node.data_block);
                    }
                    addr = node.next[0];
                }
                Ok(out)
            }
            Query::Gte { field, value } => {
                let mut index = indexed(cache, col_id, field)?;
                walk_gte(&mut index, value, |_| true)
            }
            Query::Lt { field, value } => {
                let mut index = indexed(cache, col_id, field)?;
                walk_forward(&mut index, |k| k < value)
            }
            Query::Lte { field, value } => {
                let mut index = indexed(cache, col_id, field)?;
                walk_forward(&mut index, |k| k <= value)
            }
            Query::Between { field, from, to } => {
                let mut index = indexed(cache, col_id, field)?;
                walk_gte(&mut index, from, |k| k <= to)
            }
            Query::StartsWith { field, prefix } => {
                let mut index = indexed(cache, col_id, field)?;
                let lower = Value::String(prefix.clone());
                walk_gte(&mut index, &lower, |k| {
                    k.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))
                })
            }
            Query::In { field, values } => {
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for value in values {
                    let mut index = indexed(cache, col_id, field)?;
                    for addr in walk_gte(&mut index, value, |k| k == value)? {
                        if seen.insert(addr) {
                            out.push(addr);
                        }
                    }
                }
                Ok(out)
            }
            Query::All { field, ascending } => {
                let mut index = indexed(cache, col_id, field)?;
                if *ascending {
                    walk_forward(&mut index, |_| true)
                } else {
                    walk_backward(&mut index)
                }
            }
            Query::And(a, b) => {
                let left = a.run(cache, col_id)?;
                let right: HashSet<PageAddress> = b.run(cache, col_id)?.into_iter().collect();
                Ok(left.into_iter().filter(|addr| right.contains(addr)).collect())
            }
            Query::Or(a, b) => {
                let mut out = a.run(cache, col_id)?;
                let mut seen: HashSet<PageAddress> = out.iter().copied().collect();
                for addr in b.run(cache, col_id)? {
                    if seen.insert(addr) {
                        out.push(addr);
                    }
                }
                Ok(out)
            }
            Query::Not(q) => {
                let excluded: HashSet<PageAddress> = q.run(cache, col_id)?.into_iter().collect();
                let all = Query::all().run(cache, col_id)?;
                Ok(all
                    .into_iter()
                    .filter(|addr| !excluded.contains(addr))
                    .collect())
            }
        }
    }
}

/// Binds the field's index, or fails with `IndexNotFound` for the facade
/// to resolve.
fn indexed<'a>(
    cache: &'a mut PageCache,
    col_id: u32,
    field: &str,
) -> Result<SkipIndex<'a>> {
    let slot = cache
        .get::<CollectionPage>(col_id)?
        .index_for(field)
        .map(|ix| ix.slot)
        .ok_or_else(|| Error::IndexNotFound {
            field: field.to_string(),
        })?;
    Ok(SkipIndex::new(cache, col_id, slot))
}

/// Level-0 walk from the first node `>= start` while `keep` holds.
fn walk_gte(
    index: &mut SkipIndex<'_>,
    start: &Value,
    mut keep: impl FnMut(&Value) -> bool,
) -> Result<Vec<PageAddress>> {
    let mut out = Vec::new();
    let mut addr = index.find_first_gte(start)?;
    loop {
        let node = index.node_at(addr)?;
        if node.is_sentinel() || !keep(&node.key) {
            break;
        }
        out.push(node.data_block);
        addr = node.next[0];
    }
    Ok(out)
}

/// Level-0 walk from HEAD while `keep` holds.
fn walk_forward(
    index: &mut SkipIndex<'_>,
    mut keep: impl FnMut(&Value) -> bool,
) -> Result<Vec<PageAddress>> {
    let mut out = Vec::new();
    let head = index.head_addr()?;
    let mut addr = index.node_at(head)?.next[0];
    loop {
        let node = index.node_at(addr)?;
        if node.is_sentinel() || !keep(&node.key) {
            break;
        }
        out.push(node.data_block);
        addr = node.next[0];
    }
    Ok(out)
}

/// Reverse level-0 walk from TAIL.
fn walk_backward(index: &mut SkipIndex<'_>) -> Result<Vec<PageAddress>> {
    let mut out = Vec::new();
    let tail = index.tail_addr()?;
    let mut addr = index.node_at(tail)?.prev;
    loop {
        let node = index.node_at(addr)?;
        if node.is_sentinel() {
            break;
        }
        out.push(node.data_block);
        addr = node.prev;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn matches_compares_through_missing_fields() {
        let doc = doc! { "name" => "ana", "age" => 30 };

        assert!(Query::eq("name", "ana").matches(&doc));
        assert!(Query::eq("missing", Value::Null).matches(&doc));
        assert!(Query::gt("age", 29).matches(&doc));
        assert!(!Query::gt("age", 30).matches(&doc));
        assert!(Query::between("age", 30, 40).matches(&doc));
        assert!(Query::starts_with("name", "an").matches(&doc));
        assert!(!Query::starts_with("age", "3").matches(&doc));
        assert!(Query::in_values("age", vec![Value::Int32(1), Value::Int32(30)]).matches(&doc));
    }

    #[test]
    fn matches_combines_composites() {
        let doc = doc! { "a" => 1, "b" => 2 };

        assert!(Query::and(Query::eq("a", 1), Query::eq("b", 2)).matches(&doc));
        assert!(!Query::and(Query::eq("a", 1), Query::eq("b", 3)).matches(&doc));
        assert!(Query::or(Query::eq("a", 9), Query::eq("b", 2)).matches(&doc));
        assert!(Query::not(Query::eq("a", 9)).matches(&doc));
        assert!(Query::all().matches(&doc));
    }

    #[test]
    fn numeric_comparisons_cross_kinds() {
        let doc = doc! { "v" => 10 };
        assert!(Query::eq("v", Value::Int64(10)).matches(&doc));
        assert!(Query::lt("v", Value::Double(10.5)).matches(&doc));
    }
}
