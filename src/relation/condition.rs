//! Join predicates and related-row queries.
//!
//! Every relation operation starts from the same question: which rows of the
//! target table belong to a given owner? [`related_rows`] answers it as a
//! `SelectQuery`, with the owner side expressed either as a column of an
//! enclosing query (correlated subqueries for `has`/`with_count`) or as a
//! list of key values (single-owner fetches and eager-load batches).

use crate::query::{ColumnRef, Predicate, Projection, SelectQuery, Value};
use crate::relation::keys::ResolvedRelation;
use crate::relation::types::RelationType;

/// Owner side of a relation query
#[derive(Debug, Clone, Copy)]
pub enum Owner<'a> {
    /// Correlate with a column of the enclosing query
    Column(&'a ColumnRef),
    /// Match any of these owner key values
    Keys(&'a [Value]),
}

impl Owner<'_> {
    fn matching(&self, column: ColumnRef) -> Predicate {
        match self {
            Owner::Column(outer) => Predicate::columns_eq(column, (*outer).clone()),
            Owner::Keys(keys) => Predicate::is_in(column, keys.iter().cloned()),
        }
    }
}

/// Related-row query plus the names its rows are addressed by
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedRows {
    pub query: SelectQuery,
    /// Table name or alias of the target rows
    pub target: String,
    /// Table name or alias of the joined pivot rows (`ManyToMany` only)
    pub pivot: Option<String>,
}

/// Alias for `table` when its name is already bound by an enclosing query
///
/// ```
/// use lifeguard_relations::relation::condition::source_alias;
///
/// assert_eq!(source_alias("posts", &["users".to_string()]), None);
/// assert_eq!(source_alias("users", &["users".to_string()]).as_deref(), Some("users_1"));
/// ```
pub fn source_alias(table: &str, taken: &[String]) -> Option<String> {
    if !taken.iter().any(|name| name == table) {
        return None;
    }
    (1..)
        .map(|n| format!("{table}_{n}"))
        .find(|alias| !taken.contains(alias))
}

fn select_from(table: &str, alias: Option<String>) -> (SelectQuery, String) {
    match alias {
        Some(alias) => (SelectQuery::from_as(table, alias.clone()), alias),
        None => (SelectQuery::new(table), table.to_string()),
    }
}

/// Column under which a pivot column is projected next to the related row
///
/// The prefix is reserved so related columns named `pivot_*` stay attributes.
pub fn pivot_column_alias(column: &str) -> String {
    format!("__lg_pivot_{column}")
}

/// Column under which the `index`th relation count is projected
pub fn count_column_alias(index: usize) -> String {
    format!("__lg_count_{index}")
}

/// Rows of `rel`'s target schema that belong to `owner`
///
/// `taken` lists the source names bound by enclosing queries; a target,
/// pivot or intermediate table whose name is taken is aliased, which keeps
/// self-referential relations unambiguous.
///
/// - `OneToOne`/`OneToMany`/`InverseOneToOne`: `target.foreign_key` matches the owner.
/// - `ManyToMany`: the pivot is joined on `pivot.related_foreign_key =
///   target.related_key`; `pivot.foreign_key` matches the owner and the pivot
///   columns are projected under `pivot_column_alias`.
/// - `Indirect`: the through relation's rows are joined to the intermediate
///   table, whose `foreign_key` matches the owner.
pub fn related_rows(rel: &ResolvedRelation, owner: Owner<'_>, taken: &[String]) -> RelatedRows {
    match rel.rel_type {
        RelationType::OneToOne | RelationType::OneToMany | RelationType::InverseOneToOne => {
            let (query, target) = select_from(&rel.related.table, source_alias(&rel.related.table, taken));
            let query = query.and_where(owner.matching(ColumnRef::qualified(&target, &rel.keys.foreign_key)));
            RelatedRows {
                query,
                target,
                pivot: None,
            }
        }
        RelationType::ManyToMany => {
            let (query, target) = select_from(&rel.related.table, source_alias(&rel.related.table, taken));
            let Some(pivot) = &rel.pivot else {
                return RelatedRows {
                    query,
                    target,
                    pivot: None,
                };
            };

            let mut names = taken.to_vec();
            names.push(target.clone());
            let pivot_alias = source_alias(&pivot.table, &names);
            let pivot_source = pivot_alias.clone().unwrap_or_else(|| pivot.table.clone());
            let on = Predicate::columns_eq(
                ColumnRef::qualified(&pivot_source, &pivot.related_foreign_key),
                ColumnRef::qualified(&target, &pivot.related_key),
            );
            let mut query = match pivot_alias {
                Some(alias) => query.join_as(&pivot.table, alias, on),
                None => query.join(&pivot.table, on),
            };

            query = query.table_columns(&target);
            for column in pivot.columns() {
                query = query.column_as(
                    ColumnRef::qualified(&pivot_source, column),
                    pivot_column_alias(column),
                );
            }
            let query = query.and_where(owner.matching(ColumnRef::qualified(&pivot_source, &pivot.foreign_key)));
            RelatedRows {
                query,
                target,
                pivot: Some(pivot_source),
            }
        }
        RelationType::Indirect => {
            let intermediate = &rel.related;
            let mid_alias = source_alias(&intermediate.table, taken);
            let mid_source = mid_alias.clone().unwrap_or_else(|| intermediate.table.clone());

            let Some(through) = &rel.through else {
                let (query, target) = select_from(&intermediate.table, mid_alias);
                return RelatedRows {
                    query,
                    target,
                    pivot: None,
                };
            };

            let mut names = taken.to_vec();
            names.push(mid_source.clone());
            let mid_key = ColumnRef::qualified(&mid_source, &through.keys.local_key);
            let inner = related_rows(through, Owner::Column(&mid_key), &names);

            let mut query = inner.query;
            let on = query.filter.take().unwrap_or(Predicate::All(Vec::new()));
            query = match mid_alias {
                Some(alias) => query.join_as(&intermediate.table, alias, on),
                None => query.join(&intermediate.table, on),
            };
            query.projections = vec![Projection::AllColumns(Some(inner.target.clone()))];
            let query = query.and_where(owner.matching(ColumnRef::qualified(&mid_source, &rel.keys.foreign_key)));
            RelatedRows {
                query,
                target: inner.target,
                pivot: None,
            }
        }
    }
}

/// First step of an indirect batch: intermediate rows of the given owners
pub fn intermediate_rows(rel: &ResolvedRelation, keys: &[Value]) -> SelectQuery {
    SelectQuery::new(&rel.related.table).where_in(rel.keys.foreign_key.as_str(), keys.iter().cloned())
}
