//! Rendering of structured statements through `sea-query`.
//!
//! SQL-backed executors call these functions to turn the relation engine's
//! statements into `sea-query` statements, then build them with the
//! backend's query builder. [`to_sql`] renders with values inlined, which is
//! what `ModelQuery::to_sql` and the log lines use.

use crate::executor::LifeError;
use crate::query::mutation::{DeleteStatement, InsertStatement, UpdateStatement};
use crate::query::predicate::{ColumnRef, CompareOp, Operand, Predicate};
use crate::query::select::{Order, Projection, SelectQuery};
use sea_query::{
    Asterisk, Condition, DeleteStatement as SeaDelete, DynIden, Expr, ExprTrait,
    InsertStatement as SeaInsert, JoinType, PostgresQueryBuilder, Query,
    SelectStatement, UpdateStatement as SeaUpdate, Value as SeaValue,
};
use serde_json::Value;

fn iden(name: &str) -> DynIden {
    DynIden::from(name.to_string())
}

fn column_expr(column: &ColumnRef) -> Expr {
    match &column.table {
        Some(table) => Expr::col((iden(table), iden(&column.column))),
        None => Expr::col(iden(&column.column)),
    }
}

/// Convert a JSON row value into a bound `sea-query` value
///
/// Arrays and objects are bound as their JSON text.
pub fn to_sea_value(value: &Value) -> SeaValue {
    match value {
        Value::Null => SeaValue::String(None),
        Value::Bool(b) => SeaValue::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SeaValue::from(i),
            None => SeaValue::from(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SeaValue::from(s.clone()),
        other => SeaValue::from(other.to_string()),
    }
}

fn condition(predicate: &Predicate) -> Condition {
    Condition::all().add(expr(predicate))
}

fn expr(predicate: &Predicate) -> Expr {
    match predicate {
        Predicate::Compare { column, op, operand } => {
            let right = match operand {
                Operand::Value(v) => Expr::val(to_sea_value(v)),
                Operand::Column(c) => column_expr(c),
            };
            compare(column_expr(column), *op, right)
        }
        Predicate::In { column, values } => {
            column_expr(column).is_in(values.iter().map(to_sea_value).collect::<Vec<_>>())
        }
        Predicate::IsNull(column) => column_expr(column).is_null(),
        Predicate::IsNotNull(column) => column_expr(column).is_not_null(),
        Predicate::Exists(query) => Expr::exists(select_statement(query)),
        Predicate::CountCompare { query, op, count } => compare(count_subquery(query), *op, Expr::val(*count)),
        Predicate::All(parts) => parts
            .iter()
            .map(expr)
            .reduce(|left, right| left.and(right))
            .unwrap_or_else(|| Expr::cust("TRUE")),
        Predicate::Any(parts) => parts
            .iter()
            .map(expr)
            .reduce(|left, right| left.or(right))
            .unwrap_or_else(|| Expr::cust("FALSE")),
        Predicate::Not(inner) => expr(inner).not(),
    }
}

fn compare(left: Expr, op: CompareOp, right: Expr) -> Expr {
    match op {
        CompareOp::Eq => left.eq(right),
        CompareOp::Ne => left.ne(right),
        CompareOp::Gt => left.gt(right),
        CompareOp::Ge => left.gte(right),
        CompareOp::Lt => left.lt(right),
        CompareOp::Le => left.lte(right),
    }
}

/// `(SELECT COUNT(*) ...)` with the subquery's values left bound
fn count_subquery(query: &SelectQuery) -> Expr {
    let mut counted = query.clone();
    counted.projections.clear();
    let mut statement = select_statement(&counted);
    statement.clear_selects();
    statement.expr(Expr::cust("COUNT(*)"));
    Expr::from(statement)
}

/// Build the `sea-query` select statement for `query`
pub fn select_statement(query: &SelectQuery) -> SelectStatement {
    let mut statement = Query::select();

    if query.projections.is_empty() {
        statement.column(Asterisk);
    }
    for projection in &query.projections {
        match projection {
            Projection::AllColumns(None) => {
                statement.column(Asterisk);
            }
            Projection::AllColumns(Some(table)) => {
                statement.column((iden(table), Asterisk));
            }
            Projection::Column { column, alias: None } => {
                statement.expr(column_expr(column));
            }
            Projection::Column {
                column,
                alias: Some(alias),
            } => {
                statement.expr_as(column_expr(column), iden(alias));
            }
            Projection::CountOf { query, alias } => {
                statement.expr_as(count_subquery(query), iden(alias));
            }
        }
    }

    match &query.alias {
        Some(alias) => statement.from_as(iden(&query.table), iden(alias)),
        None => statement.from(iden(&query.table)),
    };

    for join in &query.joins {
        let on = condition(&join.on);
        match &join.alias {
            Some(alias) => statement.join_as(JoinType::InnerJoin, iden(&join.table), iden(alias), on),
            None => statement.join(JoinType::InnerJoin, iden(&join.table), on),
        };
    }

    if let Some(filter) = &query.filter {
        statement.cond_where(condition(filter));
    }

    for (column, order) in &query.order_by {
        let order = match order {
            Order::Asc => sea_query::Order::Asc,
            Order::Desc => sea_query::Order::Desc,
        };
        statement.order_by_expr(column_expr(column), order);
    }

    if let Some(limit) = query.limit {
        statement.limit(limit);
    }
    if let Some(offset) = query.offset {
        statement.offset(offset);
    }

    statement.to_owned()
}

/// Build the `sea-query` insert statement for `insert`
///
/// Rows with differing column sets are padded with `NULL`.
///
/// # Errors
///
/// Returns `LifeError::QueryExecution` if `sea-query` rejects the value list.
pub fn insert_statement(insert: &InsertStatement) -> Result<SeaInsert, LifeError> {
    let mut columns: Vec<&String> = Vec::new();
    for row in &insert.rows {
        for key in row.keys() {
            if !columns.contains(&key) {
                columns.push(key);
            }
        }
    }

    let mut statement = Query::insert();
    statement
        .into_table(iden(&insert.table))
        .columns(columns.iter().map(|c| iden(c)).collect::<Vec<_>>());

    for row in &insert.rows {
        let values: Vec<Expr> = columns
            .iter()
            .map(|c| Expr::val(to_sea_value(row.get(*c).unwrap_or(&Value::Null))))
            .collect();
        statement
            .values(values)
            .map_err(|e| LifeError::QueryExecution(format!("Invalid insert for {}: {e}", insert.table)))?;
    }
    Ok(statement.to_owned())
}

/// Build the `sea-query` update statement for `update`
pub fn update_statement(update: &UpdateStatement) -> SeaUpdate {
    let mut statement = Query::update();
    statement.table(iden(&update.table));
    for (column, value) in &update.values {
        statement.value(iden(column), Expr::val(to_sea_value(value)));
    }
    if let Some(filter) = &update.filter {
        statement.cond_where(condition(filter));
    }
    statement.to_owned()
}

/// Build the `sea-query` delete statement for `delete`
pub fn delete_statement(delete: &DeleteStatement) -> SeaDelete {
    let mut statement = Query::delete();
    statement.from_table(iden(&delete.table));
    if let Some(filter) = &delete.filter {
        statement.cond_where(condition(filter));
    }
    statement.to_owned()
}

/// Render `query` as PostgreSQL with values inlined
///
/// # Example
///
/// ```
/// use lifeguard_relations::SelectQuery;
/// use lifeguard_relations::query::render::to_sql;
///
/// let sql = to_sql(&SelectQuery::new("posts").where_in("user_id", [1, 2]));
/// assert!(sql.contains("\"user_id\" IN (1, 2)"));
/// ```
pub fn to_sql(query: &SelectQuery) -> String {
    select_statement(query).to_string(PostgresQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_clause_binds_values() {
        let query = SelectQuery::new("posts").where_in("user_id", [1, 2, 3]);
        let (sql, values) = select_statement(&query).build(PostgresQueryBuilder);
        assert!(sql.contains("IN ($1, $2, $3)"), "{sql}");
        assert_eq!(values.0.len(), 3);
    }

    #[test]
    fn test_exists_subquery() {
        let sub = SelectQuery::new("posts").and_where(Predicate::columns_eq(
            ColumnRef::qualified("posts", "user_id"),
            ColumnRef::qualified("users", "id"),
        ));
        let sql = to_sql(&SelectQuery::new("users").and_where(Predicate::exists(sub)));
        assert!(sql.contains("EXISTS"), "{sql}");
        assert!(sql.contains("\"posts\".\"user_id\" = \"users\".\"id\""), "{sql}");
    }

    #[test]
    fn test_count_compare_renders_count_star() {
        let sub = SelectQuery::new("comments");
        let sql = to_sql(
            &SelectQuery::new("posts").and_where(Predicate::count_compare(sub, CompareOp::Gt, 2)),
        );
        assert!(sql.contains("COUNT(*)"), "{sql}");
        assert!(sql.contains(") > 2"), "{sql}");
    }

    #[test]
    fn test_count_subqueries_bind_values() {
        let query = SelectQuery::new("posts")
            .count_as(
                SelectQuery::new("comments").and_where(Predicate::eq("kind", "spam")),
                "spam_count",
            )
            .and_where(Predicate::count_compare(
                SelectQuery::new("comments").and_where(Predicate::eq("approved", true)),
                CompareOp::Ge,
                2,
            ));
        let (sql, values) = select_statement(&query).build(PostgresQueryBuilder);
        assert!(!sql.contains("'spam'"), "{sql}");
        assert!(sql.contains("\"kind\" = $1"), "{sql}");
        assert!(sql.contains("\"approved\" = $2"), "{sql}");
        assert!(sql.contains(") >= $3"), "{sql}");
        assert_eq!(
            values.0,
            vec![SeaValue::from("spam".to_string()), SeaValue::from(true), SeaValue::from(2i64)]
        );
    }

    #[test]
    fn test_inner_join_with_alias() {
        let query = SelectQuery::from_as("users", "self_0").join(
            "skill_user",
            Predicate::columns_eq(
                ColumnRef::qualified("skill_user", "user_id"),
                ColumnRef::qualified("self_0", "id"),
            ),
        );
        let sql = to_sql(&query);
        assert!(sql.contains("\"users\" AS \"self_0\""), "{sql}");
        assert!(sql.contains("INNER JOIN \"skill_user\""), "{sql}");
    }

    #[test]
    fn test_insert_pads_missing_columns() {
        let mut a = crate::query::Row::new();
        a.insert("user_id".into(), json!(1));
        a.insert("skill_id".into(), json!(5));
        let mut b = crate::query::Row::new();
        b.insert("user_id".into(), json!(1));
        let insert = InsertStatement::new("skill_user").row(a).row(b);
        let sql = insert_statement(&insert).unwrap().to_string(PostgresQueryBuilder);
        assert!(sql.contains("INSERT INTO \"skill_user\""), "{sql}");
        assert!(sql.contains("NULL"), "{sql}");
    }

    #[test]
    fn test_json_null_binds_as_null() {
        assert_eq!(to_sea_value(&Value::Null), SeaValue::String(None));
        assert_eq!(to_sea_value(&json!(7)), SeaValue::BigInt(Some(7)));
    }
}
