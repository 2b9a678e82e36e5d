//! In-memory `LifeExecutor`.
//!
//! `MemoryStore` evaluates the structured statements of [`crate::query`]
//! directly against tables of JSON rows. It backs the test suite and is
//! handy for prototyping relation schemas without a database:
//!
//! - inner joins, correlated `EXISTS` and `COUNT(*)` subqueries, ordering and
//!   pagination follow SQL semantics, including three-valued `NULL` logic;
//! - key columns get generated integer ids, and unique column sets are
//!   enforced on insert and update;
//! - transactions journal the rows each statement touched and revert only
//!   those on rollback, and nest like savepoints;
//! - every statement is recorded, so tests can assert how many queries a
//!   load issued.

use crate::executor::{LifeError, LifeExecutor, TransactionWork};
use crate::query::predicate::{ColumnRef, Operand, Predicate};
use crate::query::render;
use crate::query::select::{Order, Projection, SelectQuery};
use crate::query::{DeleteStatement, InsertStatement, Row, UpdateStatement};
use sea_query::PostgresQueryBuilder;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Kind of a recorded statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A statement issued against the store
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRecord {
    pub kind: StatementKind,
    pub table: String,
    /// PostgreSQL rendering with values inlined
    pub sql: String,
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    rows: Vec<Row>,
    next_id: i64,
    key: Option<String>,
    unique: Vec<Vec<String>>,
}

#[derive(Debug)]
struct Fault {
    kind: StatementKind,
    table: String,
    error: LifeError,
}

/// Reverts one statement issued inside a transaction
///
/// Rows are found again by value, so writes made outside the transaction
/// survive its rollback.
#[derive(Debug)]
enum Undo {
    Insert { table: String, rows: Vec<Row> },
    Update { table: String, changes: Vec<(Row, Row)> },
    Delete { table: String, rows: Vec<(usize, Row)> },
}

impl Undo {
    fn revert(self, state: &mut StoreState) {
        match self {
            Undo::Insert { table, rows } => {
                let Some(table) = state.tables.get_mut(&table) else { return };
                for row in rows.iter().rev() {
                    if let Some(index) = table.rows.iter().rposition(|stored| stored == row) {
                        table.rows.remove(index);
                    }
                }
            }
            Undo::Update { table, changes } => {
                let Some(table) = state.tables.get_mut(&table) else { return };
                for (before, after) in changes {
                    if let Some(stored) = table.rows.iter_mut().find(|stored| **stored == after) {
                        *stored = before;
                    }
                }
            }
            Undo::Delete { table, rows } => {
                let Some(table) = state.tables.get_mut(&table) else { return };
                // ascending original positions
                for (index, row) in rows {
                    let index = index.min(table.rows.len());
                    table.rows.insert(index, row);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    tables: BTreeMap<String, MemoryTable>,
    log: Vec<StatementRecord>,
    faults: Vec<Fault>,
}

impl StoreState {
    fn table(&self, name: &str) -> Result<&MemoryTable, LifeError> {
        self.tables
            .get(name)
            .ok_or_else(|| LifeError::QueryExecution(format!("relation \"{name}\" does not exist")))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable, LifeError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| LifeError::QueryExecution(format!("relation \"{name}\" does not exist")))
    }

    fn record(&mut self, kind: StatementKind, table: &str, sql: String) -> Result<(), LifeError> {
        log::debug!("memory store {kind} on {table}: {sql}");
        self.log.push(StatementRecord {
            kind,
            table: table.to_string(),
            sql,
        });
        match self
            .faults
            .iter()
            .position(|f| f.kind == kind && f.table == table)
        {
            Some(index) => Err(self.faults.remove(index).error),
            None => Ok(()),
        }
    }
}

/// In-memory relational store
///
/// # Example
///
/// ```
/// use lifeguard_relations::{LifeError, LifeExecutor, SelectQuery};
/// use lifeguard_relations::memory::MemoryStore;
/// use serde_json::json;
///
/// # fn main() -> Result<(), LifeError> {
/// let store = MemoryStore::new();
/// store.create_table("users", Some("id"));
/// store.seed("users", json!([{"name": "ada"}, {"name": "grace"}]))?;
///
/// let rows = store.select(&SelectQuery::new("users").where_in("id", [2]))?;
/// assert_eq!(rows[0]["name"], json!("grace"));
/// assert_eq!(store.select_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    tx_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, LifeError> {
        self.state
            .lock()
            .map_err(|_| LifeError::Other("memory store lock poisoned".to_string()))
    }

    /// Create (or reset) a table
    ///
    /// When `key` is set, inserts without a value for that column get the
    /// next integer id, and the column is unique.
    pub fn create_table(&self, name: &str, key: Option<&str>) {
        if let Ok(mut state) = self.lock() {
            state.tables.insert(
                name.to_string(),
                MemoryTable {
                    rows: Vec::new(),
                    next_id: 1,
                    key: key.map(str::to_string),
                    unique: Vec::new(),
                },
            );
        }
    }

    /// Declare a unique column set on `table`
    ///
    /// # Errors
    ///
    /// Returns `LifeError::QueryExecution` if the table does not exist.
    pub fn unique(&self, table: &str, columns: &[&str]) -> Result<(), LifeError> {
        let mut state = self.lock()?;
        state
            .table_mut(table)?
            .unique
            .push(columns.iter().map(|c| c.to_string()).collect());
        Ok(())
    }

    /// Insert fixture rows (a JSON object or an array of objects)
    ///
    /// Seeding is not recorded in the statement log.
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if a row is not an object or violates a constraint.
    pub fn seed(&self, table: &str, rows: Value) -> Result<Vec<Row>, LifeError> {
        let rows = match rows {
            Value::Array(items) => items,
            other => vec![other],
        };
        let rows = rows
            .into_iter()
            .map(|row| match row {
                Value::Object(map) => Ok(map),
                other => Err(LifeError::Other(format!("seed row is not an object: {other}"))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut state = self.lock()?;
        insert_rows(state.table_mut(table)?, table, rows)
    }

    /// Snapshot of every row in `table` (empty if the table does not exist)
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .ok()
            .and_then(|state| state.tables.get(table).map(|t| t.rows.clone()))
            .unwrap_or_default()
    }

    /// Every statement issued since creation or the last [`reset_counts`](Self::reset_counts)
    pub fn statements(&self) -> Vec<StatementRecord> {
        self.lock().map(|state| state.log.clone()).unwrap_or_default()
    }

    /// Number of statements issued
    pub fn statement_count(&self) -> usize {
        self.lock().map(|state| state.log.len()).unwrap_or_default()
    }

    /// Number of selects issued
    pub fn select_count(&self) -> usize {
        self.lock()
            .map(|state| {
                state
                    .log
                    .iter()
                    .filter(|r| r.kind == StatementKind::Select)
                    .count()
            })
            .unwrap_or_default()
    }

    /// Clear the statement log
    pub fn reset_counts(&self) {
        if let Ok(mut state) = self.lock() {
            state.log.clear();
        }
    }

    /// Make the next `kind` statement against `table` fail with `error`
    pub fn fail_next(&self, kind: StatementKind, table: &str, error: LifeError) {
        if let Ok(mut state) = self.lock() {
            state.faults.push(Fault {
                kind,
                table: table.to_string(),
                error,
            });
        }
    }

    fn run_select(&self, query: &SelectQuery) -> Result<Vec<Row>, LifeError> {
        let mut state = self.lock()?;
        state.record(StatementKind::Select, &query.table, render::to_sql(query))?;
        evaluate_select(&state, query, None)
    }

    fn run_insert(&self, statement: &InsertStatement) -> Result<(Vec<Row>, Undo), LifeError> {
        let sql = render::insert_statement(statement)?.to_string(PostgresQueryBuilder);
        let mut state = self.lock()?;
        state.record(StatementKind::Insert, &statement.table, sql)?;
        let table = state.table_mut(&statement.table)?;
        let inserted = insert_rows(table, &statement.table, statement.rows.clone())?;
        let undo = Undo::Insert {
            table: statement.table.clone(),
            rows: inserted.clone(),
        };
        Ok((inserted, undo))
    }

    fn run_update(&self, statement: &UpdateStatement) -> Result<(u64, Undo), LifeError> {
        let sql = render::update_statement(statement).to_string(PostgresQueryBuilder);
        let mut state = self.lock()?;
        state.record(StatementKind::Update, &statement.table, sql)?;

        let table = state.table(&statement.table)?;
        let mut matched = Vec::new();
        for (index, row) in table.rows.iter().enumerate() {
            if row_matches(&state, &statement.table, row, statement.filter.as_ref())? {
                matched.push(index);
            }
        }

        let mut updated = table.rows.clone();
        for &index in &matched {
            for (column, value) in &statement.values {
                updated[index].insert(column.clone(), value.clone());
            }
        }
        check_unique(table, &statement.table, &updated)?;
        let changes = matched
            .iter()
            .map(|&index| (table.rows[index].clone(), updated[index].clone()))
            .collect();

        state.table_mut(&statement.table)?.rows = updated;
        let undo = Undo::Update {
            table: statement.table.clone(),
            changes,
        };
        Ok((matched.len() as u64, undo))
    }

    fn run_delete(&self, statement: &DeleteStatement) -> Result<(u64, Undo), LifeError> {
        let sql = render::delete_statement(statement).to_string(PostgresQueryBuilder);
        let mut state = self.lock()?;
        state.record(StatementKind::Delete, &statement.table, sql)?;

        let table = state.table(&statement.table)?;
        let mut kept = Vec::with_capacity(table.rows.len());
        let mut removed = Vec::new();
        for (index, row) in table.rows.iter().enumerate() {
            if row_matches(&state, &statement.table, row, statement.filter.as_ref())? {
                removed.push((index, row.clone()));
            } else {
                kept.push(row.clone());
            }
        }
        let deleted = removed.len() as u64;
        state.table_mut(&statement.table)?.rows = kept;
        let undo = Undo::Delete {
            table: statement.table.clone(),
            rows: removed,
        };
        Ok((deleted, undo))
    }

    /// Run `work` in a transaction whose journal is handed to `parent` on commit
    fn run_scoped(&self, work: &mut TransactionWork<'_>, parent: Option<&Mutex<Vec<Undo>>>) -> Result<(), LifeError> {
        let tx = MemoryTransaction {
            store: self,
            journal: Mutex::new(Vec::new()),
        };
        let outcome = work(&tx);
        let journal = tx.journal.into_inner().map_err(|_| poisoned_journal())?;
        match outcome {
            Ok(()) => {
                if let Some(parent) = parent {
                    parent.lock().map_err(|_| poisoned_journal())?.extend(journal);
                }
                Ok(())
            }
            Err(err) => {
                log::debug!("memory store rolling back {} statements: {err}", journal.len());
                let mut state = self.lock()?;
                for undo in journal.into_iter().rev() {
                    undo.revert(&mut state);
                }
                Err(err)
            }
        }
    }
}

impl LifeExecutor for MemoryStore {
    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>, LifeError> {
        self.run_select(query)
    }

    fn insert(&self, statement: &InsertStatement) -> Result<Vec<Row>, LifeError> {
        self.run_insert(statement).map(|(rows, _)| rows)
    }

    fn update(&self, statement: &UpdateStatement) -> Result<u64, LifeError> {
        self.run_update(statement).map(|(updated, _)| updated)
    }

    fn delete(&self, statement: &DeleteStatement) -> Result<u64, LifeError> {
        self.run_delete(statement).map(|(deleted, _)| deleted)
    }

    fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), LifeError> {
        let _guard = self
            .tx_lock
            .lock()
            .map_err(|_| LifeError::Other("memory store transaction lock poisoned".to_string()))?;
        self.run_scoped(work, None)
    }
}

fn poisoned_journal() -> LifeError {
    LifeError::Other("memory store transaction journal poisoned".to_string())
}

/// Executor bound to an open [`MemoryStore`] transaction
///
/// Transactions are serialized against each other. Statements issued on the
/// store itself while one is open are not part of it and outlive its
/// rollback. Nested `transaction` calls keep their own journal, so an inner
/// rollback only undoes the inner work.
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    journal: Mutex<Vec<Undo>>,
}

impl MemoryTransaction<'_> {
    fn journal(&self, undo: Undo) -> Result<(), LifeError> {
        self.journal.lock().map_err(|_| poisoned_journal())?.push(undo);
        Ok(())
    }
}

impl LifeExecutor for MemoryTransaction<'_> {
    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>, LifeError> {
        self.store.run_select(query)
    }

    fn insert(&self, statement: &InsertStatement) -> Result<Vec<Row>, LifeError> {
        let (rows, undo) = self.store.run_insert(statement)?;
        self.journal(undo)?;
        Ok(rows)
    }

    fn update(&self, statement: &UpdateStatement) -> Result<u64, LifeError> {
        let (updated, undo) = self.store.run_update(statement)?;
        self.journal(undo)?;
        Ok(updated)
    }

    fn delete(&self, statement: &DeleteStatement) -> Result<u64, LifeError> {
        let (deleted, undo) = self.store.run_delete(statement)?;
        self.journal(undo)?;
        Ok(deleted)
    }

    fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), LifeError> {
        self.store.run_scoped(work, Some(&self.journal))
    }
}

fn insert_rows(table: &mut MemoryTable, name: &str, rows: Vec<Row>) -> Result<Vec<Row>, LifeError> {
    let mut next_id = table.next_id;
    let mut candidate = table.rows.clone();
    let mut inserted = Vec::with_capacity(rows.len());

    for mut row in rows {
        if let Some(key) = &table.key {
            match row.get(key).and_then(Value::as_i64) {
                Some(id) => next_id = next_id.max(id + 1),
                None if row.get(key).map_or(true, Value::is_null) => {
                    row.insert(key.clone(), Value::from(next_id));
                    next_id += 1;
                }
                None => {}
            }
        }
        candidate.push(row.clone());
        inserted.push(row);
    }

    check_unique(table, name, &candidate)?;
    table.rows = candidate;
    table.next_id = next_id;
    Ok(inserted)
}

fn check_unique(table: &MemoryTable, name: &str, rows: &[Row]) -> Result<(), LifeError> {
    let mut sets: Vec<Vec<String>> = table.unique.clone();
    if let Some(key) = &table.key {
        sets.push(vec![key.clone()]);
    }

    for columns in &sets {
        for (i, left) in rows.iter().enumerate() {
            let left_values: Vec<&Value> = columns
                .iter()
                .map(|c| left.get(c).unwrap_or(&Value::Null))
                .collect();
            if left_values.iter().any(|v| v.is_null()) {
                continue;
            }
            let duplicate = rows[i + 1..].iter().any(|right| {
                columns
                    .iter()
                    .zip(&left_values)
                    .all(|(c, l)| compare_values(l, right.get(c).unwrap_or(&Value::Null)) == Some(Ordering::Equal))
            });
            if duplicate {
                return Err(LifeError::ConstraintViolation(format!(
                    "duplicate key value violates unique constraint on {name}({})",
                    columns.join(", ")
                )));
            }
        }
    }
    Ok(())
}

/// Compare two values with SQL semantics: `NULL` compares as unknown
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (a, b) => Some(a.to_string().cmp(&b.to_string())),
    }
}

/// Total order used by ORDER BY: `NULL` sorts first
fn sort_order(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_values(left, right).unwrap_or(Ordering::Equal),
    }
}

/// Rows visible while evaluating an expression, innermost query first
struct Scope<'s> {
    bindings: Vec<(&'s str, &'s Row)>,
    parent: Option<&'s Scope<'s>>,
}

impl<'s> Scope<'s> {
    fn resolve(&self, column: &ColumnRef) -> Result<Value, LifeError> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            for (name, row) in &current.bindings {
                match &column.table {
                    Some(table) if table.as_str() == *name => {
                        return Ok(row.get(&column.column).cloned().unwrap_or(Value::Null));
                    }
                    None if row.contains_key(&column.column) => {
                        return Ok(row[&column.column].clone());
                    }
                    _ => {}
                }
            }
            scope = current.parent;
        }
        match &column.table {
            Some(table) => Err(LifeError::QueryExecution(format!(
                "missing FROM-clause entry for table \"{table}\""
            ))),
            None => Ok(Value::Null),
        }
    }
}

fn row_matches(
    state: &StoreState,
    table: &str,
    row: &Row,
    filter: Option<&Predicate>,
) -> Result<bool, LifeError> {
    let scope = Scope {
        bindings: vec![(table, row)],
        parent: None,
    };
    match filter {
        Some(predicate) => Ok(evaluate(state, &scope, predicate)? == Some(true)),
        None => Ok(true),
    }
}

fn evaluate(state: &StoreState, scope: &Scope<'_>, predicate: &Predicate) -> Result<Option<bool>, LifeError> {
    Ok(match predicate {
        Predicate::Compare { column, op, operand } => {
            let left = scope.resolve(column)?;
            let right = match operand {
                Operand::Value(v) => v.clone(),
                Operand::Column(c) => scope.resolve(c)?,
            };
            compare_values(&left, &right).map(|ordering| op.matches(ordering))
        }
        Predicate::In { column, values } => {
            let left = scope.resolve(column)?;
            if left.is_null() {
                None
            } else if values
                .iter()
                .any(|v| compare_values(&left, v) == Some(Ordering::Equal))
            {
                Some(true)
            } else if values.iter().any(Value::is_null) {
                None
            } else {
                Some(false)
            }
        }
        Predicate::IsNull(column) => Some(scope.resolve(column)?.is_null()),
        Predicate::IsNotNull(column) => Some(!scope.resolve(column)?.is_null()),
        Predicate::All(parts) => {
            let mut result = Some(true);
            for part in parts {
                match evaluate(state, scope, part)? {
                    Some(false) => return Ok(Some(false)),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        Predicate::Any(parts) => {
            let mut result = Some(false);
            for part in parts {
                match evaluate(state, scope, part)? {
                    Some(true) => return Ok(Some(true)),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
        Predicate::Not(inner) => evaluate(state, scope, inner)?.map(|b| !b),
        Predicate::Exists(query) => Some(!evaluate_select(state, query, Some(scope))?.is_empty()),
        Predicate::CountCompare { query, op, count } => {
            let found = matching_bindings(state, query, Some(scope))?.len() as i64;
            Some(op.compare_counts(found, *count))
        }
    })
}

/// Rows of `query` after joins and filtering, before ordering and projection
fn matching_bindings<'s>(
    state: &'s StoreState,
    query: &'s SelectQuery,
    parent: Option<&Scope<'_>>,
) -> Result<Vec<Vec<(&'s str, &'s Row)>>, LifeError> {
    let primary = state.table(&query.table)?;
    let mut combos: Vec<Vec<(&str, &Row)>> = primary
        .rows
        .iter()
        .map(|row| vec![(query.source_name(), row)])
        .collect();

    for join in &query.joins {
        let joined = state.table(&join.table)?;
        let mut next = Vec::new();
        for combo in &combos {
            for row in &joined.rows {
                let mut candidate = combo.clone();
                candidate.push((join.source_name(), row));
                let scope = Scope {
                    bindings: candidate.clone(),
                    parent,
                };
                if evaluate(state, &scope, &join.on)? == Some(true) {
                    next.push(candidate);
                }
            }
        }
        combos = next;
    }

    if let Some(filter) = &query.filter {
        let mut kept = Vec::with_capacity(combos.len());
        for combo in combos {
            let scope = Scope {
                bindings: combo.clone(),
                parent,
            };
            if evaluate(state, &scope, filter)? == Some(true) {
                kept.push(combo);
            }
        }
        combos = kept;
    }

    Ok(combos)
}

fn evaluate_select(
    state: &StoreState,
    query: &SelectQuery,
    parent: Option<&Scope<'_>>,
) -> Result<Vec<Row>, LifeError> {
    let combos = matching_bindings(state, query, parent)?;

    let mut keyed = Vec::with_capacity(combos.len());
    for combo in combos {
        let scope = Scope {
            bindings: combo.clone(),
            parent,
        };
        let mut keys = Vec::with_capacity(query.order_by.len());
        for (column, _) in &query.order_by {
            keys.push(scope.resolve(column)?);
        }
        keyed.push((keys, combo));
    }

    keyed.sort_by(|(left, _), (right, _)| {
        for ((l, r), (_, order)) in left.iter().zip(right).zip(&query.order_by) {
            let ordering = match order {
                Order::Asc => sort_order(l, r),
                Order::Desc => sort_order(r, l),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    let offset = query.offset.unwrap_or(0) as usize;
    let limit = query.limit.map_or(usize::MAX, |l| l as usize);

    let mut rows = Vec::new();
    for (_, combo) in keyed.into_iter().skip(offset).take(limit) {
        let scope = Scope {
            bindings: combo,
            parent,
        };
        rows.push(project(state, query, &scope)?);
    }
    Ok(rows)
}

fn project(state: &StoreState, query: &SelectQuery, scope: &Scope<'_>) -> Result<Row, LifeError> {
    let mut out = Row::new();
    if query.projections.is_empty() {
        for (_, row) in &scope.bindings {
            for (column, value) in row.iter() {
                out.entry(column.clone()).or_insert_with(|| value.clone());
            }
        }
        return Ok(out);
    }

    for projection in &query.projections {
        match projection {
            Projection::AllColumns(None) => {
                for (_, row) in &scope.bindings {
                    for (column, value) in row.iter() {
                        out.entry(column.clone()).or_insert_with(|| value.clone());
                    }
                }
            }
            Projection::AllColumns(Some(table)) => {
                let (_, row) = scope
                    .bindings
                    .iter()
                    .find(|(name, _)| *name == table.as_str())
                    .ok_or_else(|| {
                        LifeError::QueryExecution(format!("missing FROM-clause entry for table \"{table}\""))
                    })?;
                for (column, value) in row.iter() {
                    out.insert(column.clone(), value.clone());
                }
            }
            Projection::Column { column, alias } => {
                let name = alias.clone().unwrap_or_else(|| column.column.clone());
                out.insert(name, scope.resolve(column)?);
            }
            Projection::CountOf { query, alias } => {
                let count = matching_bindings(state, query, Some(scope))?.len();
                out.insert(alias.clone(), Value::from(count as i64));
            }
        }
    }
    Ok(out)
}
