//! Transaction Module
//!
//! Typed convenience over [`LifeExecutor::transaction`]. Pivot mutations and
//! relation persistence run their statements through [`transaction`], so a
//! failing statement rolls back every statement issued before it in the
//! same call.

use crate::executor::{LifeError, LifeExecutor};

/// Run `work` inside a transaction and return its value
///
/// `work` receives the transaction-bound executor. Returning `Err` rolls
/// back everything issued through it, and the error is returned unchanged.
///
/// # Example
///
/// ```
/// use lifeguard_relations::{InsertStatement, LifeError, LifeExecutor};
/// use lifeguard_relations::memory::MemoryStore;
/// use lifeguard_relations::transaction::transaction;
/// use serde_json::json;
///
/// # fn main() -> Result<(), LifeError> {
/// let store = MemoryStore::new();
/// store.create_table("tags", Some("id"));
///
/// let result: Result<(), LifeError> = transaction(&store, |tx| {
///     let row = json!({"name": "rust"}).as_object().cloned().unwrap_or_default();
///     tx.insert(&InsertStatement::new("tags").row(row))?;
///     Err(LifeError::Other("abort".to_string()))
/// });
///
/// assert!(result.is_err());
/// assert!(store.rows("tags").is_empty());
/// # Ok(())
/// # }
/// ```
pub fn transaction<T, F>(executor: &dyn LifeExecutor, work: F) -> Result<T, LifeError>
where
    F: FnOnce(&dyn LifeExecutor) -> Result<T, LifeError>,
{
    let mut work = Some(work);
    let mut output: Option<T> = None;

    executor.transaction(&mut |tx: &dyn LifeExecutor| {
        let work = work
            .take()
            .ok_or_else(|| LifeError::Other("Transaction body invoked twice".to_string()))?;
        output = Some(work(tx)?);
        Ok(())
    })?;

    output.ok_or_else(|| LifeError::Other("Transaction committed without a result".to_string()))
}
