//! Per-source state blobs.
//!
//! # Responsibility
//! - Hold each source's free-form continuation state between runs.
//! - Expose an explicit load/mutate/flush cycle.
//!
//! # Invariants
//! - Loading a missing blob yields an empty one; it is never an error.
//! - Mutations stay in memory until `flush_state` is called.

use crate::repo::item_repo::RepoResult;
use serde_json::{Map, Value};

/// Key the engine stamps after every completed cycle.
pub const LAST_UPDATED_KEY: &str = "last_updated";

/// In-memory view of one source's state blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceState {
    cell: String,
    values: Map<String, Value>,
}

impl SourceState {
    pub fn new(cell: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            cell: cell.into(),
            values,
        }
    }

    pub fn cell(&self) -> &str {
        &self.cell
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn last_updated(&self) -> Option<i64> {
        self.get_i64(LAST_UPDATED_KEY)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// Repository interface for cells and their state blobs.
pub trait StateRepository {
    /// Creates the cell and an empty state blob if missing. Idempotent.
    fn ensure_cell(&self, name: &str) -> RepoResult<()>;
    fn load_state(&self, name: &str) -> RepoResult<SourceState>;
    fn flush_state(&self, state: &SourceState) -> RepoResult<()>;
}
