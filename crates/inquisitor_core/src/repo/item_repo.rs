//! Item repository contract and shared persistence errors.
//!
//! # Responsibility
//! - Define the item store operations the engine and operators rely on.
//! - Keep storage layout details behind the repository boundary.
//!
//! # Invariants
//! - `(source, id)` identifies at most one stored record.
//! - Every mutating call is durable before it returns.
//! - Read paths reject unparsable records instead of masking them.

use crate::model::item::{CandidateItem, InvalidIdentity, Item, ItemPatch};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence error for items, cells and source state.
#[derive(Debug)]
pub enum RepoError {
    InvalidIdentity(InvalidIdentity),
    NotFound { source: String, id: String },
    AlreadyExists { source: String, id: String },
    CorruptRecord { path: PathBuf, message: String },
    Io { path: PathBuf, error: io::Error },
}

impl RepoError {
    pub(crate) fn io(path: impl Into<PathBuf>, error: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentity(err) => write!(f, "{err}"),
            Self::NotFound { source, id } => write!(f, "item not found: {source}/{id}"),
            Self::AlreadyExists { source, id } => write!(f, "item already exists: {source}/{id}"),
            Self::CorruptRecord { path, message } => {
                write!(f, "corrupt record `{}`: {message}", path.display())
            }
            Self::Io { path, error } => write!(f, "io error on `{}`: {error}", path.display()),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidIdentity(err) => Some(err),
            Self::Io { error, .. } => Some(error),
            Self::NotFound { .. } | Self::AlreadyExists { .. } | Self::CorruptRecord { .. } => None,
        }
    }
}

impl From<InvalidIdentity> for RepoError {
    fn from(value: InvalidIdentity) -> Self {
        Self::InvalidIdentity(value)
    }
}

/// Filter for active listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveItemQuery {
    /// Restrict to these cells; `None` means every cell.
    pub sources: Option<BTreeSet<String>>,
    /// Restrict to items carrying this tag.
    pub tag: Option<String>,
}

impl ActiveItemQuery {
    pub fn for_sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: Some(sources.into_iter().map(Into::into).collect()),
            tag: None,
        }
    }

    pub fn includes_source(&self, source: &str) -> bool {
        match &self.sources {
            Some(sources) => sources.contains(source),
            None => true,
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        if !self.includes_source(&item.source) {
            return false;
        }
        match &self.tag {
            Some(tag) => item.tags.iter().any(|value| value == tag),
            None => true,
        }
    }
}

/// Unreadable record skipped during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDiagnostic {
    pub path: PathBuf,
    pub message: String,
}

/// Active listing result with per-record diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveItems {
    /// Sorted by `(created, source, id)`.
    pub items: Vec<Item>,
    pub errors: Vec<ListDiagnostic>,
}

/// Repository interface for item persistence.
pub trait ItemRepository {
    fn exists(&self, source: &str, id: &str) -> RepoResult<bool>;
    fn load_item(&self, source: &str, id: &str) -> RepoResult<Item>;
    /// Creates a record under `source` unless the candidate names another cell.
    fn create_item(&self, source: &str, candidate: CandidateItem) -> RepoResult<Item>;
    fn update_item(&self, source: &str, id: &str, patch: ItemPatch) -> RepoResult<Item>;
    /// Overwrites an existing record, keeping its stored `id/source/created`.
    fn save_item(&self, item: &Item) -> RepoResult<Item>;
    fn delete_item(&self, source: &str, id: &str) -> RepoResult<()>;
    fn list_item_ids(&self, source: &str) -> RepoResult<BTreeSet<String>>;
    fn list_active_items(&self, query: &ActiveItemQuery) -> RepoResult<ActiveItems>;
}
