//! Source adapter contract.
//!
//! Sources are statically linked and selected by name from a
//! [`SourceRegistry`](crate::source::registry::SourceRegistry). Only
//! `fetch_new` is required; lifecycle hooks are opt-in capabilities that the
//! engine checks before dispatching.

use crate::model::item::{CandidateItem, Item};
use crate::repo::state_repo::SourceState;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SourceResult<T> = Result<T, SourceError>;

/// Optional hook a source may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceCapability {
    OnCreate,
    OnDelete,
    Callback,
}

impl SourceCapability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnCreate => "on_create",
            Self::OnDelete => "on_delete",
            Self::Callback => "callback",
        }
    }
}

impl Display for SourceCapability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure raised by a source's fetch or hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    pub message: String,
    pub detail: Option<String>,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn unsupported(source_id: &str, capability: SourceCapability) -> Self {
        Self::new(format!("source `{source_id}` does not implement {capability}"))
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl Error for SourceError {}

impl From<String> for SourceError {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SourceError {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Data source producing candidate items.
pub trait ItemSource: Send + Sync {
    /// Registered name; also the default target cell.
    fn source_id(&self) -> &str;

    /// Produces the current batch of candidates.
    ///
    /// The only place a source performs network or other long-running IO.
    /// State mutations are flushed whether or not the fetch succeeds.
    fn fetch_new(&self, state: &mut SourceState) -> SourceResult<Vec<CandidateItem>>;

    /// Hooks this source implements.
    fn capabilities(&self) -> &[SourceCapability] {
        &[]
    }

    fn supports(&self, capability: SourceCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn on_create(&self, _state: &mut SourceState, _item: &Item) -> SourceResult<()> {
        Err(SourceError::unsupported(
            self.source_id(),
            SourceCapability::OnCreate,
        ))
    }

    /// An error vetoes the deletion for this cycle.
    fn on_delete(&self, _state: &mut SourceState, _item: &Item) -> SourceResult<()> {
        Err(SourceError::unsupported(
            self.source_id(),
            SourceCapability::OnDelete,
        ))
    }

    /// Operator-triggered action; item mutations are saved afterwards.
    fn callback(&self, _state: &mut SourceState, _item: &mut Item) -> SourceResult<()> {
        Err(SourceError::unsupported(
            self.source_id(),
            SourceCapability::Callback,
        ))
    }
}
