//! Core domain logic for Inquisitor.
//! This crate owns the item store, per-source state and the reconciliation
//! cycle that keeps both in sync with external sources.

pub mod clock;
pub mod config;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod source;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ConfigResult, CoreConfig};
pub use logging::{default_log_level, init_logging, level_for_verbosity, logging_status};
pub use model::item::{
    merge_callback, CallbackData, CandidateItem, InvalidIdentity, Item, ItemPatch,
};
pub use repo::file_store::FileStore;
pub use repo::item_repo::{
    ActiveItemQuery, ActiveItems, ItemRepository, ListDiagnostic, RepoError, RepoResult,
};
pub use repo::state_repo::{SourceState, StateRepository, LAST_UPDATED_KEY};
pub use service::error_report::{describe_error, ErrorReporter};
pub use service::item_service::ItemService;
pub use service::reconcile::{Reconciler, SourceUpdateOutcome, UpdateCounts, UpdateError};
pub use source::adapter::{ItemSource, SourceCapability, SourceError, SourceResult};
pub use source::registry::{
    InquisitorSource, RegistryError, SourceRegistry, INQUISITOR_SOURCE_ID,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
