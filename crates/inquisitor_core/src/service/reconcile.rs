//! Reconciliation engine.
//!
//! # Responsibility
//! - Run one update cycle per source: fetch, classify, create, refresh,
//!   remove, finalize.
//! - Convert failures into error items instead of aborting a batch.
//!
//! # Invariants
//! - Steps run strictly in order and each step's writes are durable before
//!   the next begins; removals always see the post-create store.
//! - Source state is flushed right after the fetch, whatever its outcome.
//! - A refresh never touches `id`, `source`, `active` or `created`.
//! - Refreshes apply to active items only; inactive re-fetched items keep
//!   their stored content but still count as present in the fetch.
//! - Per-item failures are reported and skipped; only adapter resolution,
//!   cell setup, fetch and state IO abort a cycle.
//! - No cancellation: a blocking fetch blocks the whole batch.

use crate::clock::Clock;
use crate::model::item::{merge_callback, CandidateItem, Item};
use crate::repo::item_repo::{ItemRepository, RepoError, RepoResult};
use crate::repo::state_repo::{SourceState, StateRepository, LAST_UPDATED_KEY};
use crate::service::error_report::{describe_error, ErrorReporter};
use crate::source::adapter::{ItemSource, SourceCapability, SourceError};
use crate::source::registry::{RegistryError, SourceRegistry};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Per-cycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateCounts {
    pub new_count: usize,
    pub updated_count: usize,
    pub deleted_count: usize,
}

/// Failure that aborts one source's cycle.
#[derive(Debug)]
pub enum UpdateError {
    /// No source registered under the requested name.
    AdapterLoad(RegistryError),
    /// The source lacks a capability the operation needs.
    AdapterContract {
        source_id: String,
        capability: SourceCapability,
    },
    /// The cell or its state blob could not be initialized.
    Init(RepoError),
    Fetch {
        source_id: String,
        error: SourceError,
    },
    Callback {
        source_id: String,
        error: SourceError,
    },
    State(RepoError),
    Store(RepoError),
}

impl Display for UpdateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterLoad(err) => write!(f, "{err}"),
            Self::AdapterContract {
                source_id,
                capability,
            } => write!(f, "source `{source_id}` does not implement {capability}"),
            Self::Init(err) => write!(f, "cell initialization failed: {err}"),
            Self::Fetch { source_id, error } => {
                write!(f, "fetch failed for source `{source_id}`: {error}")
            }
            Self::Callback { source_id, error } => {
                write!(f, "callback failed for source `{source_id}`: {error}")
            }
            Self::State(err) => write!(f, "source state persistence failed: {err}"),
            Self::Store(err) => write!(f, "item store failed: {err}"),
        }
    }
}

impl Error for UpdateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::AdapterLoad(err) => Some(err),
            Self::AdapterContract { .. } => None,
            Self::Fetch { error, .. } | Self::Callback { error, .. } => Some(error),
            Self::Init(err) | Self::State(err) | Self::Store(err) => Some(err),
        }
    }
}

/// Result of one source within a batch.
#[derive(Debug)]
pub struct SourceUpdateOutcome {
    pub source_id: String,
    pub result: Result<UpdateCounts, UpdateError>,
}

/// Update engine over a store, a source registry and a clock.
pub struct Reconciler<S> {
    store: S,
    registry: SourceRegistry,
    clock: Arc<dyn Clock>,
}

impl<S: ItemRepository + StateRepository> Reconciler<S> {
    pub fn new(store: S, registry: SourceRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            registry,
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Updates each named source in order.
    ///
    /// A failed cycle is reported as one error item and the batch moves on.
    pub fn update_sources<I, N>(&self, source_ids: I) -> Vec<SourceUpdateOutcome>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        source_ids
            .into_iter()
            .map(|source_id| {
                let source_id = source_id.as_ref().trim().to_string();
                let result = self.update_source(&source_id);
                SourceUpdateOutcome { source_id, result }
            })
            .collect()
    }

    /// Runs one reconciliation cycle.
    ///
    /// A cycle-level failure is reported as one error item and also
    /// returned; per-item failures inside the cycle are reported as they
    /// happen and do not fail the cycle.
    pub fn update_source(&self, source_id: &str) -> Result<UpdateCounts, UpdateError> {
        let source_id = source_id.trim();
        let result = self.run_update(source_id);
        if let Err(err) = &result {
            ErrorReporter::new(&self.store)
                .report(&failure_title(source_id, err), Some(&describe_error(err)));
        }
        result
    }

    /// Runs a source's callback against one stored item.
    ///
    /// Failures are reported as an error item and also returned.
    pub fn invoke_callback(&self, source_id: &str, item_id: &str) -> Result<Item, UpdateError> {
        let source_id = source_id.trim();
        let result = self.run_callback(source_id, item_id);
        if let Err(err) = &result {
            ErrorReporter::new(&self.store).report(
                &format!("Error executing callback for {source_id}/{item_id}"),
                Some(&describe_error(err)),
            );
        }
        result
    }

    fn run_update(&self, source_id: &str) -> Result<UpdateCounts, UpdateError> {
        let source = self
            .registry
            .resolve(source_id)
            .map_err(UpdateError::AdapterLoad)?;
        self.store.ensure_cell(source_id).map_err(UpdateError::Init)?;

        let started_at = Instant::now();
        info!(
            "event=source_update module=service status=start source={}",
            source_id
        );
        let counts = self.run_cycle(source_id, source.as_ref())?;
        info!(
            "event=source_update module=service status=ok source={} new={} updated={} deleted={} duration_ms={}",
            source_id,
            counts.new_count,
            counts.updated_count,
            counts.deleted_count,
            started_at.elapsed().as_millis()
        );
        Ok(counts)
    }

    fn run_cycle(
        &self,
        source_id: &str,
        source: &dyn ItemSource,
    ) -> Result<UpdateCounts, UpdateError> {
        let reporter = ErrorReporter::new(&self.store);

        // Store truth: sources may write into other cells, so no cached view.
        let prior_ids = self
            .store
            .list_item_ids(source_id)
            .map_err(UpdateError::Store)?;
        debug!(
            "event=source_update module=service status=prior source={} items={}",
            source_id,
            prior_ids.len()
        );

        let mut state = self
            .store
            .load_state(source_id)
            .map_err(UpdateError::State)?;
        let fetched = self.fetch(source_id, source, &mut state)?;
        debug!(
            "event=source_update module=service status=fetched source={} items={}",
            source_id,
            fetched.len()
        );

        let mut new_items = Vec::new();
        let mut refreshed = Vec::new();
        for candidate in dedupe_candidates(source_id, fetched) {
            let target = candidate.target_cell(source_id).to_string();
            match self.store.exists(&target, &candidate.id) {
                Ok(true) => refreshed.push(candidate),
                Ok(false) => new_items.push(candidate),
                Err(err) => {
                    reporter.report_error(
                        &format!(
                            "Rejected item {target}/{} from source \"{source_id}\"",
                            candidate.id
                        ),
                        &err,
                    );
                }
            }
        }

        let mut counts = UpdateCounts::default();

        let on_create = source.supports(SourceCapability::OnCreate);
        for candidate in new_items {
            let target = candidate.target_cell(source_id).to_string();
            let id = candidate.id.clone();
            let item = match self.store.create_item(source_id, candidate) {
                Ok(item) => item,
                Err(err) => {
                    reporter.report_error(&format!("Failed to create {target}/{id}"), &err);
                    continue;
                }
            };
            counts.new_count += 1;
            // A failing hook never undoes the create.
            if on_create {
                if let Err(err) = source.on_create(&mut state, &item) {
                    reporter.report_error(&format!("Exception in {source_id}.on_create"), &err);
                }
            }
        }

        let mut seen = BTreeSet::new();
        for candidate in &refreshed {
            let target = candidate.target_cell(source_id);
            if target == source_id {
                seen.insert(candidate.id.clone());
            }
            match self.refresh_item(target, candidate) {
                Ok(true) => counts.updated_count += 1,
                Ok(false) => {}
                Err(err) => {
                    reporter.report_error(
                        &format!("Failed to update {target}/{}", candidate.id),
                        &err,
                    );
                }
            }
        }

        let now = self.clock.now();
        let on_delete = source.supports(SourceCapability::OnDelete);
        for id in prior_ids.difference(&seen) {
            let item = match self.store.load_item(source_id, id) {
                Ok(item) => item,
                Err(err) if err.is_not_found() => continue,
                Err(err) => {
                    reporter.report_error(&format!("Failed to load {source_id}/{id}"), &err);
                    continue;
                }
            };
            if !item.is_removable_at(now) {
                continue;
            }
            if on_delete {
                if let Err(err) = source.on_delete(&mut state, &item) {
                    reporter.report_error(&format!("Failed to delete {source_id}/{id}"), &err);
                    continue;
                }
            }
            match self.store.delete_item(source_id, id) {
                Ok(()) => counts.deleted_count += 1,
                Err(err) => {
                    reporter.report_error(&format!("Failed to delete {source_id}/{id}"), &err);
                }
            }
        }

        state.set(LAST_UPDATED_KEY, self.clock.now());
        self.store
            .flush_state(&state)
            .map_err(UpdateError::State)?;

        info!(
            "{} new item{}, {} deleted item{}",
            counts.new_count,
            plural(counts.new_count),
            counts.deleted_count,
            plural(counts.deleted_count)
        );
        Ok(counts)
    }

    fn fetch(
        &self,
        source_id: &str,
        source: &dyn ItemSource,
        state: &mut SourceState,
    ) -> Result<Vec<CandidateItem>, UpdateError> {
        let fetched = source.fetch_new(state);
        let flushed = self.store.flush_state(state);
        match (fetched, flushed) {
            (Ok(items), Ok(())) => Ok(items),
            (Ok(_), Err(err)) => Err(UpdateError::State(err)),
            (Err(error), flushed) => {
                if let Err(err) = flushed {
                    warn!(
                        "event=state_flush module=service status=error source={} error={}",
                        source_id, err
                    );
                }
                Err(UpdateError::Fetch {
                    source_id: source_id.to_string(),
                    error,
                })
            }
        }
    }

    /// Refreshes a stored item from a re-fetched candidate.
    ///
    /// Returns whether the stored record changed.
    fn refresh_item(&self, target: &str, candidate: &CandidateItem) -> RepoResult<bool> {
        let existing = self.store.load_item(target, &candidate.id)?;
        if !existing.active {
            return Ok(false);
        }

        let mut patch = candidate.refresh_patch();
        if let Some(callback) = &candidate.callback {
            patch.callback = Some(merge_callback(existing.callback.as_ref(), callback));
        }
        let updated = self.store.update_item(target, &candidate.id, patch)?;
        Ok(updated != existing)
    }

    fn run_callback(&self, source_id: &str, item_id: &str) -> Result<Item, UpdateError> {
        let source = self
            .registry
            .resolve(source_id)
            .map_err(UpdateError::AdapterLoad)?;
        if !source.supports(SourceCapability::Callback) {
            return Err(UpdateError::AdapterContract {
                source_id: source_id.to_string(),
                capability: SourceCapability::Callback,
            });
        }

        let mut state = self
            .store
            .load_state(source_id)
            .map_err(UpdateError::State)?;
        let mut item = self
            .store
            .load_item(source_id, item_id)
            .map_err(UpdateError::Store)?;

        source
            .callback(&mut state, &mut item)
            .map_err(|error| UpdateError::Callback {
                source_id: source_id.to_string(),
                error,
            })?;

        // A callback cannot move an item to another identity.
        item.id = item_id.to_string();
        item.source = source_id.to_string();
        let saved = self.store.save_item(&item).map_err(UpdateError::Store)?;
        self.store
            .flush_state(&state)
            .map_err(UpdateError::State)?;
        info!(
            "event=item_callback module=service status=ok source={} id={}",
            source_id, item_id
        );
        Ok(saved)
    }
}

/// Collapses repeated `(cell, id)` pairs: the last candidate wins and takes
/// the position of the first.
fn dedupe_candidates(source_id: &str, fetched: Vec<CandidateItem>) -> Vec<CandidateItem> {
    let mut positions: HashMap<(String, String), usize> = HashMap::new();
    let mut unique: Vec<CandidateItem> = Vec::with_capacity(fetched.len());
    for candidate in fetched {
        let key = (
            candidate.target_cell(source_id).to_string(),
            candidate.id.clone(),
        );
        match positions.get(&key) {
            Some(&index) => {
                warn!(
                    "event=source_update module=service status=duplicate source={} cell={} id={}",
                    source_id, key.0, key.1
                );
                unique[index] = candidate;
            }
            None => {
                positions.insert(key, unique.len());
                unique.push(candidate);
            }
        }
    }
    unique
}

fn failure_title(source_id: &str, err: &UpdateError) -> String {
    match err {
        UpdateError::AdapterLoad(_) => format!("Error importing source \"{source_id}\""),
        UpdateError::Init(_) => format!("Error initializing source \"{source_id}\""),
        _ => format!("Error updating source \"{source_id}\""),
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
