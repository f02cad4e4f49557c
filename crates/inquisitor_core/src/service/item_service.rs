//! Operator-facing item use-cases.
//!
//! # Responsibility
//! - Provide the entry points presentation and CLI layers call: deactivate,
//!   list active items, add ad-hoc items.
//! - Delegate persistence to repository implementations.
//!
//! # Invariants
//! - Service APIs never bypass repository persistence contracts.
//! - Deactivation is the only path that sets `active = false`.

use crate::model::item::{CandidateItem, Item, ItemPatch};
use crate::repo::item_repo::{ActiveItemQuery, ActiveItems, ItemRepository, RepoResult};
use crate::service::error_report::random_item_id;
use crate::source::registry::INQUISITOR_SOURCE_ID;
use log::{info, warn};

/// Use-case service wrapper for operator item actions.
pub struct ItemService<R: ItemRepository> {
    repo: R,
}

impl<R: ItemRepository> ItemService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Marks one item inactive so the next cycle may remove it.
    pub fn deactivate(&self, source: &str, id: &str) -> RepoResult<Item> {
        let item = self.repo.update_item(source, id, ItemPatch::deactivate())?;
        info!(
            "event=item_deactivate module=service status=ok source={} id={}",
            source, id
        );
        Ok(item)
    }

    /// Deactivates every active item in a cell.
    ///
    /// Unreadable items are logged and skipped. Returns the number of items
    /// that changed state.
    pub fn deactivate_cell(&self, source: &str) -> RepoResult<usize> {
        let ids = self.repo.list_item_ids(source)?;
        if ids.is_empty() {
            warn!(
                "event=cell_deactivate module=service status=empty source={}",
                source
            );
        }

        let mut count = 0;
        for id in &ids {
            let item = match self.repo.load_item(source, id) {
                Ok(item) => item,
                Err(err) => {
                    warn!(
                        "event=cell_deactivate module=service status=skipped source={} id={} error={}",
                        source, id, err
                    );
                    continue;
                }
            };
            if item.active {
                self.repo.update_item(source, id, ItemPatch::deactivate())?;
                count += 1;
            }
        }
        info!(
            "event=cell_deactivate module=service status=ok source={} count={}",
            source, count
        );
        Ok(count)
    }

    /// Lists items visible now, across all or selected cells.
    pub fn list_active(&self, query: &ActiveItemQuery) -> RepoResult<ActiveItems> {
        self.repo.list_active_items(query)
    }

    /// Creates an item outside any source's fetch.
    ///
    /// # Contract
    /// - Missing `source` targets the `inquisitor` cell.
    /// - Empty `id` gets a random 16-hex-digit id.
    pub fn add_item(&self, mut candidate: CandidateItem) -> RepoResult<Item> {
        if candidate.id.is_empty() {
            candidate.id = random_item_id();
        }
        let source = candidate
            .source
            .clone()
            .unwrap_or_else(|| INQUISITOR_SOURCE_ID.to_string());
        let item = self.repo.create_item(&source, candidate)?;
        info!(
            "event=item_add module=service status=ok source={} id={}",
            item.source, item.id
        );
        Ok(item)
    }
}
