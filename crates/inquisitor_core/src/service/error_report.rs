//! Error reporting sink.
//!
//! # Responsibility
//! - Turn engine and source failures into items in the `inquisitor` cell so
//!   operators see them in the same feed as regular content.
//! - Log every reported failure at error level.
//!
//! # Invariants
//! - Reporting never panics and never propagates; a failure to write the
//!   error item is logged and swallowed.

use crate::model::item::{CandidateItem, Item};
use crate::repo::item_repo::{ItemRepository, RepoError};
use crate::source::registry::INQUISITOR_SOURCE_ID;
use log::error;
use std::error::Error;
use uuid::Uuid;

const ERROR_TAG: &str = "error";
const MAX_ID_ATTEMPTS: usize = 3;

/// Writes failures as items into the error cell.
pub struct ErrorReporter<'a, R: ItemRepository> {
    repo: &'a R,
}

impl<'a, R: ItemRepository> ErrorReporter<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    /// Records one failure as an error item.
    ///
    /// Returns the created item, or `None` when even that write failed.
    pub fn report(&self, title: &str, detail: Option<&str>) -> Option<Item> {
        error!(
            "event=error_report module=service status=error title={:?} detail={:?}",
            title,
            detail.unwrap_or("")
        );

        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = error_candidate(random_item_id(), title, detail);
            match self.repo.create_item(INQUISITOR_SOURCE_ID, candidate) {
                Ok(item) => return Some(item),
                Err(RepoError::AlreadyExists { .. }) => continue,
                Err(err) => {
                    error!(
                        "event=error_report module=service status=write_failed title={:?} error={}",
                        title, err
                    );
                    return None;
                }
            }
        }
        None
    }

    /// Records a failure with its full error chain as detail.
    pub fn report_error(&self, title: &str, err: &dyn Error) -> Option<Item> {
        self.report(title, Some(&describe_error(err)))
    }
}

/// Renders an error and its `source()` chain, one cause per line.
pub fn describe_error(err: &dyn Error) -> String {
    let mut text = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        text.push_str("\ncaused by: ");
        text.push_str(&inner.to_string());
        cause = inner.source();
    }
    text
}

/// 16 hex digits, the same shape as ad-hoc item ids.
pub(crate) fn random_item_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

fn error_candidate(id: String, title: &str, detail: Option<&str>) -> CandidateItem {
    let mut candidate = CandidateItem::new(id)
        .with_source(INQUISITOR_SOURCE_ID)
        .with_title(title);
    candidate.tags = Some(vec![
        INQUISITOR_SOURCE_ID.to_string(),
        ERROR_TAG.to_string(),
    ]);
    candidate.body = detail.map(|detail| format!("<pre>{}</pre>", escape_html(detail)));
    candidate
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}
