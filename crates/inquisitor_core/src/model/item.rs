//! Item domain model.
//!
//! # Responsibility
//! - Define the canonical stored record (`Item`) and the adapter-facing
//!   candidate shape (`CandidateItem`).
//! - Provide field-level patches used by write-through updates.
//! - Validate identities before they become storage paths.
//!
//! # Invariants
//! - `active` starts `true`; only operator actions set it `false`.
//! - `tags` defaults to `[source]` only when absent; an explicit empty list
//!   is preserved.
//! - Callback maps merge first-write-wins per key.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Adapter-private correlation data round-tripped between fetch cycles.
pub type CallbackData = Map<String, Value>;

/// Cell and item ids become file names, so path syntax is rejected.
static IDENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^./\\\x00][^/\\\x00]*$").expect("valid identity regex"));

/// Stored content record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub source: String,
    pub active: bool,
    /// Unix seconds, set once by the store.
    pub created: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Unix seconds supplied by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Protects an inactive item from removal until `created + ttl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    /// Forces removal once `created + ttd` has passed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttd: Option<i64>,
    /// Hides the item from listings until `created + tts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackData>,
}

impl Item {
    /// Builds a fresh record from a candidate.
    ///
    /// # Invariants
    /// - `active` is forced to `true` and `created` to `now`.
    /// - `title` falls back to `id`; absent `tags` fall back to `[source]`.
    pub fn from_candidate(source: &str, candidate: CandidateItem, now: i64) -> Self {
        let source = candidate.source.unwrap_or_else(|| source.to_string());
        let title = candidate.title.unwrap_or_else(|| candidate.id.clone());
        let tags = candidate.tags.unwrap_or_else(|| vec![source.clone()]);
        Self {
            id: candidate.id,
            source,
            active: true,
            created: now,
            title,
            link: candidate.link,
            time: candidate.time,
            author: candidate.author,
            body: candidate.body,
            tags,
            ttl: candidate.ttl,
            ttd: candidate.ttd,
            tts: candidate.tts,
            callback: candidate.callback,
        }
    }

    /// Whether the item belongs in active listings at `now`.
    pub fn is_visible_at(&self, now: i64) -> bool {
        if !self.active {
            return false;
        }
        match self.tts {
            Some(tts) => self.created.saturating_add(tts) <= now,
            None => true,
        }
    }

    /// Whether `ttl` still shields the item from removal at `now`.
    pub fn is_protected_at(&self, now: i64) -> bool {
        matches!(self.ttl, Some(ttl) if self.created.saturating_add(ttl) > now)
    }

    /// Whether `ttd` forces removal at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.ttd, Some(ttd) if self.created.saturating_add(ttd) < now)
    }

    /// Removal decision for an item absent from the latest fetch.
    pub fn is_removable_at(&self, now: i64) -> bool {
        if self.is_protected_at(now) {
            return false;
        }
        !self.active || self.is_expired_at(now)
    }
}

/// Item shape accepted from sources.
///
/// Adapter-supplied `active`/`created` keys are dropped on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub id: String,
    /// Target cell; defaults to the fetching source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttd: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackData>,
}

impl CandidateItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Resolves the cell this candidate is written to.
    pub fn target_cell<'a>(&'a self, fetching_source: &'a str) -> &'a str {
        self.source.as_deref().unwrap_or(fetching_source)
    }

    /// Patch overwriting the fields a re-fetch is allowed to refresh.
    ///
    /// `callback` is left out; it merges separately via [`merge_callback`].
    pub fn refresh_patch(&self) -> ItemPatch {
        ItemPatch {
            title: self.title.clone(),
            tags: self.tags.clone(),
            link: self.link.clone(),
            time: self.time,
            author: self.author.clone(),
            body: self.body.clone(),
            ttl: self.ttl,
            ttd: self.ttd,
            tts: self.tts,
            ..ItemPatch::default()
        }
    }
}

/// Field-level update of a stored item.
///
/// `id`, `source` and `created` are not patchable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub active: Option<bool>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub time: Option<i64>,
    pub author: Option<String>,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
    pub ttl: Option<i64>,
    pub ttd: Option<i64>,
    pub tts: Option<i64>,
    /// Replaces the whole callback map.
    pub callback: Option<CallbackData>,
}

impl ItemPatch {
    pub fn deactivate() -> Self {
        Self {
            active: Some(false),
            ..Self::default()
        }
    }

    /// Applies present fields and reports whether the item changed.
    pub fn apply(self, item: &mut Item) -> bool {
        let mut changed = false;
        changed |= replace_if_some(&mut item.active, self.active);
        changed |= replace_if_some(&mut item.title, self.title);
        changed |= replace_option(&mut item.link, self.link);
        changed |= replace_option(&mut item.time, self.time);
        changed |= replace_option(&mut item.author, self.author);
        changed |= replace_option(&mut item.body, self.body);
        changed |= replace_if_some(&mut item.tags, self.tags);
        changed |= replace_option(&mut item.ttl, self.ttl);
        changed |= replace_option(&mut item.ttd, self.ttd);
        changed |= replace_option(&mut item.tts, self.tts);
        changed |= replace_option(&mut item.callback, self.callback);
        changed
    }
}

fn replace_if_some<T: PartialEq>(slot: &mut T, value: Option<T>) -> bool {
    match value {
        Some(value) if *slot != value => {
            *slot = value;
            true
        }
        _ => false,
    }
}

fn replace_option<T: PartialEq>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(value) if slot.as_ref() != Some(&value) => {
            *slot = Some(value);
            true
        }
        _ => false,
    }
}

/// Merges a freshly fetched callback map into the stored one.
///
/// Keys already present on `old` keep their value; new keys are added.
pub fn merge_callback(old: Option<&CallbackData>, new: &CallbackData) -> CallbackData {
    let mut merged = old.cloned().unwrap_or_default();
    for (key, value) in new {
        if !merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Rejected cell name or item id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIdentity {
    pub kind: &'static str,
    pub value: String,
}

impl Display for InvalidIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} `{}`", self.kind, self.value)
    }
}

impl Error for InvalidIdentity {}

/// Validates a cell (source) name.
pub fn validate_cell_name(value: &str) -> Result<(), InvalidIdentity> {
    validate_identity("cell name", value)
}

/// Validates an item id.
pub fn validate_item_id(value: &str) -> Result<(), InvalidIdentity> {
    validate_identity("item id", value)
}

fn validate_identity(kind: &'static str, value: &str) -> Result<(), InvalidIdentity> {
    if IDENTITY_RE.is_match(value) {
        Ok(())
    } else {
        Err(InvalidIdentity {
            kind,
            value: value.to_string(),
        })
    }
}
