//! Directory-backed item and state store.
//!
//! # Responsibility
//! - Persist items and source state as pretty-printed JSON files.
//! - Keep the on-disk layout private to this module:
//!
//! ```text
//! <root>/
//! └─ <cell>/
//!    ├─ state          # source state blob
//!    └─ <id>.item      # one file per item
//! ```
//!
//! # Invariants
//! - Every write goes to a temp file that is synced and renamed over the
//!   target, so readers see either the old or the new content.
//! - A missing root directory is a startup failure, never a mid-cycle one.
//! - Single writer per item; no locking is attempted.

use crate::clock::Clock;
use crate::model::item::{validate_cell_name, validate_item_id, CandidateItem, Item, ItemPatch};
use crate::repo::item_repo::{
    ActiveItemQuery, ActiveItems, ItemRepository, ListDiagnostic, RepoError, RepoResult,
};
use crate::repo::state_repo::{SourceState, StateRepository};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

const ITEM_SUFFIX: &str = ".item";
const STATE_FILE: &str = "state";
const TEMP_SUFFIX: &str = ".tmp";

/// File-system store rooted at one data directory.
pub struct FileStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    /// Opens a store over an existing data directory.
    ///
    /// # Errors
    /// - Returns `RepoError::Io` when `root` is missing or not a directory.
    pub fn open(root: impl AsRef<Path>, clock: Arc<dyn Clock>) -> RepoResult<Self> {
        let started_at = Instant::now();
        let root = root.as_ref().to_path_buf();
        info!(
            "event=store_open module=repo status=start root={}",
            root.display()
        );

        match fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                let err = io::Error::new(io::ErrorKind::InvalidInput, "not a directory");
                error!(
                    "event=store_open module=repo status=error duration_ms={} error_code=root_not_dir root={}",
                    started_at.elapsed().as_millis(),
                    root.display()
                );
                return Err(RepoError::io(root, err));
            }
            Err(err) => {
                error!(
                    "event=store_open module=repo status=error duration_ms={} error_code=root_missing root={} error={}",
                    started_at.elapsed().as_millis(),
                    root.display(),
                    err
                );
                return Err(RepoError::io(root, err));
            }
        }

        info!(
            "event=store_open module=repo status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(Self { root, clock })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cell_path(&self, cell: &str) -> RepoResult<PathBuf> {
        validate_cell_name(cell)?;
        Ok(self.root.join(cell))
    }

    fn item_path(&self, cell: &str, id: &str) -> RepoResult<PathBuf> {
        validate_item_id(id)?;
        Ok(self.cell_path(cell)?.join(format!("{id}{ITEM_SUFFIX}")))
    }

    fn state_path(&self, cell: &str) -> RepoResult<PathBuf> {
        Ok(self.cell_path(cell)?.join(STATE_FILE))
    }

    fn read_item(&self, cell: &str, id: &str, path: &Path) -> RepoResult<Item> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(RepoError::NotFound {
                    source: cell.to_string(),
                    id: id.to_string(),
                });
            }
            Err(err) => return Err(RepoError::io(path, err)),
        };

        let item: Item = serde_json::from_str(&text).map_err(|err| RepoError::CorruptRecord {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        if item.source != cell || item.id != id {
            return Err(RepoError::CorruptRecord {
                path: path.to_path_buf(),
                message: format!(
                    "record identity {}/{} does not match its location",
                    item.source, item.id
                ),
            });
        }
        Ok(item)
    }

    fn write_item(&self, item: &Item) -> RepoResult<()> {
        let path = self.item_path(&item.source, &item.id)?;
        write_json_atomic(&path, item)
    }

    fn scan_cell(
        &self,
        cell: &str,
        cell_path: &Path,
        query: &ActiveItemQuery,
        now: i64,
        result: &mut ActiveItems,
    ) {
        let entries = match fs::read_dir(cell_path) {
            Ok(entries) => entries,
            Err(err) => {
                push_diagnostic(result, cell_path.to_path_buf(), RepoError::io(cell_path, err));
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    push_diagnostic(result, cell_path.to_path_buf(), RepoError::io(cell_path, err));
                    continue;
                }
            };
            let path = entry.path();
            let file_name = entry.file_name();
            let Some(id) = item_id_from_file_name(&file_name) else {
                if file_name.to_str().is_none() && looks_like_item(&file_name) {
                    push_diagnostic(result, path.clone(), non_utf8_name(&path));
                }
                continue;
            };
            match self.read_item(cell, &id, &path) {
                Ok(item) => {
                    if item.is_visible_at(now) && query.matches(&item) {
                        result.items.push(item);
                    }
                }
                Err(err) => push_diagnostic(result, path, err),
            }
        }
    }
}

impl ItemRepository for FileStore {
    fn exists(&self, source: &str, id: &str) -> RepoResult<bool> {
        Ok(self.item_path(source, id)?.is_file())
    }

    fn load_item(&self, source: &str, id: &str) -> RepoResult<Item> {
        let path = self.item_path(source, id)?;
        self.read_item(source, id, &path)
    }

    fn create_item(&self, source: &str, candidate: CandidateItem) -> RepoResult<Item> {
        let target = candidate.target_cell(source).to_string();
        let path = self.item_path(&target, &candidate.id)?;
        if path.is_file() {
            return Err(RepoError::AlreadyExists {
                source: target,
                id: candidate.id,
            });
        }

        self.ensure_cell(&target)?;
        let item = Item::from_candidate(source, candidate, self.clock.now());
        write_json_atomic(&path, &item)?;
        debug!(
            "event=item_create module=repo status=ok source={} id={}",
            item.source, item.id
        );
        Ok(item)
    }

    fn update_item(&self, source: &str, id: &str, patch: ItemPatch) -> RepoResult<Item> {
        let mut item = self.load_item(source, id)?;
        if patch.apply(&mut item) {
            self.write_item(&item)?;
            debug!(
                "event=item_update module=repo status=ok source={} id={}",
                source, id
            );
        }
        Ok(item)
    }

    fn save_item(&self, item: &Item) -> RepoResult<Item> {
        let stored = self.load_item(&item.source, &item.id)?;
        let mut next = item.clone();
        next.created = stored.created;
        if next != stored {
            self.write_item(&next)?;
        }
        Ok(next)
    }

    fn delete_item(&self, source: &str, id: &str) -> RepoResult<()> {
        let path = self.item_path(source, id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                sync_parent_dir(&path).map_err(|err| RepoError::io(&path, err))?;
                debug!(
                    "event=item_delete module=repo status=ok source={} id={}",
                    source, id
                );
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(RepoError::NotFound {
                source: source.to_string(),
                id: id.to_string(),
            }),
            Err(err) => Err(RepoError::io(path, err)),
        }
    }

    fn list_item_ids(&self, source: &str) -> RepoResult<BTreeSet<String>> {
        let cell_path = self.cell_path(source)?;
        let entries = match fs::read_dir(&cell_path) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(err) => return Err(RepoError::io(cell_path, err)),
        };

        let mut ids = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|err| RepoError::io(&cell_path, err))?;
            if let Some(id) = item_id_from_file_name(&entry.file_name()) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    fn list_active_items(&self, query: &ActiveItemQuery) -> RepoResult<ActiveItems> {
        let now = self.clock.now();
        let mut result = ActiveItems::default();
        let cells = fs::read_dir(&self.root).map_err(|err| RepoError::io(&self.root, err))?;

        for cell in cells {
            let cell = match cell {
                Ok(cell) => cell,
                Err(err) => {
                    push_diagnostic(&mut result, self.root.clone(), RepoError::io(&self.root, err));
                    continue;
                }
            };
            let cell_path = cell.path();
            if !cell_path.is_dir() {
                continue;
            }
            let Ok(name) = cell.file_name().into_string() else {
                push_diagnostic(&mut result, cell_path.clone(), non_utf8_name(&cell_path));
                continue;
            };
            if validate_cell_name(&name).is_err() || !query.includes_source(&name) {
                continue;
            }
            self.scan_cell(&name, &cell_path, query, now, &mut result);
        }

        result.items.sort_by(|a, b| {
            (a.created, &a.source, &a.id).cmp(&(b.created, &b.source, &b.id))
        });
        debug!(
            "event=item_list module=repo status=ok items={} errors={}",
            result.items.len(),
            result.errors.len()
        );
        Ok(result)
    }
}

impl StateRepository for FileStore {
    fn ensure_cell(&self, name: &str) -> RepoResult<()> {
        let cell_path = self.cell_path(name)?;
        if !cell_path.is_dir() {
            info!("event=cell_create module=repo status=ok cell={}", name);
            fs::create_dir_all(&cell_path).map_err(|err| RepoError::io(&cell_path, err))?;
        }
        let state_path = cell_path.join(STATE_FILE);
        if !state_path.is_file() {
            write_json_atomic(&state_path, &Map::new())?;
        }
        Ok(())
    }

    fn load_state(&self, name: &str) -> RepoResult<SourceState> {
        let path = self.state_path(name)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(SourceState::new(name, Map::new()));
            }
            Err(err) => return Err(RepoError::io(path, err)),
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(values)) => Ok(SourceState::new(name, values)),
            Ok(_) => Err(RepoError::CorruptRecord {
                path,
                message: "state blob is not a JSON object".to_string(),
            }),
            Err(err) => Err(RepoError::CorruptRecord {
                path,
                message: err.to_string(),
            }),
        }
    }

    fn flush_state(&self, state: &SourceState) -> RepoResult<()> {
        let cell_path = self.cell_path(state.cell())?;
        fs::create_dir_all(&cell_path).map_err(|err| RepoError::io(&cell_path, err))?;
        write_json_atomic(&cell_path.join(STATE_FILE), state.values())
    }
}

fn item_id_from_file_name(name: &std::ffi::OsStr) -> Option<String> {
    let name = name.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    name.strip_suffix(ITEM_SUFFIX)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Writes `value` next to `path` and renames it into place.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> RepoResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|err| RepoError::CorruptRecord {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("record");
    let temp_path = path.with_file_name(format!(".{file_name}{TEMP_SUFFIX}"));

    let written = File::create(&temp_path).and_then(|mut file| {
        file.write_all(text.as_bytes())?;
        file.sync_all()
    });
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(RepoError::io(temp_path, err));
    }

    fs::rename(&temp_path, path).map_err(|err| {
        let _ = fs::remove_file(&temp_path);
        RepoError::io(path, err)
    })?;

    // The rename is only durable once the directory entry is synced.
    sync_parent_dir(path).map_err(|err| RepoError::io(path, err))
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => File::open(parent)?.sync_all(),
        None => Ok(()),
    }
}

// Directory handles cannot be fsynced on Windows; NTFS journals metadata.
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

fn looks_like_item(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().ends_with(ITEM_SUFFIX)
}

fn non_utf8_name(path: &Path) -> RepoError {
    RepoError::CorruptRecord {
        path: path.to_path_buf(),
        message: "file name is not valid UTF-8".to_string(),
    }
}

fn push_diagnostic(result: &mut ActiveItems, path: PathBuf, err: RepoError) {
    warn!(
        "event=item_list module=repo status=skipped path={} error={}",
        path.display(),
        err
    );
    result.errors.push(ListDiagnostic {
        path,
        message: err.to_string(),
    });
}
