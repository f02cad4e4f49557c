use inquisitor_core::{
    ActiveItemQuery, CandidateItem, Clock, FileStore, Item, ItemPatch, ItemRepository, ManualClock,
    RepoError,
};
use std::sync::Arc;
use tempfile::TempDir;

const T: i64 = 1_700_000_000;

fn open_store() -> (TempDir, Arc<ManualClock>, FileStore) {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(T));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let store = FileStore::open(dir.path(), dyn_clock).unwrap();
    (dir, clock, store)
}

#[test]
fn open_rejects_missing_root() {
    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(T));
    let result = FileStore::open(dir.path().join("absent"), clock);
    assert!(matches!(result, Err(RepoError::Io { .. })));
}

#[test]
fn create_and_load_roundtrip() {
    let (_dir, _clock, store) = open_store();

    let mut candidate = CandidateItem::new("x1July").with_title("A");
    candidate.link = Some("https://example.com/a".to_string());
    candidate.time = Some(T - 60);
    let created = store.create_item("news", candidate).unwrap();

    let loaded = store.load_item("news", "x1July").unwrap();
    assert_eq!(loaded, created);
    assert!(loaded.active);
    assert_eq!(loaded.created, T);
    assert_eq!(loaded.title, "A");
    assert_eq!(loaded.tags, vec!["news".to_string()]);
    assert_eq!(loaded.link.as_deref(), Some("https://example.com/a"));
    assert!(store.exists("news", "x1July").unwrap());
    assert!(!store.exists("news", "other").unwrap());
}

#[test]
fn duplicate_create_fails_and_keeps_original() {
    let (_dir, clock, store) = open_store();
    store
        .create_item("news", CandidateItem::new("a").with_title("original"))
        .unwrap();

    clock.advance(100);
    let err = store
        .create_item("news", CandidateItem::new("a").with_title("second"))
        .unwrap_err();
    assert!(matches!(err, RepoError::AlreadyExists { .. }));

    let loaded = store.load_item("news", "a").unwrap();
    assert_eq!(loaded.title, "original");
    assert_eq!(loaded.created, T);
}

#[test]
fn create_honors_candidate_target_cell() {
    let (dir, _clock, store) = open_store();
    let item = store
        .create_item("news", CandidateItem::new("a").with_source("digest"))
        .unwrap();

    assert_eq!(item.source, "digest");
    assert_eq!(item.tags, vec!["digest".to_string()]);
    assert!(dir.path().join("digest").join("a.item").is_file());
    assert!(dir.path().join("digest").join("state").is_file());
    assert!(store.list_item_ids("news").unwrap().is_empty());
}

#[test]
fn update_applies_patch_and_keeps_identity() {
    let (_dir, clock, store) = open_store();
    store.create_item("news", CandidateItem::new("a")).unwrap();

    clock.advance(50);
    let patch = ItemPatch {
        title: Some("renamed".to_string()),
        tags: Some(vec!["b".to_string(), "c".to_string()]),
        ..ItemPatch::default()
    };
    let updated = store.update_item("news", "a", patch).unwrap();
    assert_eq!(updated.title, "renamed");
    assert_eq!(updated.tags, vec!["b".to_string(), "c".to_string()]);
    assert_eq!(updated.created, T);

    let loaded = store.load_item("news", "a").unwrap();
    assert_eq!(loaded, updated);

    let missing = store.update_item("news", "zzz", ItemPatch::deactivate());
    assert!(matches!(missing, Err(RepoError::NotFound { .. })));
}

#[test]
fn save_item_never_rewrites_created() {
    let (_dir, _clock, store) = open_store();
    let mut item = store.create_item("news", CandidateItem::new("a")).unwrap();

    item.created = 0;
    item.body = Some("<p>hello</p>".to_string());
    let saved = store.save_item(&item).unwrap();
    assert_eq!(saved.created, T);
    assert_eq!(store.load_item("news", "a").unwrap().body, item.body);
}

#[test]
fn delete_removes_record_and_reports_missing() {
    let (_dir, _clock, store) = open_store();
    store.create_item("news", CandidateItem::new("a")).unwrap();

    store.delete_item("news", "a").unwrap();
    assert!(!store.exists("news", "a").unwrap());
    let err = store.delete_item("news", "a").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn list_item_ids_ignores_state_and_temp_files() {
    let (dir, _clock, store) = open_store();
    assert!(store.list_item_ids("news").unwrap().is_empty());

    store.create_item("news", CandidateItem::new("a")).unwrap();
    store.create_item("news", CandidateItem::new("b")).unwrap();
    std::fs::write(dir.path().join("news").join(".c.item.tmp"), "{").unwrap();

    let ids: Vec<String> = store.list_item_ids("news").unwrap().into_iter().collect();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn invalid_identities_are_rejected() {
    let (_dir, _clock, store) = open_store();
    let err = store
        .create_item("news", CandidateItem::new("../escape"))
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidIdentity(_)));
    assert!(matches!(
        store.load_item("a/b", "x"),
        Err(RepoError::InvalidIdentity(_))
    ));
}

#[test]
fn list_active_hides_inactive_and_unripe_items() {
    let (_dir, clock, store) = open_store();
    store.create_item("news", CandidateItem::new("visible")).unwrap();
    store.create_item("news", CandidateItem::new("gone")).unwrap();
    let mut delayed = CandidateItem::new("delayed");
    delayed.tts = Some(600);
    store.create_item("news", delayed).unwrap();
    store
        .update_item("news", "gone", ItemPatch::deactivate())
        .unwrap();

    let listed = store.list_active_items(&ActiveItemQuery::default()).unwrap();
    let ids: Vec<&str> = listed.items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["visible"]);

    clock.advance(600);
    let listed = store.list_active_items(&ActiveItemQuery::default()).unwrap();
    let mut ids: Vec<&str> = listed.items.iter().map(|item| item.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["delayed", "visible"]);
}

#[test]
fn list_active_sorts_by_created_and_filters() {
    let (_dir, clock, store) = open_store();
    store.create_item("news", CandidateItem::new("late")).unwrap();
    clock.advance(-10);
    store.create_item("blog", CandidateItem::new("early")).unwrap();
    let mut tagged = CandidateItem::new("tagged");
    tagged.tags = Some(vec!["rust".to_string()]);
    store.create_item("blog", tagged).unwrap();
    clock.advance(10);

    let all = store.list_active_items(&ActiveItemQuery::default()).unwrap();
    let ids: Vec<&str> = all.items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["early", "tagged", "late"]);

    let news_only = store
        .list_active_items(&ActiveItemQuery::for_sources(["news"]))
        .unwrap();
    assert_eq!(news_only.items.len(), 1);
    assert_eq!(news_only.items[0].id, "late");

    let query = ActiveItemQuery {
        tag: Some("rust".to_string()),
        ..ActiveItemQuery::default()
    };
    let by_tag = store.list_active_items(&query).unwrap();
    assert_eq!(by_tag.items.len(), 1);
    assert_eq!(by_tag.items[0].id, "tagged");
}

#[test]
fn corrupt_records_become_diagnostics() {
    let (dir, _clock, store) = open_store();
    store.create_item("news", CandidateItem::new("good")).unwrap();
    std::fs::write(dir.path().join("news").join("broken.item"), "not json").unwrap();

    let moved = Item::from_candidate("blog", CandidateItem::new("moved"), T);
    std::fs::write(
        dir.path().join("news").join("moved.item"),
        serde_json::to_string(&moved).unwrap(),
    )
    .unwrap();

    let listed = store.list_active_items(&ActiveItemQuery::default()).unwrap();
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.items[0].id, "good");
    assert_eq!(listed.errors.len(), 2);

    let err = store.load_item("news", "broken").unwrap_err();
    assert!(matches!(err, RepoError::CorruptRecord { .. }));
}

#[test]
fn records_are_pretty_json_with_sparse_fields() {
    let (dir, _clock, store) = open_store();
    store
        .create_item("news", CandidateItem::new("a").with_title("A"))
        .unwrap();

    let text = std::fs::read_to_string(dir.path().join("news").join("a.item")).unwrap();
    assert!(text.contains('\n'));
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["id"], "a");
    assert_eq!(value["source"], "news");
    assert_eq!(value["active"], true);
    assert!(value.get("link").is_none());
    assert!(value.get("callback").is_none());
}

#[cfg(unix)]
#[test]
fn undecodable_names_become_diagnostics() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let (dir, _clock, store) = open_store();
    store.create_item("news", CandidateItem::new("good")).unwrap();
    std::fs::write(
        dir.path().join("news").join(OsStr::from_bytes(b"bad\xff.item")),
        "{}",
    )
    .unwrap();
    std::fs::create_dir(dir.path().join(OsStr::from_bytes(b"cell\xff"))).unwrap();

    let listed = store.list_active_items(&ActiveItemQuery::default()).unwrap();
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.errors.len(), 2);
    assert!(listed
        .errors
        .iter()
        .all(|diagnostic| diagnostic.message.contains("UTF-8")));
}

#[cfg(unix)]
#[test]
fn unreadable_cell_becomes_diagnostic() {
    use std::os::unix::fs::PermissionsExt;

    let (dir, _clock, store) = open_store();
    store.create_item("news", CandidateItem::new("good")).unwrap();
    store.create_item("locked", CandidateItem::new("hidden")).unwrap();
    let locked = dir.path().join("locked");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

    let readable_anyway = std::fs::read_dir(&locked).is_ok();
    let listed = store.list_active_items(&ActiveItemQuery::default());
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    let listed = listed.unwrap();

    if readable_anyway {
        // Permission bits do not apply to privileged users.
        assert_eq!(listed.items.len(), 2);
        return;
    }
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.items[0].id, "good");
    assert_eq!(listed.errors.len(), 1);
    assert_eq!(listed.errors[0].path, locked);
}
