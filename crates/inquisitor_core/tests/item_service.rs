use inquisitor_core::config::parse_config_str;
use inquisitor_core::{
    ActiveItemQuery, CandidateItem, Clock, CoreConfig, FileStore, ItemRepository, ItemService,
    ManualClock, RepoError,
};
use std::sync::Arc;
use tempfile::TempDir;

fn open_service() -> (TempDir, ItemService<FileStore>, FileStore) {
    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_700_000_000));
    let service = ItemService::new(FileStore::open(dir.path(), clock.clone()).unwrap());
    let store = FileStore::open(dir.path(), clock).unwrap();
    (dir, service, store)
}

#[test]
fn deactivate_hides_item_from_listing() {
    let (_dir, service, store) = open_service();
    store.create_item("news", CandidateItem::new("a")).unwrap();

    let item = service.deactivate("news", "a").unwrap();
    assert!(!item.active);
    assert!(!store.load_item("news", "a").unwrap().active);
    assert!(service
        .list_active(&ActiveItemQuery::default())
        .unwrap()
        .items
        .is_empty());

    let missing = service.deactivate("news", "zzz");
    assert!(matches!(missing, Err(RepoError::NotFound { .. })));
}

#[test]
fn deactivate_cell_counts_changed_items() {
    let (_dir, service, store) = open_service();
    store.create_item("news", CandidateItem::new("a")).unwrap();
    store.create_item("news", CandidateItem::new("b")).unwrap();
    store.create_item("blog", CandidateItem::new("c")).unwrap();
    service.deactivate("news", "a").unwrap();

    assert_eq!(service.deactivate_cell("news").unwrap(), 1);
    assert_eq!(service.deactivate_cell("news").unwrap(), 0);
    assert_eq!(service.deactivate_cell("empty").unwrap(), 0);
    assert!(store.load_item("blog", "c").unwrap().active);
}

#[test]
fn add_item_defaults_source_and_id() {
    let (_dir, service, store) = open_service();

    let item = service
        .add_item(CandidateItem::new("").with_title("note to self"))
        .unwrap();
    assert_eq!(item.source, "inquisitor");
    assert_eq!(item.id.len(), 16);
    assert!(item.id.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(store.exists("inquisitor", &item.id).unwrap());

    let pinned = service
        .add_item(CandidateItem::new("fixed").with_source("notes"))
        .unwrap();
    assert_eq!(pinned.source, "notes");
    assert_eq!(pinned.tags, vec!["notes".to_string()]);

    let duplicate = service.add_item(CandidateItem::new("fixed").with_source("notes"));
    assert!(matches!(duplicate, Err(RepoError::AlreadyExists { .. })));
}

#[test]
fn subfeed_query_limits_listing() {
    let (_dir, service, store) = open_service();
    store.create_item("hn", CandidateItem::new("a")).unwrap();
    store.create_item("lobsters", CandidateItem::new("b")).unwrap();
    store.create_item("xkcd", CandidateItem::new("c")).unwrap();

    let pairs = parse_config_str("Subfeeds = news: hn lobsters\n  comics: xkcd").unwrap();
    let config = CoreConfig::from_pairs(&pairs).unwrap();

    let news = service
        .list_active(&config.subfeed_query("news").unwrap())
        .unwrap();
    let mut sources: Vec<&str> = news.items.iter().map(|item| item.source.as_str()).collect();
    sources.sort_unstable();
    assert_eq!(sources, vec!["hn", "lobsters"]);

    let comics = service
        .list_active(&config.subfeed_query("comics").unwrap())
        .unwrap();
    assert_eq!(comics.items.len(), 1);
    assert_eq!(comics.items[0].id, "c");
}
