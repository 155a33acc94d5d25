use camino::Utf8PathBuf;
use wharf_persistence::{HashCache, CACHE_DIR};

fn project_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, root)
}

#[test]
fn dump_then_load_round_trips() {
    let (_dir, root) = project_root();
    let mut cache = HashCache::default();
    cache.insert("index.html", 1_700_000_000_123, "aa11".to_string());
    cache.insert("css/site.css", 1_700_000_111_456, "bb22".to_string());

    cache.dump(&root, "cHVibGlj").unwrap();
    let loaded = HashCache::load(&root, "cHVibGlj");

    assert_eq!(loaded, cache);
    assert_eq!(loaded.get("index.html").unwrap().hash, "aa11");
    assert_eq!(loaded.get("css/site.css").unwrap().mtime_ms, 1_700_000_111_456);
}

#[test]
fn missing_file_loads_as_empty() {
    let (_dir, root) = project_root();
    assert!(HashCache::load(&root, "bm9wZQ").is_empty());
}

#[test]
fn corrupt_file_loads_as_empty() {
    let (_dir, root) = project_root();
    let path = HashCache::cache_path(&root, "cHVibGlj");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    assert!(HashCache::load(&root, "cHVibGlj").is_empty());
}

#[test]
fn dump_overwrites_the_previous_table() {
    let (_dir, root) = project_root();
    let mut first = HashCache::default();
    first.insert("a.txt", 1, "aaaa".to_string());
    first.dump(&root, "key").unwrap();

    let mut second = HashCache::default();
    second.insert("b.txt", 2, "bbbb".to_string());
    second.dump(&root, "key").unwrap();

    let loaded = HashCache::load(&root, "key");
    assert_eq!(loaded.len(), 1);
    assert!(loaded.get("a.txt").is_none());
    assert_eq!(loaded.get("b.txt").unwrap().hash, "bbbb");
}

#[test]
fn invalidate_leaves_an_empty_table_on_disk() {
    let (_dir, root) = project_root();
    let mut cache = HashCache::default();
    cache.insert("index.html", 42, "cc33".to_string());
    cache.dump(&root, "key").unwrap();

    HashCache::invalidate(&root, "key").unwrap();

    let loaded = HashCache::load(&root, "key");
    assert!(loaded.is_empty());
    assert!(HashCache::cache_path(&root, "key").exists());
}

#[test]
fn cache_lives_in_the_hidden_project_dir() {
    let (_dir, root) = project_root();
    HashCache::default().dump(&root, "key").unwrap();
    assert!(root.join(CACHE_DIR).join("uploads.key.json").exists());
}

#[test]
fn windows_style_lookups_hit_unix_keys() {
    let mut cache = HashCache::default();
    cache.insert("assets\\img\\logo.png", 10, "dd44".to_string());
    assert!(cache.get("assets/img/logo.png").is_some());
}
