// End-to-end scenarios from the project's seed test suite: file upload/index/search, the hybrid
// storage threshold boundary, and search escaping. Orchestrator-level scenarios (new conversation
// fan-out, self-suppression, partial failure) are covered by `src/orchestrator.rs`'s own tests,
// which already exercise the real Store and MockAdapter rather than a fake.

use roundtable::filestore::FileStore;
use roundtable::indexer::Indexer;
use roundtable::search::{search, SearchFilters};
use roundtable::store::{NewFile, Store};

async fn test_store() -> Store {
    Store::open_in_memory().await.unwrap()
}

#[tokio::test]
async fn file_upload_index_search_and_delete_round_trip() {
    let store = test_store().await;
    let project_id = store.default_project_id().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let files = FileStore::new(dir.path());
    let indexer = Indexer::new(store.clone(), files.clone());

    let content = "this file has an indexable word in it".to_string();
    let put = files.put(content.clone().into_bytes()).await.unwrap();
    let file = store
        .upsert_file(
            &project_id,
            NewFile {
                path: "docs/hello.md".to_string(),
                content: put.inline_text,
                content_location: put.location,
                content_hash: put.hash,
                mime_type: FileStore::detect_mime("docs/hello.md"),
                size_bytes: put.size,
                metadata: serde_json::json!({}),
            },
        )
        .await
        .unwrap();

    indexer.index_file(&file.id).await.unwrap();

    let results = search(&store, &project_id, "indexable", 20, 0, SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(results.results.len(), 1);
    assert_eq!(results.results[0].path.as_deref(), Some("docs/hello.md"));
    assert!(results.results[0].highlighted.contains("**indexable**"));

    store.delete_file(&file.id).await.unwrap();
    let after_delete = search(&store, &project_id, "indexable", 20, 0, SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(after_delete.results.len(), 0);
}

#[tokio::test]
async fn hybrid_storage_threshold_splits_inline_from_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let files = FileStore::new(dir.path());

    let just_under = vec![b'a'; roundtable::filestore::INLINE_THRESHOLD - 1];
    let inline_put = files.put(just_under).await.unwrap();
    assert!(inline_put.inline_text.is_some());
    assert!(inline_put.location.is_none());

    let at_threshold = vec![b'b'; roundtable::filestore::INLINE_THRESHOLD];
    let on_disk_put = files.put(at_threshold).await.unwrap();
    assert!(on_disk_put.inline_text.is_none());
    let location = on_disk_put.location.unwrap();
    assert!(std::path::Path::new(&location).exists());

    files.delete(&location).await.unwrap();
    assert!(!std::path::Path::new(&location).exists());
}

#[tokio::test]
async fn search_escapes_sql_injection_attempts() {
    let store = test_store().await;
    let project_id = store.default_project_id().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let files = FileStore::new(dir.path());
    let indexer = Indexer::new(store.clone(), files.clone());

    let put = files.put(b"ordinary project notes".to_vec()).await.unwrap();
    let file = store
        .upsert_file(
            &project_id,
            NewFile {
                path: "notes.md".to_string(),
                content: put.inline_text,
                content_location: put.location,
                content_hash: put.hash,
                mime_type: "text/markdown".to_string(),
                size_bytes: put.size,
                metadata: serde_json::json!({}),
            },
        )
        .await
        .unwrap();
    indexer.index_file(&file.id).await.unwrap();

    let malicious = "\"; DROP TABLE projects; --";
    let results = search(&store, &project_id, malicious, 20, 0, SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(results.results.len(), 0);

    // The table survived: the default project seeded at Store::open_in_memory() is still there.
    let project_count = store.list_projects().await.unwrap().len();
    assert_eq!(project_count, 1);
}
