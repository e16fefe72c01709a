use common_docstore::{
    document_id, DocumentStore, Filter, FindOptions, MemoryDocumentStore, SortDirection, StoreError,
};
use serde_json::json;

fn doc(v: serde_json::Value) -> common_docstore::Document {
    v.as_object().cloned().expect("object")
}

#[tokio::test]
async fn insert_assigns_ids_and_find_one_returns_them() {
    let store = MemoryDocumentStore::new();
    let id = store.insert_one("things", doc(json!({"name": "a"}))).await.expect("insert");
    let found = store.find_one("things", &Filter::by_id(id)).await.expect("find").expect("present");
    assert_eq!(document_id(&found), Some(id));
    assert_eq!(found["name"], "a");
}

#[tokio::test]
async fn find_sorts_skips_and_limits() {
    let store = MemoryDocumentStore::new();
    for n in [3, 1, 4, 1, 5] {
        store.insert_one("nums", doc(json!({"n": n}))).await.unwrap();
    }
    let opts = FindOptions::default().sort("n", SortDirection::Ascending).skip(1).limit(3);
    let got: Vec<i64> = store
        .find("nums", &Filter::new(), &opts)
        .await
        .unwrap()
        .iter()
        .map(|d| d["n"].as_i64().unwrap())
        .collect();
    assert_eq!(got, vec![1, 3, 4]);
    assert_eq!(store.count_documents("nums", &Filter::new().eq("n", 1)).await.unwrap(), 2);
}

#[tokio::test]
async fn update_one_merges_and_reports_counts() {
    let store = MemoryDocumentStore::new();
    let id = store.insert_one("dsr", doc(json!({"status": "NEW"}))).await.unwrap();
    let res = store
        .update_one("dsr", &Filter::by_id(id), doc(json!({"status": "IN_PROGRESS", "_id": "ignored"})))
        .await
        .unwrap();
    assert_eq!((res.matched, res.modified), (1, 1));
    let again = store.update_one("dsr", &Filter::by_id(id), doc(json!({"status": "IN_PROGRESS"}))).await.unwrap();
    assert_eq!((again.matched, again.modified), (1, 0));
    let missing = store.update_one("dsr", &Filter::new().eq("status", "NOPE"), doc(json!({}))).await.unwrap();
    assert_eq!(missing.matched, 0);
    let stored = store.find_one("dsr", &Filter::by_id(id)).await.unwrap().unwrap();
    assert_eq!(document_id(&stored), Some(id));
}

#[tokio::test]
async fn rejected_collections_fail_writes_only() {
    let store = MemoryDocumentStore::new();
    store.insert_one("auditLogs", doc(json!({"a": 1}))).await.unwrap();
    store.reject_writes("auditLogs").await;
    let err = store.insert_one("auditLogs", doc(json!({"a": 2}))).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    assert_eq!(store.count_documents("auditLogs", &Filter::new()).await.unwrap(), 1);
    store.insert_one("other", doc(json!({}))).await.expect("other collections unaffected");
    store.accept_writes("auditLogs").await;
    store.insert_one("auditLogs", doc(json!({"a": 3}))).await.expect("accepted again");
}

#[tokio::test]
async fn malformed_ids_are_rejected() {
    let store = MemoryDocumentStore::new();
    let err = store.insert_one("x", doc(json!({"_id": "not-a-uuid"}))).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidDocument(_)));
}
