//! Integration tests for `SqliteKvStore` against an in-memory database.

use brokerdash_core::{
  listing::{ListingPatch, ListingStatus},
  store::KvStore,
};
use brokerdash_sync::{Bus, Registry};

use crate::SqliteKvStore;

async fn store() -> SqliteKvStore {
  SqliteKvStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Key/value ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_and_get() {
  let s = store().await;
  s.put("AD-1-1".into(), r#"{"a":1}"#.into()).await.unwrap();

  let value = s.get("AD-1-1".into()).await.unwrap();
  assert_eq!(value.as_deref(), Some(r#"{"a":1}"#));
}

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  assert!(s.get("nope".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn put_replaces_existing_value() {
  let s = store().await;
  s.put("k".into(), "old".into()).await.unwrap();
  s.put("k".into(), "new".into()).await.unwrap();

  assert_eq!(s.get("k".into()).await.unwrap().as_deref(), Some("new"));
  assert_eq!(s.scan().await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_reports_whether_a_row_went_away() {
  let s = store().await;
  s.put("k".into(), "v".into()).await.unwrap();

  assert!(s.delete("k".into()).await.unwrap());
  assert!(!s.delete("k".into()).await.unwrap());
  assert!(s.get("k".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn scan_orders_by_key() {
  let s = store().await;
  for key in ["c", "a", "b"] {
    s.put(key.into(), key.to_uppercase()).await.unwrap();
  }

  let rows = s.scan().await.unwrap();
  assert_eq!(rows, vec![
    ("a".to_owned(), "A".to_owned()),
    ("b".to_owned(), "B".to_owned()),
    ("c".to_owned(), "C".to_owned()),
  ]);
}

#[tokio::test]
async fn unicode_keys_and_values_survive() {
  let s = store().await;
  s.put("045348".into(), "شقة للإيجار".into()).await.unwrap();
  assert_eq!(
    s.get("045348".into()).await.unwrap().as_deref(),
    Some("شقة للإيجار")
  );
}

// ─── As a registry backend ───────────────────────────────────────────────────

#[tokio::test]
async fn registry_state_survives_reopen() {
  let s = store().await;

  let registry = Registry::open(s.clone(), Bus::new()).await.unwrap();
  registry
    .upsert("رقم الاعلان: ...045348", ListingPatch {
      title: Some("Apartment".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  registry
    .set_status("#045348", ListingStatus::Published)
    .await
    .unwrap();
  registry.upsert("AD-2-2", ListingPatch::default()).await.unwrap();
  registry.remove("AD-2-2").await.unwrap();

  // A second registry over the same connection sees exactly what was
  // committed.
  let reopened = Registry::open(s, Bus::new()).await.unwrap();
  assert_eq!(reopened.ids(), vec!["045348"]);
  let listing = reopened.get("045348").unwrap();
  assert_eq!(listing.title, "Apartment");
  assert!(listing.status.is_published());
  assert!(listing.aliases.contains("رقم الاعلان: ...045348"));
}
