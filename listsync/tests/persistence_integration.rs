//! Persistence integration tests: lists written through the server land in
//! RocksDB, survive restarts and come back after eviction.

use listsync::client::ListClient;
use listsync::model::{Item, ListDocument};
use listsync::protocol::{AddItem, RemoveItem};
use listsync::server::{ServerConfig, SyncServer};
use listsync::storage::{ListStore, RocksListStore, StoreConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn rocks_config(path: &Path) -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".into(),
        storage_path: Some(path.to_path_buf()),
        ..ServerConfig::default()
    }
}

fn item_texts(doc: &ListDocument) -> Vec<&str> {
    doc.items.iter().map(|i| i.item.as_str()).collect()
}

#[tokio::test]
async fn test_list_survives_restart() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db");

    {
        let server = SyncServer::new(rocks_config(&db)).unwrap();
        let engine = server.engine();
        engine.add_item(&AddItem::new("L1", "milk")).await.unwrap();
        engine.add_item(&AddItem::new("L1", "eggs")).await.unwrap();
        engine.add_item(&AddItem::new("L2", "nails")).await.unwrap();
        server.shutdown().await;
    }

    let server = SyncServer::new(rocks_config(&db)).unwrap();
    let l1 = server.engine().snapshot("L1").await.unwrap();
    let l2 = server.engine().snapshot("L2").await.unwrap();
    assert_eq!(item_texts(&l1), vec!["eggs", "milk"]);
    assert_eq!(item_texts(&l2), vec!["nails"]);
}

#[tokio::test]
async fn test_evict_then_rehydrate_from_rocks() {
    let dir = tempdir().unwrap();
    let server = SyncServer::new(rocks_config(&dir.path().join("db"))).unwrap();

    let added = server
        .engine()
        .add_item(&AddItem::new("L1", "milk").with_colors("#fff", "#000"))
        .await
        .unwrap();

    assert!(server.cache().evict("L1").await);
    assert!(!server.cache().contains("L1").await);

    let rehydrated = server.engine().snapshot("L1").await.unwrap();
    assert_eq!(rehydrated, added);
    assert_eq!(server.cache().stats().await.hydrations, 2);
}

#[tokio::test(start_paused = true)]
async fn test_idle_list_expires_and_reloads() {
    let dir = tempdir().unwrap();
    let config = ServerConfig {
        list_ttl: Duration::from_secs(60),
        ..rocks_config(&dir.path().join("db"))
    };
    let server = SyncServer::new(config).unwrap();

    server
        .engine()
        .add_item(&AddItem::new("L1", "milk"))
        .await
        .unwrap();
    assert!(server.cache().contains("L1").await);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(server.cache().is_empty().await);

    let doc = server.engine().snapshot("L1").await.unwrap();
    assert_eq!(item_texts(&doc), vec!["milk"]);
}

#[tokio::test]
async fn test_removed_item_stays_removed_after_restart() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db");

    {
        let server = SyncServer::new(rocks_config(&db)).unwrap();
        let engine = server.engine();
        engine.add_item(&AddItem::new("L1", "milk")).await.unwrap();
        engine.add_item(&AddItem::new("L1", "bread")).await.unwrap();
        engine
            .remove_item(&RemoveItem::new("L1", "milk"))
            .await
            .unwrap();
    }

    let store = RocksListStore::open(StoreConfig::for_testing(&db)).unwrap();
    let doc = store.get("L1").unwrap().unwrap();
    assert_eq!(item_texts(&doc), vec!["bread"]);

    let meta = store.metadata("L1").unwrap().unwrap();
    assert_eq!(meta.writes, 3);
    assert!(meta.updated_at >= meta.created_at);
}

#[tokio::test]
async fn test_websocket_edits_are_persisted() {
    let dir = tempdir().unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = Arc::new(SyncServer::new(rocks_config(&dir.path().join("db"))).unwrap());
    let running = server.clone();
    tokio::spawn(async move {
        running.serve(listener).await.unwrap();
    });

    let mut client = ListClient::connect_to(format!("ws://127.0.0.1:{port}"))
        .await
        .unwrap();
    client
        .add_item(AddItem::new("L1", "milk").with_colors("#fff", "#000"))
        .await
        .unwrap();
    let (_, broadcast) = tokio::time::timeout(Duration::from_secs(2), client.next_update())
        .await
        .unwrap()
        .unwrap();

    // The save completes before the broadcast goes out
    let stored = server.cache().store().load("L1").await.unwrap().unwrap();
    assert_eq!(stored, broadcast);
    assert_eq!(stored.items[0].text_color, "#000");
}

#[test]
fn test_rocks_store_keeps_lists_isolated() {
    let dir = tempdir().unwrap();
    let store = RocksListStore::open(StoreConfig::for_testing(dir.path())).unwrap();

    let mut groceries = ListDocument::named("Groceries");
    groceries.items.push(Item::new("milk", "#fff", "#000", 1));
    let mut hardware = ListDocument::named("Hardware");
    hardware.items.push(Item::new("nails", "", "", 2));

    store.put("groceries", &groceries).unwrap();
    store.put("hardware", &hardware).unwrap();

    assert_eq!(store.get("groceries").unwrap(), Some(groceries));
    assert_eq!(store.get("hardware").unwrap(), Some(hardware));
    assert_eq!(store.get("garden").unwrap(), None);

    let mut ids = store.list_ids().unwrap();
    ids.sort();
    assert_eq!(ids, vec!["groceries", "hardware"]);
}

#[test]
fn test_large_list_round_trips() {
    let dir = tempdir().unwrap();
    let store = RocksListStore::open(StoreConfig::for_testing(dir.path())).unwrap();

    let mut doc = ListDocument::named("Big");
    for n in 0..5_000 {
        doc.items.push(Item::new(format!("item {n}"), "#ffffff", "#000000", n));
    }
    let meta = store.put("big", &doc).unwrap();

    assert_eq!(store.get("big").unwrap(), Some(doc));
    assert!(meta.document_size > 50_000);
}
