use criterion::{criterion_group, criterion_main, Criterion};
use listsync::broadcast::Broadcaster;
use listsync::model::{Item, ListDocument, ListRecord};
use listsync::mutation::{apply_add, apply_remove};
use listsync::protocol::{encode_update, AddItem, RemoveItem, Request};
use listsync::storage::{RocksListStore, StoreConfig};
use std::hint::black_box;
use uuid::Uuid;

fn sample_document(len: usize) -> ListDocument {
    let mut doc = ListDocument::named("Groceries");
    for n in 0..len {
        doc.items
            .push(Item::new(format!("item {n}"), "#ffffff", "#000000", n as i64));
    }
    doc
}

fn bench_apply_add_new(c: &mut Criterion) {
    let record = ListRecord::from_document("L1", sample_document(100));
    let req = AddItem::new("L1", "fresh item");

    c.bench_function("apply_add_new_100_items", |b| {
        b.iter(|| {
            let mut record = record.clone();
            apply_add(&mut record, black_box(&req), 1);
            black_box(record);
        })
    });
}

fn bench_apply_add_duplicate(c: &mut Criterion) {
    let record = ListRecord::from_document("L1", sample_document(100));
    // Last item, so the dedupe scan walks the whole list
    let req = AddItem::new("L1", "item 99");

    c.bench_function("apply_add_duplicate_100_items", |b| {
        b.iter(|| {
            let mut record = record.clone();
            apply_add(&mut record, black_box(&req), 1);
            black_box(record);
        })
    });
}

fn bench_apply_remove(c: &mut Criterion) {
    let record = ListRecord::from_document("L1", sample_document(100));
    let req = RemoveItem::new("L1", "item 50");

    c.bench_function("apply_remove_100_items", |b| {
        b.iter(|| {
            let mut record = record.clone();
            black_box(apply_remove(&mut record, black_box(&req)));
        })
    });
}

fn bench_request_decode(c: &mut Criterion) {
    let frame = Request::Add(AddItem::new("L1", "milk").with_colors("#fff", "#000"))
        .encode()
        .unwrap();

    c.bench_function("request_decode_add", |b| {
        b.iter(|| {
            black_box(Request::decode(black_box(&frame)).unwrap());
        })
    });
}

fn bench_encode_update(c: &mut Criterion) {
    let doc = sample_document(100);

    c.bench_function("encode_update_100_items", |b| {
        b.iter(|| {
            black_box(encode_update(black_box("L1"), black_box(&doc)).unwrap());
        })
    });
}

fn bench_publish_100_subscribers(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let broadcaster = Broadcaster::new(1024);
    let doc = sample_document(20);

    let _receivers: Vec<_> = rt.block_on(async {
        let mut receivers = Vec::new();
        for _ in 0..100 {
            receivers.push(broadcaster.subscribe("L1", Uuid::new_v4()).await);
        }
        receivers
    });

    c.bench_function("publish_100_subscribers", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(broadcaster.publish("L1", black_box(&doc)).await.unwrap());
            });
        })
    });
}

fn bench_rocks_put(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksListStore::open(StoreConfig::for_testing(dir.path())).unwrap();
    let doc = sample_document(100);

    c.bench_function("rocks_put_100_items", |b| {
        b.iter(|| {
            black_box(store.put(black_box("L1"), black_box(&doc)).unwrap());
        })
    });
}

fn bench_rocks_get(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksListStore::open(StoreConfig::for_testing(dir.path())).unwrap();
    store.put("L1", &sample_document(100)).unwrap();

    c.bench_function("rocks_get_100_items", |b| {
        b.iter(|| {
            black_box(store.get(black_box("L1")).unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_apply_add_new,
    bench_apply_add_duplicate,
    bench_apply_remove,
    bench_request_decode,
    bench_encode_update,
    bench_publish_100_subscribers,
    bench_rocks_put,
    bench_rocks_get,
);
criterion_main!(benches);
