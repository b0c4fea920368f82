//! # Engine CRUD Tests
//!
//! End-to-end coverage of the facade operations against a real datafile:
//! insert/find roundtrips, auto-assigned ids, unique-key enforcement,
//! whole-document updates, deletes with page reuse, and collection
//! management.

use kitedb::{doc, AutoId, Document, Engine, Error, Query, Value};
use tempfile::tempdir;

fn open(dir: &tempfile::TempDir) -> Engine {
    Engine::open(dir.path().join("app.db")).unwrap()
}

#[test]
fn insert_then_find_by_id() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    db.insert_one("docs", doc! { "_id" => 1, "name" => "a" }).unwrap();

    let found = db.find("docs", &Query::eq("_id", 1)).unwrap();
    assert_eq!(found, vec![doc! { "_id" => 1, "name" => "a" }]);
}

#[test]
fn documents_roundtrip_every_value_kind() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    let doc = doc! {
        "_id" => 1,
        "null" => Value::Null,
        "i64" => 99i64 << 40,
        "dbl" => -0.25,
        "str" => "text with ünïcode",
        "nested" => doc! { "x" => 1, "y" => vec![Value::Int32(1), Value::Bool(true)] },
        "bin" => Value::Binary((0u16..600).map(|i| i as u8).collect()),
        "guid" => Value::Guid([9u8; 16]),
        "dt" => Value::DateTime(1_700_000_000_000),
    };
    db.insert_one("docs", doc.clone()).unwrap();

    let found = db.find_one("docs", &Query::eq("_id", 1)).unwrap().unwrap();
    assert_eq!(found, doc);
}

#[test]
fn missing_ids_get_distinct_object_ids() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    let docs: Vec<Document> = (0..20).map(|i| doc! { "n" => i }).collect();
    assert_eq!(db.insert("docs", docs).unwrap(), 20);

    let mut ids: Vec<Value> = db
        .find("docs", &Query::all())
        .unwrap()
        .iter()
        .map(|d| d.get("_id").unwrap().clone())
        .collect();
    assert_eq!(ids.len(), 20);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20, "auto-assigned _ids must be unique");
}

#[test]
fn int32_auto_id_counts_up_and_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.db");

    {
        let db = Engine::open(&path).unwrap();
        db.insert_with("docs", (0..3).map(|i| doc! { "n" => i }), AutoId::Int32, 1000)
            .unwrap();
    }
    let db = Engine::open(&path).unwrap();
    db.insert_with("docs", [doc! { "n" => 3 }], AutoId::Int32, 1000)
        .unwrap();

    let ids: Vec<i32> = db
        .find("docs", &Query::all())
        .unwrap()
        .iter()
        .map(|d| d.get("_id").unwrap().as_i32().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn duplicate_id_fails_and_leaves_state_unchanged() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    db.insert_one("docs", doc! { "_id" => 1, "v" => "first" }).unwrap();
    let err = db
        .insert_one("docs", doc! { "_id" => 1, "v" => "second" })
        .unwrap_err();

    assert!(matches!(err, Error::IndexDuplicateKey { .. }));
    assert_eq!(db.count("docs", None).unwrap(), 1);
    let kept = db.find_one("docs", &Query::eq("_id", 1)).unwrap().unwrap();
    assert_eq!(kept.get("v"), Some(&Value::from("first")));
}

#[test]
fn failed_batch_rolls_back_only_the_open_buffer() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    let docs = vec![
        doc! { "_id" => 1 },
        doc! { "_id" => 2 },
        doc! { "_id" => 3 },
        doc! { "_id" => 1 }, // duplicate: fails inside the second buffer
    ];
    let err = db.insert_with("docs", docs, AutoId::ObjectId, 2).unwrap_err();

    assert!(matches!(err, Error::IndexDuplicateKey { .. }));
    // first buffer (ids 1, 2) committed; second buffer (3, dup) rolled back
    assert_eq!(db.count("docs", None).unwrap(), 2);
    assert!(db.exists("docs", &Query::eq("_id", 2)).unwrap());
    assert!(!db.exists("docs", &Query::eq("_id", 3)).unwrap());
}

#[test]
fn update_replaces_documents_whole() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    db.insert_one("docs", doc! { "_id" => 1, "old_field" => 1, "v" => 1 }).unwrap();
    let updated = db
        .update("docs", [doc! { "_id" => 1, "v" => 2 }])
        .unwrap();

    assert_eq!(updated, 1);
    let found = db.find_one("docs", &Query::eq("_id", 1)).unwrap().unwrap();
    assert_eq!(found, doc! { "_id" => 1, "v" => 2 });
}

#[test]
fn update_of_unknown_id_is_skipped() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    db.insert_one("docs", doc! { "_id" => 1 }).unwrap();
    assert_eq!(db.update("docs", [doc! { "_id" => 99 }]).unwrap(), 0);
    assert_eq!(db.count("docs", None).unwrap(), 1);
}

#[test]
fn update_growing_past_its_page_relocates_the_document() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    for i in 0..4 {
        db.insert_one("docs", doc! { "_id" => i, "pad" => "x".repeat(900) })
            .unwrap();
    }
    // grow one document far past the page it shares with its neighbors
    let big = "y".repeat(20_000);
    db.update("docs", [doc! { "_id" => 2, "pad" => big.clone() }]).unwrap();

    let found = db.find_one("docs", &Query::eq("_id", 2)).unwrap().unwrap();
    assert_eq!(found.get("pad"), Some(&Value::from(big)));
    // the others are untouched and still reachable through the index
    assert_eq!(db.count("docs", Some(&Query::all())).unwrap(), 4);
}

#[test]
fn update_that_changes_an_indexed_field_moves_its_index_node() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    db.insert_one("docs", doc! { "_id" => 1, "tag" => "old" }).unwrap();
    db.ensure_index("docs", "tag", false).unwrap();

    db.update("docs", [doc! { "_id" => 1, "tag" => "new" }]).unwrap();

    assert!(db.find("docs", &Query::eq("tag", "old")).unwrap().is_empty());
    assert_eq!(db.find("docs", &Query::eq("tag", "new")).unwrap().len(), 1);
}

#[test]
fn delete_by_query_removes_matches_only() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    db.insert("docs", (1..=10).map(|i| doc! { "_id" => i, "even" => (i % 2 == 0) }))
        .unwrap();

    let deleted = db.delete("docs", &Query::eq("even", true)).unwrap();

    assert_eq!(deleted, 5);
    assert_eq!(db.count("docs", None).unwrap(), 5);
    for d in db.find("docs", &Query::all()).unwrap() {
        assert_eq!(d.get("even"), Some(&Value::Bool(false)));
    }
}

#[test]
fn deleted_pages_are_reused_by_later_inserts() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    let batch = || (1..=50).map(|i| doc! { "_id" => i, "pad" => "z".repeat(200) });

    db.insert("docs", batch()).unwrap();
    let pages_after_first = db.dump().unwrap().lines().count();

    assert_eq!(db.delete("docs", &Query::all()).unwrap(), 50);
    db.insert("docs", batch()).unwrap();
    let pages_after_second = db.dump().unwrap().lines().count();

    assert!(
        pages_after_second <= pages_after_first + 2,
        "expected page reuse: {} pages grew to {}",
        pages_after_first,
        pages_after_second
    );
}

#[test]
fn min_and_max_read_the_index_edges() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    db.insert("docs", [7, -2, 40, 13].map(|v| doc! { "_id" => v })).unwrap();

    assert_eq!(db.min("docs", "_id").unwrap(), Some(Value::Int32(-2)));
    assert_eq!(db.max("docs", "_id").unwrap(), Some(Value::Int32(40)));
    assert_eq!(db.min("ghost", "_id").unwrap(), None);
}

#[test]
fn collections_can_be_listed_renamed_and_dropped() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    db.insert_one("alpha", doc! { "_id" => 1 }).unwrap();
    db.insert_one("beta", doc! { "_id" => 1 }).unwrap();

    let mut names = db.collection_names().unwrap();
    names.sort();
    assert_eq!(names, ["alpha", "beta"]);

    assert!(db.rename_collection("alpha", "gamma").unwrap());
    assert!(db.find_one("gamma", &Query::eq("_id", 1)).unwrap().is_some());
    assert!(db.find_one("alpha", &Query::eq("_id", 1)).unwrap().is_none());

    assert!(db.drop_collection("gamma").unwrap());
    assert!(!db.drop_collection("gamma").unwrap());
    assert_eq!(db.collection_names().unwrap(), ["beta"]);
}

#[test]
fn dropping_the_id_index_is_refused() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    db.insert_one("docs", doc! { "_id" => 1 }).unwrap();
    assert!(matches!(
        db.drop_index("docs", "_id"),
        Err(Error::InvalidFormat(_))
    ));
}

#[test]
fn drop_index_removes_only_that_index() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    db.insert("docs", (0..20).map(|i| doc! { "_id" => i, "v" => i * 2 })).unwrap();
    db.ensure_index("docs", "v", false).unwrap();

    assert!(db.drop_index("docs", "v").unwrap());
    assert!(!db.drop_index("docs", "v").unwrap());
    // queries on v still work: the index is rebuilt on demand
    assert_eq!(db.find("docs", &Query::gt("v", 20)).unwrap().len(), 9);
}

#[test]
fn read_only_engines_reject_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.db");
    {
        let db = Engine::open(&path).unwrap();
        db.insert_one("docs", doc! { "_id" => 1 }).unwrap();
    }

    let db = Engine::builder(&path).read_only(true).open().unwrap();
    assert_eq!(db.count("docs", None).unwrap(), 1);
    assert!(matches!(
        db.insert_one("docs", doc! { "_id" => 2 }),
        Err(Error::ReadOnly)
    ));
    assert!(matches!(db.drop_collection("docs"), Err(Error::ReadOnly)));
}

#[test]
fn opening_a_missing_file_read_only_fails() {
    let dir = tempdir().unwrap();
    let err = Engine::builder(dir.path().join("missing.db"))
        .read_only(true)
        .open()
        .unwrap_err();
    assert!(matches!(err, Error::FileNotFound(_)));
}

#[test]
fn oversized_collection_names_are_rejected() {
    let dir = tempdir().unwrap();
    let db = open(&dir);

    let err = db.insert_one(&"c".repeat(61), doc! { "_id" => 1 }).unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));
}
