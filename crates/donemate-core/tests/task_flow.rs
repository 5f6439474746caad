use std::fs;

use donemate_core::store::{DurableStore, FileStore, KeyValueStore};
use donemate_core::tasks::TaskList;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

const KEY: &str = "DoneMateItems";

fn open(dir: &std::path::Path) -> TaskList<FileStore> {
    let backend = FileStore::open(dir).expect("open file store");
    TaskList::open(DurableStore::new(backend, KEY))
}

#[test]
fn add_toggle_delete_survives_restart() {
    let temp = tempdir().expect("tempdir");

    {
        let mut list = open(temp.path());
        list.add("Buy milk");
        list.add("Pay rent");
        let first = list.tasks().as_slice()[0].id();
        let second = list.tasks().as_slice()[1].id();
        list.toggle(first);
        list.delete(second);
    }

    let list = open(temp.path());
    let tasks = list.tasks().as_slice();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].description(), "Buy milk");
    assert!(tasks[0].is_packed());
    assert!(tasks[0].done_at().is_some());

    let stats = list.stats();
    assert_eq!((stats.total, stats.done, stats.percent_complete), (1, 1, 100));
}

#[test]
fn clear_all_persists_an_empty_list() {
    let temp = tempdir().expect("tempdir");
    {
        let mut list = open(temp.path());
        list.add("one");
        list.add("two");
        list.clear_all();
    }

    let backend = FileStore::open(temp.path()).expect("open file store");
    let raw = backend.get(KEY).expect("read key").expect("key written");
    let payload: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(payload, serde_json::json!({ "version": 1, "tasks": [] }));
    assert!(open(temp.path()).is_empty());
}

#[test]
fn corrupt_file_starts_empty_and_is_replaced_on_next_change() {
    let temp = tempdir().expect("tempdir");
    let backend = FileStore::open(temp.path()).expect("open file store");
    fs::write(backend.path_for(KEY).expect("valid key"), "{ not json").expect("write corrupt file");

    let mut list = open(temp.path());
    assert!(list.is_empty());

    list.add("Fresh start");
    let reopened = open(temp.path());
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.tasks().as_slice()[0].description(), "Fresh start");
}

#[test]
fn legacy_array_payload_is_upgraded() {
    let temp = tempdir().expect("tempdir");
    let backend = FileStore::open(temp.path()).expect("open file store");
    fs::write(
        backend.path_for(KEY).expect("valid key"),
        r#"[{"id":1712000000000,"description":"Old entry","packed":true}]"#,
    )
    .expect("write legacy file");

    let mut list = open(temp.path());
    assert_eq!(list.len(), 1);
    assert!(list.tasks().as_slice()[0].is_packed());

    list.add("New entry");
    let raw = backend.get(KEY).expect("read key").expect("key written");
    assert!(raw.contains("\"version\":1"));
    assert_eq!(open(temp.path()).len(), 2);
}

#[test]
fn keys_that_would_collide_on_disk_are_refused() {
    let temp = tempdir().expect("tempdir");
    let backend = FileStore::open(temp.path()).expect("open file store");

    backend.set("a_b", "plain").expect("plain key writes");
    for key in ["a/b", "a b", "", "../escape", ".hidden"] {
        assert!(backend.set(key, "clobber").is_err(), "key {key:?} should be refused");
        assert!(backend.get(key).is_err(), "key {key:?} should be refused");
    }
    assert_eq!(backend.get("a_b").expect("read key").as_deref(), Some("plain"));
}
