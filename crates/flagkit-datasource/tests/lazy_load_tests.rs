// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lazy-load system semantics: TTL refresh, error handling, bulk reads.

use flagkit_core::DataKind;
use flagkit_datasource::LazyLoad;
use flagkit_datasource::DataSourceStatusManager;
use flagkit_store::{
    PersistError, SerializedDataReader, SerializedItemDescriptor, Store,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn flag_json(key: &str, version: u64) -> String {
    format!(
        r#"{{"key":"{key}","version":{version},"on":true,
            "variations":[true,false],"fallthrough":{{"variation":0}}}}"#
    )
}

fn present(json: String, version: u64) -> SerializedItemDescriptor {
    SerializedItemDescriptor {
        version,
        deleted: false,
        serialized_item: Some(json),
    }
}

#[derive(Default)]
struct FakeReader {
    flags: Mutex<HashMap<String, SerializedItemDescriptor>>,
    gets: AtomicUsize,
    alls: AtomicUsize,
    fail: AtomicBool,
    initialized: AtomicBool,
}

impl FakeReader {
    fn with_flag(key: &str, version: u64) -> Self {
        let reader = Self::default();
        reader.flags.lock().unwrap().insert(
            key.to_owned(),
            present(flag_json(key, version), version),
        );
        reader.initialized.store(true, Ordering::SeqCst);
        reader
    }
}

impl SerializedDataReader for FakeReader {
    fn get(
        &self,
        _kind: DataKind,
        key: &str,
    ) -> Result<Option<SerializedItemDescriptor>, PersistError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PersistError::new("store unavailable"));
        }
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.flags.lock().unwrap().get(key).cloned())
    }

    fn all(
        &self,
        _kind: DataKind,
    ) -> Result<HashMap<String, SerializedItemDescriptor>, PersistError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PersistError::new("store unavailable"));
        }
        self.alls.fetch_add(1, Ordering::SeqCst);
        Ok(self.flags.lock().unwrap().clone())
    }

    fn initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn identity(&self) -> String {
        "fake reader".to_owned()
    }
}

fn system(reader: Arc<FakeReader>, ttl: Duration) -> LazyLoad {
    LazyLoad::new(reader, ttl, Arc::new(DataSourceStatusManager::new()))
}

#[test]
fn fresh_items_are_served_from_cache() {
    let reader = Arc::new(FakeReader::with_flag("f", 1));
    let lazy = system(reader.clone(), Duration::from_secs(60));

    assert!(lazy.get_flag("f").unwrap().is_present());
    assert!(lazy.get_flag("f").unwrap().is_present());
    assert_eq!(reader.gets.load(Ordering::SeqCst), 1);
}

#[test]
fn stale_items_are_refetched() {
    let reader = Arc::new(FakeReader::with_flag("f", 1));
    let lazy = system(reader.clone(), Duration::ZERO);

    let _ = lazy.get_flag("f");
    let _ = lazy.get_flag("f");
    assert_eq!(reader.gets.load(Ordering::SeqCst), 2);
}

#[test]
fn reader_errors_serve_stale_and_reattempt() {
    let reader = Arc::new(FakeReader::with_flag("f", 1));
    let lazy = system(reader.clone(), Duration::ZERO);

    assert!(lazy.get_flag("f").is_some());
    reader.fail.store(true, Ordering::SeqCst);
    // The cached value is still served even though the refresh failed.
    assert!(lazy.get_flag("f").is_some());

    // Recovery: the tracker was never updated, so the next call refetches.
    reader.fail.store(false, Ordering::SeqCst);
    reader
        .flags
        .lock()
        .unwrap()
        .insert("f".to_owned(), present(flag_json("f", 2), 2));
    assert_eq!(lazy.get_flag("f").unwrap().version, 2);
}

#[test]
fn deleted_items_become_tombstones() {
    let reader = Arc::new(FakeReader::with_flag("f", 1));
    reader.flags.lock().unwrap().insert(
        "gone".to_owned(),
        SerializedItemDescriptor {
            version: 5,
            deleted: true,
            serialized_item: None,
        },
    );
    let lazy = system(reader, Duration::from_secs(60));

    let descriptor = lazy.get_flag("gone").unwrap();
    assert!(!descriptor.is_present());
    assert_eq!(descriptor.version, 5);
}

#[test]
fn missing_items_are_absent_and_tracked() {
    let reader = Arc::new(FakeReader::with_flag("f", 1));
    let lazy = system(reader.clone(), Duration::from_secs(60));

    assert!(lazy.get_flag("nope").is_none());
    // The miss is cached for the TTL; no second fetch.
    assert!(lazy.get_flag("nope").is_none());
    assert_eq!(reader.gets.load(Ordering::SeqCst), 1);
}

#[test]
fn all_flags_is_one_bulk_fetch_per_ttl_window() {
    let reader = Arc::new(FakeReader::with_flag("f", 1));
    let lazy = system(reader.clone(), Duration::from_secs(60));

    assert_eq!(lazy.all_flags().len(), 1);
    assert_eq!(lazy.all_flags().len(), 1);
    assert_eq!(reader.alls.load(Ordering::SeqCst), 1);
    // Individual reads are satisfied by the bulk-primed cache.
    assert!(lazy.get_flag("f").is_some());
    assert_eq!(reader.gets.load(Ordering::SeqCst), 0);
}

#[test]
fn initialized_sticks_once_true() {
    let reader = Arc::new(FakeReader::with_flag("f", 1));
    reader.initialized.store(false, Ordering::SeqCst);
    let lazy = system(reader.clone(), Duration::from_secs(60));

    assert!(!lazy.initialized());
    // Within the TTL the cached false is served without re-reading.
    assert!(!lazy.initialized());

    let short = system(reader.clone(), Duration::ZERO);
    reader.initialized.store(true, Ordering::SeqCst);
    assert!(short.initialized());
    reader.initialized.store(false, Ordering::SeqCst);
    // Once observed true, always true.
    assert!(short.initialized());
}
