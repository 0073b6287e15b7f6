//! Tests for the completion stores.

use ironsift::cache::{AppendLogStore, CompletionStore, MarkerDirStore, open_store};
use ironsift::CacheBackend;
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn exercise(store: &dyn CompletionStore) -> anyhow::Result<()> {
    assert!(!store.has(123));
    store.mark_done(123)?;
    assert!(store.has(123));
    // Marking twice is a no-op.
    store.mark_done(123)?;
    store.mark_done(999)?;
    assert_eq!(store.done_ids()?, HashSet::from([123, 999]));
    Ok(())
}

#[test]
fn test_marker_dir_basics() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let store = MarkerDirStore::open(tmp.path().join("done"))?;
    exercise(&store)?;
    assert!(tmp.path().join("done").join("123.done").exists());
    Ok(())
}

#[test]
fn test_append_log_basics() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let store = AppendLogStore::open(tmp.path().join("state").join("done.log"))?;
    exercise(&store)?;
    assert_eq!(fs::read_to_string(store.path())?, "123\n999\n");
    Ok(())
}

#[test]
fn test_done_survives_reopen() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let dir = tmp.path().join("markers");
    let log = tmp.path().join("done.log");
    {
        MarkerDirStore::open(&dir)?.mark_done(42)?;
        AppendLogStore::open(&log)?.mark_done(42)?;
    }
    assert!(MarkerDirStore::open(&dir)?.has(42));
    assert!(AppendLogStore::open(&log)?.has(42));
    assert!(!AppendLogStore::open(&log)?.has(43));
    Ok(())
}

#[test]
fn test_append_log_drops_torn_tail() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let log = tmp.path().join("done.log");
    fs::write(&log, "1\n2\n3")?;

    let store = AppendLogStore::open(&log)?;
    assert!(store.has(1));
    assert!(store.has(2));
    assert!(!store.has(3));

    store.mark_done(4)?;
    assert_eq!(fs::read_to_string(&log)?, "1\n2\n4\n");
    Ok(())
}

#[test]
fn test_append_log_skips_garbage_lines() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let log = tmp.path().join("done.log");
    fs::write(&log, "1\nnot-an-id\n\n5\n")?;
    let store = AppendLogStore::open(&log)?;
    assert_eq!(store.done_ids()?, HashSet::from([1, 5]));
    Ok(())
}

#[test]
fn test_marker_dir_ignores_foreign_files() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let store = MarkerDirStore::open(tmp.path())?;
    fs::write(tmp.path().join("README"), "x")?;
    fs::write(tmp.path().join("abc.done"), "")?;
    store.mark_done(7)?;
    assert_eq!(store.done_ids()?, HashSet::from([7]));
    Ok(())
}

#[test]
fn test_concurrent_marks() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let markers: Arc<dyn CompletionStore> = Arc::new(MarkerDirStore::open(tmp.path().join("m"))?);
    let log: Arc<dyn CompletionStore> = Arc::new(AppendLogStore::open(tmp.path().join("l.log"))?);

    for store in [markers, log] {
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || -> anyhow::Result<()> {
                    // Overlapping ranges: every id is marked by two threads.
                    for id in (t * 25)..(t * 25 + 50) {
                        store.mark_done(id)?;
                    }
                    Ok(())
                })
            })
            .collect();
        for h in handles {
            h.join().expect("worker panicked")?;
        }
        assert_eq!(store.done_ids()?.len(), 225);
    }
    Ok(())
}

#[test]
fn test_open_store_from_backend() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let store = open_store(&CacheBackend::AppendLog(tmp.path().join("done.log")))?;
    store.mark_done(1)?;
    let store = open_store(&CacheBackend::MarkerDir(tmp.path().join("markers")))?;
    assert!(!store.has(1));
    store.mark_done(1)?;
    assert!(tmp.path().join("markers/1.done").exists());
    Ok(())
}
