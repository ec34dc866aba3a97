//! State store persistence tests against real sqlite files.

use chrono::{DateTime, TimeZone, Utc};
use std::io::Write;

use skymirror::source::TelescopeInstrument;
use skymirror::state::StateStore;

fn ts(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
}

#[tokio::test]
async fn test_fresh_database_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(&dir.path().join("state.db")).await.unwrap();

    let state = store.load().await.unwrap();
    assert!(state.watermark.is_none());
    assert!(state.mirrored.is_empty());
}

#[tokio::test]
async fn test_init_watermark_seeds_only_once() {
    let store = StateStore::in_memory().await.unwrap();

    store.init_watermark(ts(2025, 5, 15, 0)).await.unwrap();
    assert_eq!(store.watermark().await.unwrap(), Some(ts(2025, 5, 15, 0)));

    // Re-seeding with a different start time must not move anything
    store.init_watermark(ts(2025, 5, 1, 0)).await.unwrap();
    assert_eq!(store.watermark().await.unwrap(), Some(ts(2025, 5, 15, 0)));
}

#[tokio::test]
async fn test_watermark_only_moves_forward() {
    let store = StateStore::in_memory().await.unwrap();
    store.init_watermark(ts(2025, 5, 15, 0)).await.unwrap();

    store.advance_watermark(ts(2025, 5, 15, 12)).await.unwrap();
    assert_eq!(store.watermark().await.unwrap(), Some(ts(2025, 5, 15, 12)));

    // A stale advance is silently ignored
    store.advance_watermark(ts(2025, 5, 15, 6)).await.unwrap();
    assert_eq!(store.watermark().await.unwrap(), Some(ts(2025, 5, 15, 12)));
}

#[tokio::test]
async fn test_mirrored_triples_round_trip() {
    let store = StateStore::in_memory().await.unwrap();

    let pair = TelescopeInstrument::new("TAROT", "TCA");
    let bare = TelescopeInstrument::label("FRAM-Auger");
    store
        .record_mirrored("ZTF25ab", &pair, ts(2025, 5, 15, 12))
        .await
        .unwrap();
    store
        .record_mirrored("ZTF25ab", &bare, ts(2025, 5, 15, 12))
        .await
        .unwrap();

    // Recording the same triple twice is a no-op
    store
        .record_mirrored("ZTF25ab", &pair, ts(2025, 5, 15, 12))
        .await
        .unwrap();

    let state = store.load().await.unwrap();
    assert_eq!(state.mirrored.len(), 2);
    assert!(state.mirrored.contains(&(
        "ZTF25ab".to_string(),
        "TAROT".to_string(),
        "TCA".to_string()
    )));
    assert!(state.mirrored.contains(&(
        "ZTF25ab".to_string(),
        "FRAM-Auger".to_string(),
        String::new()
    )));
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.db");

    {
        let store = StateStore::open(&db_path).await.unwrap();
        store.init_watermark(ts(2025, 5, 15, 0)).await.unwrap();
        store.advance_watermark(ts(2025, 5, 15, 12)).await.unwrap();
        store
            .record_mirrored(
                "ZTF25ab",
                &TelescopeInstrument::label("TAROT-TCA"),
                ts(2025, 5, 15, 12),
            )
            .await
            .unwrap();
    }

    let store = StateStore::open(&db_path).await.unwrap();
    let state = store.load().await.unwrap();
    assert_eq!(state.watermark, Some(ts(2025, 5, 15, 12)));
    assert_eq!(state.mirrored.len(), 1);
}

#[tokio::test]
async fn test_prune_drops_only_entries_before_cutoff() {
    let store = StateStore::in_memory().await.unwrap();

    store
        .record_mirrored(
            "old",
            &TelescopeInstrument::label("TAROT-TCA"),
            ts(2025, 5, 1, 0),
        )
        .await
        .unwrap();
    store
        .record_mirrored(
            "new",
            &TelescopeInstrument::label("TAROT-TCA"),
            ts(2025, 5, 15, 0),
        )
        .await
        .unwrap();

    let pruned = store.prune(ts(2025, 5, 8, 0)).await.unwrap();
    assert_eq!(pruned, 1);

    let state = store.load().await.unwrap();
    assert_eq!(state.mirrored.len(), 1);
    assert!(state
        .mirrored
        .contains(&("new".to_string(), "TAROT-TCA".to_string(), String::new())));
}

#[tokio::test]
async fn test_corrupt_database_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.db");
    {
        let mut f = std::fs::File::create(&db_path).unwrap();
        f.write_all(b"this is not a sqlite database, not even close")
            .unwrap();
    }

    let err = StateStore::open(&db_path).await.unwrap_err();
    assert!(matches!(err, skymirror_common::Error::StateCorrupt(_)));
}
