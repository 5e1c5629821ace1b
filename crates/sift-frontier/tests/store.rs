use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sift_frontier::{FrontierError, FrontierStore, SelectionMode, UrlStatus};

const LEASE: Duration = Duration::from_secs(60);

fn temp_store(max_retries: u32) -> (tempfile::TempDir, FrontierStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FrontierStore::open(dir.path().join("frontier.db"), max_retries).unwrap();
    (dir, store)
}

#[test]
fn insert_is_idempotent() {
    let (_dir, store) = temp_store(3);

    assert!(store.insert("https://example.com/a", None, 0).unwrap());
    // Same page through a different spelling of the URL.
    assert!(!store.insert("https://example.com/a/#top", None, 1).unwrap());

    let stats = store.stats().unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.pending, 1);

    // The first insert wins; depth is not overwritten.
    let record = store.get("https://example.com/a").unwrap().unwrap();
    assert_eq!(record.depth, 0);
}

#[test]
fn claim_leases_and_respects_limit() {
    let (_dir, store) = temp_store(3);
    for i in 0..5 {
        store
            .insert(&format!("https://example.com/p{i}"), None, 0)
            .unwrap();
    }

    let batch = store
        .claim_batch("w1", 3, LEASE, SelectionMode::Deterministic)
        .unwrap();
    assert_eq!(batch.len(), 3);
    for record in &batch {
        assert_eq!(record.status, UrlStatus::Leased);
        assert_eq!(record.lease_owner.as_deref(), Some("w1"));
        assert!(record.lease_expires_at_ms.is_some());
    }

    // Only the two unleased rows remain eligible.
    let rest = store
        .claim_batch("w2", 10, LEASE, SelectionMode::Randomized)
        .unwrap();
    assert_eq!(rest.len(), 2);

    let empty = store
        .claim_batch("w3", 10, LEASE, SelectionMode::Deterministic)
        .unwrap();
    assert!(empty.is_empty());
}

#[test]
fn deterministic_claim_prefers_shallow_rows() {
    let (_dir, store) = temp_store(3);
    store.insert("https://example.com/deep", None, 4).unwrap();
    store.insert("https://example.com/shallow", None, 0).unwrap();

    let batch = store
        .claim_batch("w1", 1, LEASE, SelectionMode::Deterministic)
        .unwrap();
    assert_eq!(batch[0].normalized_url, "https://example.com/shallow");
}

#[test]
fn concurrent_claims_never_overlap() {
    let (_dir, store) = temp_store(3);
    for i in 0..40 {
        store
            .insert(&format!("https://example.com/page/{i}"), None, 0)
            .unwrap();
    }

    let store = Arc::new(store);
    let mut handles = vec![];
    for w in 0..8 {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            let mut mine = vec![];
            loop {
                let batch = store
                    .claim_batch(&format!("w{w}"), 3, LEASE, SelectionMode::Randomized)
                    .unwrap();
                if batch.is_empty() {
                    break;
                }
                mine.extend(batch.into_iter().map(|r| r.normalized_url));
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    let mut claimed = 0;
    for handle in handles {
        for url in handle.join().unwrap() {
            claimed += 1;
            assert!(seen.insert(url), "url claimed twice");
        }
    }
    assert_eq!(claimed, 40);
}

#[test]
fn expired_leases_are_reclaimed_without_retry_penalty() {
    let (_dir, store) = temp_store(3);
    store.insert("https://example.com/a", None, 0).unwrap();

    let batch = store
        .claim_batch("w1", 1, Duration::ZERO, SelectionMode::Deterministic)
        .unwrap();
    assert_eq!(batch.len(), 1);

    thread::sleep(Duration::from_millis(5));
    assert_eq!(store.reclaim_expired_leases().unwrap(), 1);

    let record = store.get(&batch[0].normalized_url).unwrap().unwrap();
    assert_eq!(record.status, UrlStatus::Pending);
    assert_eq!(record.retry_count, 0);
    assert!(record.lease_owner.is_none());
    assert!(record.lease_expires_at_ms.is_none());
}

#[test]
fn expired_lease_is_claimable_again() {
    let (_dir, store) = temp_store(3);
    store.insert("https://example.com/a", None, 0).unwrap();

    store
        .claim_batch("w1", 1, Duration::ZERO, SelectionMode::Deterministic)
        .unwrap();
    thread::sleep(Duration::from_millis(5));

    // No reclaim pass in between: claim itself picks up expired leases.
    let batch = store
        .claim_batch("w2", 1, LEASE, SelectionMode::Deterministic)
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].lease_owner.as_deref(), Some("w2"));
    assert_eq!(batch[0].retry_count, 0);
}

#[test]
fn failures_reach_terminal_failed_past_ceiling() {
    let (_dir, store) = temp_store(2);
    store.insert("https://example.com/flaky", None, 0).unwrap();

    // Two failures stay retryable (retry_count <= 2), the third is final.
    for attempt in 1..=3u32 {
        let batch = store
            .claim_batch("w1", 1, LEASE, SelectionMode::Deterministic)
            .unwrap();
        assert_eq!(batch.len(), 1, "attempt {attempt} should claim the row");
        store
            .mark_failure(&batch[0].normalized_url, "w1")
            .unwrap();
    }

    let record = store.get("https://example.com/flaky").unwrap().unwrap();
    assert_eq!(record.status, UrlStatus::Failed);
    assert_eq!(record.retry_count, 3);

    // Terminal: never claimable or reclaimable again.
    let batch = store
        .claim_batch("w1", 1, LEASE, SelectionMode::Deterministic)
        .unwrap();
    assert!(batch.is_empty());
    assert_eq!(store.reclaim_expired_leases().unwrap(), 0);
}

#[test]
fn success_and_release_transitions() {
    let (_dir, store) = temp_store(3);
    store.insert("https://example.com/a", None, 0).unwrap();
    store.insert("https://example.com/b", None, 0).unwrap();

    let batch = store
        .claim_batch("w1", 2, LEASE, SelectionMode::Deterministic)
        .unwrap();

    store.mark_success(&batch[0].normalized_url, "w1").unwrap();
    let record = store.get(&batch[0].normalized_url).unwrap().unwrap();
    assert_eq!(record.status, UrlStatus::Success);
    assert!(record.lease_owner.is_none());

    store.release(&batch[1].normalized_url, "w1").unwrap();
    let record = store.get(&batch[1].normalized_url).unwrap().unwrap();
    assert_eq!(record.status, UrlStatus::Pending);
    assert_eq!(record.retry_count, 0);
}

#[test]
fn finishing_an_unleased_record_is_an_error() {
    let (_dir, store) = temp_store(3);
    store.insert("https://example.com/a", None, 0).unwrap();

    let err = store
        .mark_success("https://example.com/a", "w1")
        .unwrap_err();
    assert!(matches!(err, FrontierError::NotLeased(_)));

    let err = store.mark_success("https://example.com/nope", "w1").unwrap_err();
    assert!(matches!(err, FrontierError::UnknownUrl(_)));
}

#[test]
fn stats_aggregate_by_status() {
    let (_dir, store) = temp_store(0);
    store.insert("https://example.com/a", None, 0).unwrap();
    store.insert("https://example.com/b", None, 0).unwrap();
    store.insert("https://example.com/c", None, 0).unwrap();

    let batch = store
        .claim_batch("w1", 2, LEASE, SelectionMode::Deterministic)
        .unwrap();
    store.mark_success(&batch[0].normalized_url, "w1").unwrap();
    // Ceiling of 0 retries: first failure is terminal.
    store.mark_failure(&batch[1].normalized_url, "w1").unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.leased, 0);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total, 3);
}
