//! Tests for the dedup lock: atomic acquire, compare-and-delete release,
//! lease expiry.

use std::time::Duration;

use muninn::store::{Acquire, DedupLock, MemoryDedupLock};
use muninn::types::{Operation, OperationParams};
use muninn::FingerprintKey;

fn key(url: &str) -> FingerprintKey {
    FingerprintKey::derive(Operation::Ocr, url, &OperationParams::default()).unwrap()
}

#[tokio::test]
async fn second_acquire_is_busy() {
    let lock = MemoryDedupLock::new();
    let k = key("https://img.example/a.jpg");

    let first = lock.acquire(&k, Duration::from_secs(30)).await.unwrap();
    assert!(matches!(first, Acquire::Acquired(_)));

    let second = lock.acquire(&k, Duration::from_secs(30)).await.unwrap();
    match second {
        Acquire::Busy { holder_expires_at } => {
            assert!(holder_expires_at > std::time::SystemTime::now());
        }
        Acquire::Acquired(_) => panic!("second acquire must observe the first holder"),
    }
}

#[tokio::test]
async fn release_allows_reacquire() {
    let lock = MemoryDedupLock::new();
    let k = key("https://img.example/a.jpg");

    let Acquire::Acquired(token) = lock.acquire(&k, Duration::from_secs(30)).await.unwrap()
    else {
        panic!("fresh key must be acquirable");
    };
    lock.release(&token).await.unwrap();

    assert!(matches!(
        lock.acquire(&k, Duration::from_secs(30)).await.unwrap(),
        Acquire::Acquired(_)
    ));
}

#[tokio::test]
async fn different_keys_are_independent() {
    let lock = MemoryDedupLock::new();
    let a = key("https://img.example/a.jpg");
    let b = key("https://img.example/b.jpg");

    assert!(matches!(
        lock.acquire(&a, Duration::from_secs(30)).await.unwrap(),
        Acquire::Acquired(_)
    ));
    assert!(matches!(
        lock.acquire(&b, Duration::from_secs(30)).await.unwrap(),
        Acquire::Acquired(_)
    ));
}

#[tokio::test]
async fn competing_acquire_succeeds_only_after_lease_expiry() {
    let lock = MemoryDedupLock::new();
    let k = key("https://img.example/a.jpg");

    // Holder acquires and never releases.
    let first = lock.acquire(&k, Duration::from_millis(60)).await.unwrap();
    assert!(matches!(first, Acquire::Acquired(_)));

    // Before expiry: busy.
    assert!(matches!(
        lock.acquire(&k, Duration::from_secs(30)).await.unwrap(),
        Acquire::Busy { .. }
    ));

    // After expiry: the key frees up on its own.
    tokio::time::sleep(Duration::from_millis(90)).await;
    assert!(matches!(
        lock.acquire(&k, Duration::from_secs(30)).await.unwrap(),
        Acquire::Acquired(_)
    ));
}

#[tokio::test]
async fn late_release_does_not_clobber_new_holder() {
    let lock = MemoryDedupLock::new();
    let k = key("https://img.example/a.jpg");

    let Acquire::Acquired(stale_token) =
        lock.acquire(&k, Duration::from_millis(40)).await.unwrap()
    else {
        panic!("fresh key must be acquirable");
    };

    // The stale holder's lease lapses and a new holder takes over.
    tokio::time::sleep(Duration::from_millis(70)).await;
    let Acquire::Acquired(_) = lock.acquire(&k, Duration::from_secs(30)).await.unwrap() else {
        panic!("expired lease must be reassignable");
    };

    // The stale holder's release must be a no-op now.
    lock.release(&stale_token).await.unwrap();
    assert!(matches!(
        lock.acquire(&k, Duration::from_secs(30)).await.unwrap(),
        Acquire::Busy { .. }
    ));
}

#[tokio::test]
async fn renew_extends_a_held_lease() {
    let lock = MemoryDedupLock::new();
    let k = key("https://img.example/a.jpg");

    let Acquire::Acquired(token) = lock.acquire(&k, Duration::from_millis(50)).await.unwrap()
    else {
        panic!("fresh key must be acquirable");
    };
    let token = lock.renew(&token, Duration::from_secs(30)).await.unwrap();

    // Past the original lease, still held thanks to the renewal.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(matches!(
        lock.acquire(&k, Duration::from_secs(30)).await.unwrap(),
        Acquire::Busy { .. }
    ));
    lock.release(&token).await.unwrap();
}

#[tokio::test]
async fn renew_fails_once_the_lease_is_lost() {
    let lock = MemoryDedupLock::new();
    let k = key("https://img.example/a.jpg");

    let Acquire::Acquired(token) = lock.acquire(&k, Duration::from_millis(40)).await.unwrap()
    else {
        panic!("fresh key must be acquirable");
    };
    tokio::time::sleep(Duration::from_millis(70)).await;

    assert!(lock.renew(&token, Duration::from_secs(30)).await.is_err());
}
