#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use palate_api::ApiError;
use palate_store::ResourceCache;

#[tokio::test(flavor = "current_thread")]
async fn concurrent_callers_share_one_fetch() {
    let cache: ResourceCache<String, String> = ResourceCache::new("test");
    let fetches = Arc::new(AtomicU32::new(0));
    let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();

    // Owner blocks on the gate mid-fetch.
    let c1 = cache.clone();
    let f1 = fetches.clone();
    let owner = tokio::spawn(async move {
        c1.get_or_fetch("kimchi".to_string(), move || async move {
            f1.fetch_add(1, Ordering::SeqCst);
            let _ = gate_rx.await;
            Ok("spicy cabbage".to_string())
        })
        .await
    });
    tokio::task::yield_now().await;
    assert!(cache.state(&"kimchi".to_string()).is_loading());

    // Second caller for the same key must coalesce, not fetch.
    let c2 = cache.clone();
    let f2 = fetches.clone();
    let waiter = tokio::spawn(async move {
        c2.get_or_fetch("kimchi".to_string(), move || async move {
            f2.fetch_add(1, Ordering::SeqCst);
            Ok("wrong value".to_string())
        })
        .await
    });
    tokio::task::yield_now().await;

    gate_tx.send(()).unwrap();
    let got_owner = owner.await.unwrap().unwrap();
    let got_waiter = waiter.await.unwrap().unwrap();
    assert_eq!(got_owner, "spicy cabbage");
    assert_eq!(got_waiter, "spicy cabbage");
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn settled_values_replay_without_refetch() {
    let cache: ResourceCache<String, u32> = ResourceCache::new("test");
    let fetches = Arc::new(AtomicU32::new(0));

    let f = fetches.clone();
    let first = cache
        .get_or_fetch("k".to_string(), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
        .await;
    assert_eq!(first.unwrap(), 42);

    let f = fetches.clone();
    let second = cache
        .get_or_fetch("k".to_string(), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        })
        .await;
    assert_eq!(second.unwrap(), 42);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn errors_settle_and_replay() {
    let cache: ResourceCache<String, u32> = ResourceCache::new("test");
    let fetches = Arc::new(AtomicU32::new(0));

    let f = fetches.clone();
    let first = cache
        .get_or_fetch("k".to_string(), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::Remote { status: 500, message: "boom".into() })
        })
        .await;
    assert!(matches!(first, Err(ApiError::Remote { status: 500, .. })));

    // The error is the settled outcome; a later caller sees it replayed
    // and its own fetch closure never runs.
    let f = fetches.clone();
    let second = cache
        .get_or_fetch("k".to_string(), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        })
        .await;
    assert!(matches!(second, Err(ApiError::Remote { status: 500, .. })));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn keys_settle_independently() {
    let cache: ResourceCache<String, u32> = ResourceCache::new("test");

    let ok = cache.get_or_fetch("good".to_string(), || async { Ok(1) }).await;
    let bad = cache
        .get_or_fetch("bad".to_string(), || async {
            Err(ApiError::Unreachable("connect refused".into()))
        })
        .await;

    assert_eq!(ok.unwrap(), 1);
    assert!(bad.is_err());
    assert_eq!(cache.state(&"good".to_string()).as_ready(), Some(&1));
    assert!(matches!(
        cache.state(&"bad".to_string()),
        palate_store::FetchState::Error(ApiError::Unreachable(_))
    ));
}
