mod helpers;

use std::time::Duration;

use hashchain_core::{Chain, ChainError, SharedChain};
use helpers::create_temp_file;

/// Far beyond what a test run can find.
const UNREACHABLE_DIFFICULTY: u32 = 20;

#[tokio::test]
async fn test_sequential_appends_through_worker() -> anyhow::Result<()> {
    let shared = SharedChain::new(Chain::new(1));
    shared.append("Alice pays Bob 5").await?;
    shared.append("Bob pays Carol 3").await?;
    assert_eq!(shared.len().await, 3);
    assert!(shared.validate().await.is_valid());
    let hits = shared.search("carol").await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].index, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_running_append_is_all_or_nothing() -> anyhow::Result<()> {
    let shared = SharedChain::new(Chain::new(1));
    shared.set_difficulty(UNREACHABLE_DIFFICULTY).await?;

    let pending = shared.append("too hard");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished());
    pending.cancel();

    let err = pending.await.unwrap_err();
    assert!(matches!(err, ChainError::Cancelled));
    assert_eq!(shared.len().await, 1);
    assert!(shared.validate().await.is_valid());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_append_timeout_cancels_search() -> anyhow::Result<()> {
    let shared = SharedChain::new(Chain::new(1));
    shared.set_difficulty(UNREACHABLE_DIFFICULTY).await?;

    let limit = Duration::from_millis(50);
    let err = shared.append_with_timeout("too hard", limit).await.unwrap_err();
    assert!(matches!(err, ChainError::MiningTimeout(d) if d == limit));
    assert_eq!(shared.len().await, 1);

    // The chain is usable again once the cancelled search has released it.
    shared.set_difficulty(1).await?;
    let block = shared.append_with_timeout("easy", Duration::from_secs(30)).await?;
    assert_eq!(block.header.index, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_are_serialized() -> anyhow::Result<()> {
    let shared = SharedChain::new(Chain::new(1));
    let pending: Vec<_> = (0..8).map(|i| shared.append(format!("tx {i}"))).collect();
    for p in pending {
        p.await?;
    }
    let blocks = shared.blocks().await;
    assert_eq!(blocks.len(), 9);
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].header.previous_hash, pair[0].hash_hex());
    }
    assert!(shared.validate().await.is_valid());
    Ok(())
}

#[tokio::test]
async fn test_tamper_and_export_through_handle() -> anyhow::Result<()> {
    let (_dir, path) = create_temp_file("shared.json");
    let shared = SharedChain::new(Chain::new(1));
    shared.append("one").await?;

    assert!(matches!(
        shared.tamper(0).await,
        Err(ChainError::InvalidTamperTarget { .. })
    ));
    shared.tamper(1).await?;
    assert!(!shared.validate().await.is_valid());

    shared.export_to_path(&path).await?;
    let restored = Chain::import_from_path(&path)?;
    assert_eq!(restored.len(), 2);
    shared.replace(restored).await;
    assert_eq!(shared.len().await, 2);
    Ok(())
}
