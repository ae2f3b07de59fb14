//! Scale-up under concurrent load, followed by reap back to the minimum.

mod mock;

use mock::start_cluster;
use quorumdb_client::Client;
use quorumdb_common::{ClientConfig, PoolConfig};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scale_up_under_load_then_reap() {
    let (leader, _peers) = start_cluster(0, 10).await;
    leader.state.query_delay_ms.store(100, Ordering::SeqCst);

    let pool = PoolConfig::default()
        .with_scale_up_batch(2)
        .with_scale_up_threshold(4)
        .with_max_sessions(10)
        .with_idle_timeout(Duration::from_millis(300))
        .with_scale_down_interval(Duration::from_millis(200));
    let config = ClientConfig::default()
        .with_server_url(&leader.url())
        .with_pool(pool);

    let client = Client::new(config).unwrap();
    client.connect("admin", "admin").await.unwrap();
    assert_eq!(client.pool_metrics().await.nodes["1"].read_sessions, 2);

    // 30 concurrent reads against a server that answers in 100 ms: the
    // active count blows through the threshold and triggers one scale-up
    // (the debounce blocks the rest)
    let mut handles = Vec::new();
    for _ in 0..30 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.select_one("users").await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    // give the scale worker a moment to finish publishing the batch
    tokio::time::sleep(Duration::from_millis(100)).await;

    let metrics = client.pool_metrics().await;
    let node = &metrics.nodes["1"];
    assert!(
        node.read_sessions >= 4,
        "expected scale-up past the batch minimum, have {}",
        node.read_sessions
    );
    assert!(node.read_sessions <= 10, "ceiling exceeded");
    // warm-up plus the load-driven batch
    assert!(metrics.scale_up_events >= 2);

    // quiescence: idle timeout plus a few reaper periods brings the pool
    // back to the batch minimum
    tokio::time::sleep(Duration::from_millis(900)).await;

    let metrics = client.pool_metrics().await;
    let node = &metrics.nodes["1"];
    assert_eq!(node.read_sessions, 2, "reap should trim back to the batch");
    assert_eq!(node.write_sessions, 1);
    assert!(metrics.scale_down_events >= 1);

    client.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_steady_light_load_keeps_pool_at_minimum() {
    let (leader, _peers) = start_cluster(0, 10).await;

    let pool = PoolConfig::default()
        .with_scale_up_batch(1)
        .with_idle_timeout(Duration::from_millis(400))
        .with_scale_down_interval(Duration::from_millis(150));
    let config = ClientConfig::default()
        .with_server_url(&leader.url())
        .with_pool(pool);

    let client = Client::new(config).unwrap();
    client.connect("admin", "admin").await.unwrap();

    // steady slow traffic below the threshold: the reaper runs repeatedly
    // but the sessions never idle long enough to be reaped
    for _ in 0..6 {
        client.select_one("users").await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    let metrics = client.pool_metrics().await;
    assert_eq!(metrics.nodes["1"].read_sessions, 1);
    assert_eq!(metrics.scale_down_events, 0);

    client.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_during_load_completes() {
    let (leader, _peers) = start_cluster(0, 10).await;
    leader.state.query_delay_ms.store(100, Ordering::SeqCst);

    let pool = PoolConfig::default()
        .with_scale_up_batch(2)
        .with_scale_up_threshold(2);
    let config = ClientConfig::default()
        .with_server_url(&leader.url())
        .with_pool(pool);

    let client = Client::new(config).unwrap();
    client.connect("admin", "admin").await.unwrap();

    // fire requests, then close while some are still in flight; close must
    // return promptly and in-flight requests keep their session handles
    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let _ = client.select_one("users").await;
        }));
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    tokio::time::timeout(Duration::from_secs(2), client.close())
        .await
        .expect("close did not complete in bounded time");

    for handle in handles {
        handle.await.unwrap();
    }
    assert!(!client.is_connected().await);
}
