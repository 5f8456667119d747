// ============================================================================
// Preloader Tests
// ============================================================================

use std::{sync::Arc, time::Duration};

use super::Preloader;
use crate::{
    source::types::{FileAssetSource, HttpAssetSource, Payload, PayloadOrigin},
    testing::StubSource,
};

// ------------------------------------------------------------------------
// Stub Source Tests
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_preload_fetched() {
    let source = StubSource::ok(b"GIF89a...");
    let preloader = Preloader::new(source.clone(), 1024, 7);

    assert!(preloader.cached().is_none());
    let payload = preloader.preload().await;
    assert_eq!(payload.data(), b"GIF89a...");
    assert_eq!(preloader.origin(), Some(PayloadOrigin::Fetched));
    assert_eq!(preloader.cached(), Some(payload));
}

#[tokio::test]
async fn test_preload_falls_back_on_failure() {
    let preloader = Preloader::new(StubSource::failing(), 64 * 1024, 7);

    let payload = preloader.preload().await;
    assert_eq!(payload.len(), 64 * 1024);
    assert_eq!(preloader.origin(), Some(PayloadOrigin::Fallback));
    assert_eq!(payload, Payload::generate(64 * 1024, 7));
}

#[tokio::test]
async fn test_preload_empty_body_is_failure() {
    let preloader = Preloader::new(StubSource::ok(b""), 16, 1);

    let payload = preloader.preload().await;
    assert_eq!(payload.len(), 16);
    assert_eq!(preloader.origin(), Some(PayloadOrigin::Fallback));
}

#[tokio::test]
async fn test_preload_is_idempotent() {
    let source = StubSource::failing();
    let preloader = Preloader::new(source.clone(), 4096, 9);

    let first = preloader.preload().await;
    let second = preloader.preload().await;
    assert_eq!(first, second);
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_preload_concurrent_callers_share_load() {
    let source = StubSource::slow(b"asset", Duration::from_millis(200));
    let preloader = Preloader::new(source.clone(), 16, 1);

    let (a, b) = tokio::join!(preloader.preload(), preloader.preload());
    assert_eq!(a, b);
    assert_eq!(a.data(), b"asset");
    assert_eq!(source.calls(), 1);
}

// ------------------------------------------------------------------------
// Payload Tests
// ------------------------------------------------------------------------

#[test]
fn test_fallback_generation_is_deterministic() {
    let a = Payload::generate(1000, 42);
    let b = Payload::generate(1000, 42);
    let c = Payload::generate(1000, 43);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(a.data().iter().any(|&x| x != 0));
}

#[test]
fn test_payload_display_in_mebibytes() {
    let payload = Payload::new(vec![0u8; 3 * 1024 * 1024 / 2]);
    assert_eq!(payload.to_string(), "1.50 MB");
}

// ------------------------------------------------------------------------
// Asset Source Tests
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_preload_from_local_file() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("stall-demo-asset-{}.gif", std::process::id()));
    tokio::fs::write(&path, b"local asset").await?;

    let preloader = Preloader::new(Arc::new(FileAssetSource::new(&path)), 16, 1);
    let payload = preloader.preload().await;
    tokio::fs::remove_file(&path).await?;

    assert_eq!(payload.data(), b"local asset");
    assert_eq!(preloader.origin(), Some(PayloadOrigin::Fetched));
    Ok(())
}

#[tokio::test]
async fn test_preload_missing_local_file_falls_back() {
    let source = FileAssetSource::new("/nonexistent/stall-demo/asset.gif");
    let preloader = Preloader::new(Arc::new(source), 32, 9);

    let payload = preloader.preload().await;
    assert_eq!(payload, Payload::generate(32, 9));
    assert_eq!(preloader.origin(), Some(PayloadOrigin::Fallback));
}

#[tokio::test]
async fn test_preload_unresponsive_server_times_out_to_fallback() -> anyhow::Result<()> {
    // accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let source = HttpAssetSource::new(
        format!("http://{}/asset.gif", addr),
        Duration::from_millis(200),
    )?;
    let preloader = Preloader::new(Arc::new(source), 32, 3);

    let payload = tokio::time::timeout(Duration::from_secs(5), preloader.preload()).await?;
    server.abort();

    assert_eq!(payload, Payload::generate(32, 3));
    assert_eq!(preloader.origin(), Some(PayloadOrigin::Fallback));
    Ok(())
}
