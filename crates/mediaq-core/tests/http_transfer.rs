//! End-to-end transfers against a local range server over real HTTP.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::range_server::{self, ServerOptions};
use mediaq_core::http::HttpRangeFetcher;
use mediaq_core::retry::RetryPolicy;
use mediaq_core::transfer::{SequentialReason, TransferMode};
use mediaq_core::{ChunkedTransfer, RangeFetcher, SourceHandle, TransferOptions};
use tokio_util::sync::CancellationToken;

const MIB: usize = 1024 * 1024;

fn options(min_parallel: usize) -> TransferOptions {
    TransferOptions {
        chunk_size: 512 * 1024,
        min_parallel_size: min_parallel as u64,
        progress_interval: Duration::ZERO,
        retry: RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
    }
}

fn transfer(min_parallel: usize) -> ChunkedTransfer {
    ChunkedTransfer::new(Arc::new(HttpRangeFetcher::default()), options(min_parallel))
}

#[tokio::test(flavor = "multi_thread")]
async fn large_object_downloads_in_parallel_chunks() {
    let body = common::body(11 * MIB);
    let server = range_server::start(body.clone());
    let t = transfer(10 * MIB);
    let target = t
        .fetcher()
        .resolve(&SourceHandle::new(server.url("/video.mp4")))
        .await
        .unwrap();
    assert_eq!(target.size, Some(body.len() as u64));
    assert!(target.accepts_ranges);

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("video.mp4");
    let report = t
        .download(&target, &dest, 4, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.mode, TransferMode::Parallel { chunks: 22 });
    assert_eq!(report.bytes, body.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert!(!dir.path().join("video.mp4.part").exists());
    assert_eq!(server.plain_gets(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn head_rejected_falls_back_to_range_probe() {
    let body = common::body(3 * MIB);
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            head_allowed: false,
            ..ServerOptions::default()
        },
    );
    let t = transfer(MIB);
    let target = t
        .fetcher()
        .resolve(&SourceHandle::new(server.url("/clip")))
        .await
        .unwrap();
    assert_eq!(target.size, Some(body.len() as u64));
    assert!(target.accepts_ranges);
    assert_eq!(server.range_hits_at(0), 1);

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("clip.bin");
    let report = t
        .download(&target, &dest, 3, None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.mode, TransferMode::Parallel { chunks: 6 });
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_without_ranges_is_streamed() {
    let body = common::body(2 * MIB);
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            support_ranges: false,
            ..ServerOptions::default()
        },
    );
    let t = transfer(MIB);
    let target = t
        .fetcher()
        .resolve(&SourceHandle::new(server.url("/plain")))
        .await
        .unwrap();
    assert!(!target.accepts_ranges);

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("plain.bin");
    let report = t
        .download(&target, &dest, 4, None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        report.mode,
        TransferMode::Sequential(SequentialReason::RangesUnsupported)
    );
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(server.plain_gets(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_chunk_falls_back_to_one_stream() {
    let body = common::body(3 * MIB);
    let bad = 512 * 1024;
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            fail_range_at: Some(bad),
            ..ServerOptions::default()
        },
    );
    let t = transfer(MIB);
    let target = t
        .fetcher()
        .resolve(&SourceHandle::new(server.url("/flaky")))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("flaky.bin");
    let report = t
        .download(&target, &dest, 2, None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        report.mode,
        TransferMode::Sequential(SequentialReason::ParallelFailed)
    );
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(server.range_hits_at(bad), 5);
    assert_eq!(server.plain_gets(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn content_disposition_supplies_name_hint() {
    let server = range_server::start_with_options(
        common::body(1024),
        ServerOptions {
            content_disposition: Some("attachment; filename=\"holiday clip.webm\""),
            ..ServerOptions::default()
        },
    );
    let target = HttpRangeFetcher::default()
        .resolve(&SourceHandle::new(server.url("/download?id=7")))
        .await
        .unwrap();
    assert_eq!(target.name_hint.as_deref(), Some("holiday clip.webm"));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_object_is_unreachable() {
    let server = range_server::start(common::body(1024));
    let err = HttpRangeFetcher::default()
        .resolve(&SourceHandle::new(server.url("/missing")))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("404"), "{}", err);
}
