//! Failure tests for the session protocol
//!
//! These tests verify that the session handles failures gracefully:
//! - Metrics failures abort the snapshot and reset the stream
//! - Malformed frames terminate the receiver and tear the session down
//! - A vanishing peer ends the session instead of leaving it half-alive

use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use snapshot_node::session::{self, CollectorOutcome, MemoryStream, ReceiverExit};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use crate::helpers::*;

const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_memory_failure_resets_and_sends_nothing() {
    let ctx_a = create_context(
        "/ip4/10.0.0.1/tcp/4001",
        FakeMetrics::failing_memory(),
        store_with(&[(1, "a")]).await,
    );
    let ctx_b = create_context(
        "/ip4/10.0.0.2/tcp/4002",
        FakeMetrics::default(),
        store_with(&[]).await,
    );
    let mut events_b = ctx_b.subscribe();

    let (b_end, a_end) = MemoryStream::pair("node-b", "node-a");
    let session_a = session::start(a_end, ctx_a);
    let session_b = session::start(b_end, ctx_b);

    let report_a = tokio::time::timeout(SESSION_TIMEOUT, session_a.join())
        .await
        .expect("session A should end")
        .unwrap();
    assert_matches!(report_a.collector, CollectorOutcome::Aborted(_));
    assert_eq!(report_a.sender.written, 0);
    assert!(report_a.reset);

    // B sees the stream go away, never a snapshot
    let report_b = tokio::time::timeout(SESSION_TIMEOUT, session_b.join())
        .await
        .expect("session B should end")
        .unwrap();
    assert_eq!(report_b.receiver.decoded, 0);
    assert!(events_b.try_recv().is_err());
}

#[tokio::test]
async fn test_any_metrics_failure_aborts() {
    for resource in ["memory", "cpu", "disk"] {
        let metrics = FakeMetrics::default();
        let flag = match resource {
            "memory" => &metrics.fail_memory,
            "cpu" => &metrics.fail_cpu,
            _ => &metrics.fail_disk,
        };
        flag.store(true, Ordering::SeqCst);

        let ctx = create_context("/ip4/10.0.0.1/tcp/4001", metrics, store_with(&[]).await);
        let (local, mut remote) = MemoryStream::pair("local", "remote");
        let handle = session::start(local, ctx);

        let report = tokio::time::timeout(SESSION_TIMEOUT, handle.join())
            .await
            .unwrap()
            .unwrap();
        assert_matches!(report.collector, CollectorOutcome::Aborted(_), "{resource}");
        assert!(report.reset, "{resource}");

        let mut received = Vec::new();
        remote.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty(), "{resource}: nothing may be written");
    }
}

#[tokio::test]
async fn test_unencodable_snapshot_resets_and_sends_nothing() {
    let metrics = FakeMetrics::default();
    metrics.nan_percent.store(true, Ordering::SeqCst);
    let ctx = create_context("/ip4/10.0.0.1/tcp/4001", metrics, store_with(&[]).await);

    let (local, mut remote) = MemoryStream::pair("local", "remote");
    let handle = session::start(local, ctx);

    let report = tokio::time::timeout(SESSION_TIMEOUT, handle.join())
        .await
        .unwrap()
        .unwrap();
    assert_matches!(report.collector, CollectorOutcome::Aborted(_));
    assert_eq!(report.sender.written, 0);
    assert!(report.reset);

    let mut received = Vec::new();
    remote.read_to_end(&mut received).await.unwrap();
    assert!(received.is_empty(), "no frame may reach the peer");
}

#[tokio::test]
async fn test_malformed_frame_ends_session() {
    let ctx = create_context(
        "/ip4/10.0.0.1/tcp/4001",
        FakeMetrics::default(),
        store_with(&[]).await,
    );
    let (local, remote) = MemoryStream::pair("local", "remote");
    let handle = session::start(local, ctx);

    let (read, mut write) = tokio::io::split(remote);
    write.write_all(b"this is not json\n").await.unwrap();

    let report = tokio::time::timeout(SESSION_TIMEOUT, handle.join())
        .await
        .expect("session should end after a malformed frame")
        .unwrap();
    assert_matches!(report.receiver.exit, ReceiverExit::Malformed(_));
    assert_eq!(report.receiver.decoded, 0);

    // whatever was sent before teardown, the stream ends
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await.unwrap() {
        assert!(line.starts_with('{'));
    }
}

#[tokio::test]
async fn test_blank_lines_are_skipped() {
    let ctx_peer = create_context(
        "/ip4/10.0.0.9/tcp/4009",
        FakeMetrics::default(),
        store_with(&[(3, "c")]).await,
    );
    let ctx = create_context(
        "/ip4/10.0.0.1/tcp/4001",
        FakeMetrics::default(),
        store_with(&[]).await,
    );
    let mut events = ctx.subscribe();

    let snapshot = {
        let (tx, rx) = MemoryStream::pair("local", "remote");
        let handle = session::start(tx, ctx_peer);
        let mut line = String::new();
        let (read, mut write) = tokio::io::split(rx);
        BufReader::new(read).read_line(&mut line).await.unwrap();
        write.shutdown().await.unwrap();
        handle.join().await.unwrap();
        line
    };

    let (local, mut remote) = MemoryStream::pair("local", "remote");
    let handle = session::start(local, ctx);
    remote.write_all(b"\n\r\n").await.unwrap();
    remote.write_all(snapshot.as_bytes()).await.unwrap();
    remote.shutdown().await.unwrap();

    let mut sink = Vec::new();
    remote.read_to_end(&mut sink).await.unwrap();

    let report = tokio::time::timeout(SESSION_TIMEOUT, handle.join())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.receiver.decoded, 1);
    assert_eq!(report.receiver.exit, ReceiverExit::Closed);

    let event = events.recv().await.unwrap();
    assert_eq!(event.snapshot.addresses, vec!["/ip4/10.0.0.9/tcp/4009"]);
}

#[tokio::test]
async fn test_peer_vanishing_ends_session() {
    let ctx = create_context(
        "/ip4/10.0.0.1/tcp/4001",
        FakeMetrics::default(),
        store_with(&[]).await,
    );
    let (local, remote) = MemoryStream::pair("local", "remote");
    drop(remote);

    let handle = session::start(local, ctx);
    let report = tokio::time::timeout(SESSION_TIMEOUT, handle.join())
        .await
        .expect("session must not stay half-alive")
        .unwrap();
    assert_eq!(report.receiver.decoded, 0);
    assert!(!report.reset);
}
