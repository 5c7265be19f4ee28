//! End-to-end tests for two sessions exchanging snapshots
//!
//! These tests verify that:
//! - Each side decodes exactly one snapshot from the other
//! - The snapshot carries the sender's addresses and full record set
//! - Both sessions end cleanly once the snapshots are exchanged
//! - The record store outlives individual sessions

use std::time::Duration;

use pretty_assertions::assert_eq;
use snapshot_node::session::{self, CollectorOutcome, MemoryStream, ReceiverExit, SenderExit};
use snapshot_node::{Direction, Record};
use tokio::sync::broadcast::error::TryRecvError;

use crate::helpers::*;

const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_two_nodes_exchange_one_snapshot_each() {
    let ctx_a = create_context(
        "/ip4/10.0.0.1/tcp/4001",
        FakeMetrics::default(),
        store_with(&[(1, "a"), (2, "b")]).await,
    );
    let ctx_b = create_context(
        "/ip4/10.0.0.2/tcp/4002",
        FakeMetrics::default(),
        store_with(&[(7, "seven")]).await,
    );
    let mut events_a = ctx_a.subscribe();
    let mut events_b = ctx_b.subscribe();

    // B dials A; the contexts stay alive so the event channels remain open
    let (b_end, a_end) = MemoryStream::pair("node-b", "node-a");
    let session_a = session::start(a_end, ctx_a.clone());
    let session_b = session::start(b_end, ctx_b.clone());

    let report_a = tokio::time::timeout(SESSION_TIMEOUT, session_a.join())
        .await
        .expect("session A should end")
        .unwrap();
    let report_b = tokio::time::timeout(SESSION_TIMEOUT, session_b.join())
        .await
        .expect("session B should end")
        .unwrap();

    for report in [&report_a, &report_b] {
        assert_eq!(report.collector, CollectorOutcome::Delivered);
        assert_eq!(report.sender.written, 1);
        assert_eq!(report.sender.exit, SenderExit::Drained);
        assert_eq!(report.receiver.decoded, 1);
        assert_eq!(report.receiver.exit, ReceiverExit::Closed);
        assert!(!report.reset);
    }

    let at_b = events_b.recv().await.unwrap();
    assert_eq!(at_b.peer, "node-a");
    assert_eq!(at_b.snapshot.addresses, vec!["/ip4/10.0.0.1/tcp/4001"]);
    assert_eq!(
        at_b.snapshot.records,
        vec![Record::new(1, "a"), Record::new(2, "b")]
    );
    assert_eq!(at_b.snapshot.stats.direction, Direction::Inbound);
    assert!(at_b.snapshot.memory.is_some());
    assert_eq!(at_b.snapshot.cpu[0].cpu, "cpu-total");
    assert_eq!(at_b.snapshot.disk[0].path, "/");

    let at_a = events_a.recv().await.unwrap();
    assert_eq!(at_a.peer, "node-b");
    assert_eq!(at_a.snapshot.records, vec![Record::new(7, "seven")]);
    assert_eq!(at_a.snapshot.stats.direction, Direction::Outbound);

    assert_eq!(events_b.try_recv().unwrap_err(), TryRecvError::Empty);
    assert_eq!(events_a.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test]
async fn test_store_survives_consecutive_sessions() {
    let store = store_with(&[(1, "a"), (2, "b")]).await;
    let ctx_a = create_context("/ip4/10.0.0.1/tcp/4001", FakeMetrics::default(), store);
    let ctx_b = create_context(
        "/ip4/10.0.0.2/tcp/4002",
        FakeMetrics::default(),
        store_with(&[]).await,
    );
    let mut events_b = ctx_b.subscribe();

    for round in 0..2 {
        let (b_end, a_end) = MemoryStream::pair("node-b", "node-a");
        let session_a = session::start(a_end, ctx_a.clone());
        let session_b = session::start(b_end, ctx_b.clone());

        tokio::time::timeout(SESSION_TIMEOUT, session_a.join())
            .await
            .unwrap()
            .unwrap();
        let report_b = tokio::time::timeout(SESSION_TIMEOUT, session_b.join())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report_b.receiver.decoded, 1, "round {round}");

        let event = events_b.recv().await.unwrap();
        assert_eq!(
            event.snapshot.records,
            vec![Record::new(1, "a"), Record::new(2, "b")],
            "round {round}"
        );
    }
}

#[tokio::test]
async fn test_empty_store_sends_empty_records() {
    let ctx_a = create_context(
        "/ip4/10.0.0.1/tcp/4001",
        FakeMetrics::default(),
        store_with(&[]).await,
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

    let event = tokio::time::timeout(SESSION_TIMEOUT, events_b.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(event.snapshot.records.is_empty());
    assert!(!event.snapshot.addresses.is_empty());

    session_a.join().await.unwrap();
    session_b.join().await.unwrap();
}
