//! Replication through the RPC coordinator of an in-process cluster.

use gridcache_core::{CacheCommand, ReplicationQueueConfig, WriteCommand};
use gridcache_testkit::prelude::*;
use std::thread;
use std::time::{Duration, Instant};

fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn pair(config: gridcache_core::CacheConfig) -> (std::sync::Arc<LocalCluster>, TestNode, TestNode) {
    let cluster = LocalCluster::new();
    let a = TestNode::join(&cluster, "a", config);
    a.start().unwrap();
    let b = TestNode::join(&cluster, "b", test_config());
    b.start().unwrap();
    (cluster, a, b)
}

#[test]
fn queued_writes_travel_as_one_batch() {
    let queued = test_config()
        .replication_queue(ReplicationQueueConfig::enabled(Duration::from_secs(3600), 1000));
    let (_cluster, a, b) = pair(queued);

    a.put_async("x", "1").unwrap();
    a.put_async("y", "2").unwrap();
    assert_eq!(a.rpc().replication_queue().map(|q| q.len()), Some(2));
    assert!(b.is_empty());

    assert_eq!(a.rpc().flush_replication_queue().unwrap(), 2);
    assert!(eventually(|| b.len() == 2));

    let sent = a.transport().sent();
    assert_eq!(sent.len(), 1);
    match &sent[0].command {
        CacheCommand::Batch(commands) => assert_eq!(commands.len(), 2),
        other => panic!("expected a batch, got {}", other.name()),
    }
}

#[test]
fn background_flusher_drains_the_queue() {
    let queued = test_config()
        .replication_queue(ReplicationQueueConfig::enabled(Duration::from_millis(20), 1000));
    let (_cluster, a, b) = pair(queued);
    let flusher = a.rpc().start_replication_flusher().unwrap();
    assert!(flusher.is_some());

    a.put_async("k", "v").unwrap();
    assert!(eventually(|| b.get(b"k") == Some(b"v".to_vec())));
}

#[test]
fn async_writes_without_a_queue_are_sent_immediately() {
    let (_cluster, a, b) = pair(test_config());

    a.put_async("k", "v").unwrap();
    assert!(a.rpc().replication_queue().is_none_or(|q| q.is_empty()));
    assert!(eventually(|| b.get(b"k") == Some(b"v".to_vec())));
}

#[test]
fn statistics_track_synchronous_replication() {
    let (_cluster, a, _b) = pair(test_config());

    for i in 0..5 {
        a.put(format!("k{i}"), "v").unwrap();
    }

    let stats = a.rpc().stats().snapshot();
    assert_eq!(stats.replication_count, 5);
    assert_eq!(stats.replication_failures, 0);
    assert_eq!(stats.success_ratio, Some(1.0));
}

#[test]
fn broadcast_in_future_reports_completion() {
    let (_cluster, a, b) = pair(test_config());
    let (tx, rx) = std::sync::mpsc::channel();

    let handle = a
        .rpc()
        .broadcast_rpc_command_in_future(
            CacheCommand::Write(WriteCommand::put("f", "1")),
            false,
            move |result| {
                let _ = tx.send(result.is_ok());
            },
        )
        .unwrap();
    handle.join().unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));
    assert_eq!(b.get(b"f"), Some(b"1".to_vec()));
}
