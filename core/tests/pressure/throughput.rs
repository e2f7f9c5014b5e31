//! Throughput-focused pressure tests
//!
//! Concurrent publishers against a single dispatcher.

use super::{drain, subscribed_nodes, Seq};
use eventring_core::{BufferConfig, BusConfig, EventBus, Result};
use serial_test::serial;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Test: P publishers x N events, every publisher is also a subscriber
#[test]
#[serial]
pub fn concurrent_publishers_fan_out_exactly_once() -> Result<()> {
    let publishers = 8;
    let events_per_publisher: u64 = 1_000;
    let listeners = 2;

    let bus = EventBus::<Seq>::new()?;
    let senders = subscribed_nodes(&bus, publishers)?;
    let receivers = subscribed_nodes(&bus, listeners)?;
    let subscriber_count = publishers + listeners;

    let dispatcher = bus.spawn()?;
    let start = Instant::now();

    let senders: Vec<_> = senders.into_iter().map(Arc::new).collect();
    let tasks: Vec<_> = senders
        .iter()
        .enumerate()
        .map(|(p, node)| {
            let node = Arc::clone(node);
            thread::spawn(move || {
                for i in 0..events_per_publisher {
                    node.publish((p, i)).expect("publish");
                }
            })
        })
        .collect();
    for task in tasks {
        task.join().expect("publisher panicked");
    }
    let publish_duration = start.elapsed();

    bus.stop();
    dispatcher.join().expect("dispatcher panicked");

    let mut total = 0;
    for (idx, node) in senders.iter().map(|n| n.as_ref()).chain(receivers.iter()).enumerate() {
        let got = drain(node);
        total += got.len();

        let unique: HashSet<Seq> = got.iter().copied().collect();
        assert_eq!(unique.len(), got.len(), "duplicates in mailbox {idx}");

        for p in 0..publishers {
            let from_p: Vec<u64> = got.iter().filter(|(s, _)| *s == p).map(|(_, i)| *i).collect();
            if idx == p {
                assert!(from_p.is_empty(), "publisher {p} received its own events");
            } else {
                assert_eq!(from_p, (0..events_per_publisher).collect::<Vec<_>>());
            }
        }
    }

    let published = publishers as u64 * events_per_publisher;
    println!(
        "Concurrent publishers: {} events in {:?}, {} deliveries",
        published, publish_duration, total
    );

    assert_eq!(total as u64, published * (subscriber_count as u64 - 1));
    let stats = bus.stats();
    assert_eq!(stats.total_published, published);
    assert_eq!(stats.total_delivered, total as u64);
    assert_eq!(stats.dropped_events, 0);
    Ok(())
}

/// Test: a small growable central queue keeps up with a burst
#[test]
#[serial]
pub fn small_growable_queue_absorbs_burst() -> Result<()> {
    let bus = EventBus::<Seq>::with_config(BusConfig {
        central: BufferConfig::growable(1),
        mailbox: BufferConfig::growable(1),
    })?;
    let nodes = subscribed_nodes(&bus, 2)?;

    // No dispatcher yet: everything piles up in the central queue.
    for i in 0..10_000 {
        nodes[0].publish((0, i))?;
    }
    assert_eq!(bus.stats().backlog_size, 10_000);

    bus.stop();
    bus.run()?;

    let got = drain(&nodes[1]);
    assert_eq!(got.len(), 10_000);
    assert!(got.iter().map(|(_, i)| *i).eq(0..10_000));
    Ok(())
}
