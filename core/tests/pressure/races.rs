//! Races between publishing, stopping and registry changes

use super::{drain, subscribed_nodes, Seq};
use eventring_core::{BusError, EventBus, Result};
use serial_test::serial;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const STOP_AFTER: u64 = 20_000;
// Upper bound per publisher, far beyond STOP_AFTER.
const PUBLISH_CAP: u64 = 1_000_000;

// Every sender's sub-sequence must be strictly increasing.
fn assert_per_sender_order(events: &[Seq], senders: usize) {
    for p in 0..senders {
        let from_p: Vec<u64> = events.iter().filter(|(s, _)| *s == p).map(|(_, i)| *i).collect();
        assert!(
            from_p.windows(2).all(|w| w[0] < w[1]),
            "sender {p} out of order or duplicated"
        );
    }
}

/// Test: publishes racing stop() either land in every mailbox or fail
#[test]
#[serial]
pub fn publish_racing_stop_is_all_or_nothing() -> Result<()> {
    let publishers = 4;
    let bus = EventBus::<Seq>::new()?;
    let senders: Vec<_> = subscribed_nodes(&bus, publishers)?
        .into_iter()
        .map(Arc::new)
        .collect();
    let listener = subscribed_nodes(&bus, 1)?.remove(0);

    let dispatcher = bus.spawn()?;
    let tasks: Vec<_> = senders
        .iter()
        .enumerate()
        .map(|(p, node)| {
            let node = Arc::clone(node);
            thread::spawn(move || {
                let mut accepted = 0u64;
                while accepted < PUBLISH_CAP {
                    match node.publish((p, accepted)) {
                        Ok(()) => accepted += 1,
                        Err(BusError::ShuttingDown) => return accepted,
                        Err(other) => panic!("unexpected error {other}"),
                    }
                }
                accepted
            })
        })
        .collect();

    // Stop while every publisher is still mid-loop.
    while bus.stats().total_published < STOP_AFTER {
        thread::yield_now();
    }
    bus.stop();

    let accepted: Vec<u64> = tasks
        .into_iter()
        .map(|t| t.join().expect("publisher panicked"))
        .collect();
    dispatcher.join().expect("dispatcher panicked");

    let total: u64 = accepted.iter().sum();
    assert_eq!(bus.stats().total_published, total);

    let got = drain(&listener);
    assert_eq!(got.len() as u64, total);
    for (p, count) in accepted.iter().enumerate() {
        let from_p: Vec<u64> = got.iter().filter(|(s, _)| *s == p).map(|(_, i)| *i).collect();
        assert_eq!(from_p, (0..*count).collect::<Vec<_>>());
    }

    for (p, node) in senders.iter().enumerate() {
        let got = drain(node);
        assert_eq!(got.len() as u64, total - accepted[p]);
        assert!(got.iter().all(|(s, _)| *s != p));
        assert_per_sender_order(&got, publishers);
    }
    Ok(())
}

/// Test: subscribe/unsubscribe churn while the dispatcher is busy
#[test]
#[serial]
pub fn registry_churn_during_fan_out() -> Result<()> {
    let publishers = 2;
    let events_per_publisher: u64 = 10_000;
    let bus = EventBus::<Seq>::new()?;
    let senders = subscribed_nodes(&bus, publishers)?;
    let listener = subscribed_nodes(&bus, 1)?.remove(0);

    // A backlog the dispatcher is still working through when churn starts.
    for i in 0..events_per_publisher / 2 {
        for (p, node) in senders.iter().enumerate() {
            node.publish((p, i))?;
        }
    }

    let done = Arc::new(AtomicBool::new(false));
    let ready = Arc::new(Barrier::new(2));
    let churn = {
        let bus = bus.clone();
        let done = Arc::clone(&done);
        let ready = Arc::clone(&ready);
        thread::spawn(move || -> Result<usize> {
            ready.wait();
            let mut rounds = 0;
            loop {
                let mut node = bus.node()?;
                node.subscribe(&bus)?;
                thread::yield_now();
                node.unsubscribe()?;
                assert_per_sender_order(&drain(&node), publishers);
                rounds += 1;
                if done.load(Ordering::Acquire) {
                    return Ok(rounds);
                }
            }
        })
    };

    ready.wait();
    let dispatcher = bus.spawn()?;
    for i in events_per_publisher / 2..events_per_publisher {
        for (p, node) in senders.iter().enumerate() {
            node.publish((p, i))?;
        }
    }
    bus.stop();
    dispatcher.join().expect("dispatcher panicked");
    done.store(true, Ordering::Release);
    let rounds = churn.join().expect("churn thread panicked")?;
    assert!(rounds > 0);

    let got = drain(&listener);
    assert_eq!(got.len() as u64, publishers as u64 * events_per_publisher);
    for p in 0..publishers {
        let from_p: Vec<u64> = got.iter().filter(|(s, _)| *s == p).map(|(_, i)| *i).collect();
        assert_eq!(from_p, (0..events_per_publisher).collect::<Vec<_>>());
    }

    for (p, node) in senders.iter().enumerate() {
        let got = drain(node);
        let other = 1 - p;
        assert!(got.iter().map(|(_, i)| *i).eq(0..events_per_publisher));
        assert!(got.iter().all(|(s, _)| *s == other));
    }
    assert_eq!(bus.subscriber_count(), publishers + 1);
    Ok(())
}
