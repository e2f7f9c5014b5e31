// Event bus implementation
//
// Lock order: registry -> central queue (subscribe only), and
// registry (read) -> one mailbox at a time (fan-out). The dispatcher never
// holds the central queue lock while touching the registry.
use crate::config::BusConfig;
use crate::node::{EventNode, Mailbox};
use crate::payload::{NodeId, Payload, TaggedEvent};
use crate::ring_buffer::RingBuffer;
use crate::{BusError, Result};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of the bus. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    Running,
    Stopped,
}

/// An event waiting in the central queue, with its position in publish order.
struct Queued<P> {
    seq: u64,
    event: TaggedEvent<P>,
}

struct Central<P> {
    queue: RingBuffer<Queued<P>>,
    state: BusState,
    // Sequence number the next accepted publish receives.
    next_seq: u64,
}

struct Subscriber<P> {
    id: NodeId,
    mailbox: Arc<Mailbox<P>>,
    // First sequence number this subscriber may see.
    start_seq: u64,
}

struct Registry<P> {
    nodes: Vec<Subscriber<P>>,
    last_id: u32,
}

/// Event bus statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBusStats {
    pub total_published: u64,
    pub total_delivered: u64,
    pub active_subscriptions: usize,
    pub backlog_size: usize,
    pub dropped_events: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

pub(crate) struct BusShared<P> {
    central: Mutex<Central<P>>,
    // Paired with `central`; raised after every successful push.
    not_empty: Condvar,
    registry: RwLock<Registry<P>>,
    dispatching: AtomicBool,
    // Live `EventBus` handles. The dispatcher thread does not count.
    handles: AtomicUsize,
    config: BusConfig,
    counters: Counters,
}

impl<P> BusShared<P> {
    /// Drop `id` from the registry; `false` if it was not there.
    pub(crate) fn remove_subscriber(&self, id: NodeId) -> bool {
        let mut registry = self.registry.write();
        match registry.nodes.iter().position(|s| s.id == id) {
            Some(pos) => {
                registry.nodes.remove(pos);
                true
            }
            None => false,
        }
    }

    fn is_subscribed(&self, id: NodeId) -> bool {
        self.registry.read().nodes.iter().any(|s| s.id == id)
    }

    pub(crate) fn publish(&self, sender: NodeId, payload: P) -> Result<()> {
        if !self.is_subscribed(sender) {
            return Err(BusError::NotSubscribed(sender));
        }

        {
            let mut central = self.central.lock();
            if central.state == BusState::Stopped {
                return Err(BusError::ShuttingDown);
            }
            let seq = central.next_seq;
            central.queue.push(Queued {
                seq,
                event: TaggedEvent::new(sender, payload),
            })?;
            central.next_seq += 1;
            self.counters.published.fetch_add(1, Ordering::Relaxed);
        }
        self.not_empty.notify_one();

        debug!(target: "event_bus", sender = %sender, "Event published");
        Ok(())
    }

    fn stop(&self) {
        let previous = {
            let mut central = self.central.lock();
            std::mem::replace(&mut central.state, BusState::Stopped)
        };
        self.not_empty.notify_all();

        if previous == BusState::Running {
            info!(target: "event_bus", "Event bus stopping");
        }
    }

    // Blocks while the queue is empty and the bus is running. `None` once the
    // bus is stopped and fully drained.
    fn next_event(&self) -> Option<Queued<P>> {
        let mut central = self.central.lock();
        loop {
            if let Ok(queued) = central.queue.pop() {
                return Some(queued);
            }
            if central.state == BusState::Stopped {
                return None;
            }
            self.not_empty.wait(&mut central);
        }
    }
}

impl<P: Clone> BusShared<P> {
    fn dispatch_loop(&self) {
        info!(target: "event_bus", "Dispatch loop started");
        while let Some(queued) = self.next_event() {
            self.fan_out(queued);
        }
        info!(target: "event_bus", "Dispatch loop exited");
    }

    fn fan_out(&self, queued: Queued<P>) {
        let Queued { seq, event } = queued;
        let registry = self.registry.read();
        let mut delivered = 0;
        let mut dropped = 0;

        // Subscribers that joined after this event was accepted never see it.
        let recipients = registry
            .nodes
            .iter()
            .filter(|s| s.id != event.sender && s.start_seq <= seq);
        for sub in recipients {
            match sub.mailbox.deliver(event.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    dropped += 1;
                    let report = BusError::DeliveryDropped {
                        recipient: sub.id,
                        sender: event.sender,
                    };
                    warn!(target: "event_bus", error = %report, cause = %err, "Dropped event for subscriber");
                }
            }
        }
        drop(registry);

        self.counters.delivered.fetch_add(delivered, Ordering::Relaxed);
        self.counters.dropped.fetch_add(dropped, Ordering::Relaxed);
        debug!(
            target: "event_bus",
            sender = %event.sender,
            delivered,
            dropped,
            "Event dispatched"
        );
    }
}

/// Broker that fans every published event out to all other subscribers.
///
/// Handles are cheap to clone and share one underlying bus. Publishing is
/// safe from any number of threads; exactly one dispatch loop
/// ([`EventBus::run`] or [`EventBus::spawn`]) drains the central queue.
///
/// Dropping the last handle stops the bus, so a spawned dispatcher drains
/// and exits even if [`EventBus::stop`] was never called.
pub struct EventBus<P = Payload> {
    shared: Arc<BusShared<P>>,
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        self.shared.handles.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P> Drop for EventBus<P> {
    fn drop(&mut self) {
        if self.shared.handles.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.stop();
        }
    }
}

/// Exclusive right to run the dispatch loop; released on drop.
struct DispatchClaim<P> {
    shared: Arc<BusShared<P>>,
}

impl<P> Drop for DispatchClaim<P> {
    fn drop(&mut self) {
        self.shared.dispatching.store(false, Ordering::Release);
    }
}

impl<P: Clone + Send + 'static> EventBus<P> {
    pub fn new() -> Result<Self> {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Result<Self> {
        config.validate()?;
        let queue = RingBuffer::new(config.central.capacity, config.central.growable)?;

        Ok(Self {
            shared: Arc::new(BusShared {
                central: Mutex::new(Central {
                    queue,
                    state: BusState::Running,
                    next_seq: 0,
                }),
                not_empty: Condvar::new(),
                registry: RwLock::new(Registry {
                    nodes: Vec::new(),
                    last_id: 0,
                }),
                dispatching: AtomicBool::new(false),
                handles: AtomicUsize::new(1),
                config,
                counters: Counters::default(),
            }),
        })
    }

    pub(crate) fn downgrade(&self) -> Weak<BusShared<P>> {
        Arc::downgrade(&self.shared)
    }

    pub fn config(&self) -> &BusConfig {
        &self.shared.config
    }

    /// Build an unsubscribed node whose mailbox uses this bus's mailbox config.
    pub fn node(&self) -> Result<EventNode<P>> {
        EventNode::new(self.shared.config.mailbox)
    }

    /// Register `node` and hand it its id.
    ///
    /// The node receives only events accepted after it joined the registry.
    /// Events still queued from earlier publishes are not delivered to it,
    /// however far behind the dispatcher is.
    pub fn subscribe(&self, node: &mut EventNode<P>) -> Result<NodeId> {
        if node.is_subscribed() {
            return Err(BusError::AlreadySubscribed(node.id()));
        }

        let mailbox = node.mailbox();
        let id = {
            let mut registry = self.shared.registry.write();
            if let Some(existing) = registry
                .nodes
                .iter()
                .find(|s| Arc::ptr_eq(&s.mailbox, &mailbox))
            {
                return Err(BusError::AlreadySubscribed(existing.id));
            }
            let start_seq = self.shared.central.lock().next_seq;
            registry.last_id += 1;
            let id = NodeId(registry.last_id);
            registry.nodes.push(Subscriber {
                id,
                mailbox,
                start_seq,
            });
            id
        };

        node.attach(id, self.downgrade());
        info!(target: "event_bus", node_id = %id, "Node subscribed");
        Ok(id)
    }

    /// Remove `id` from the registry. Its mailbox keeps what it already holds.
    pub fn unsubscribe(&self, id: NodeId) -> Result<()> {
        if !self.shared.remove_subscriber(id) {
            return Err(BusError::NotSubscribed(id));
        }
        info!(target: "event_bus", node_id = %id, "Node unsubscribed");
        Ok(())
    }

    pub fn is_subscribed(&self, id: NodeId) -> bool {
        self.shared.is_subscribed(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.read().nodes.len()
    }

    /// Queue `payload` from `sender` for fan-out.
    ///
    /// Returns once the event sits in the central queue; delivery happens on
    /// the dispatch thread.
    pub fn publish(&self, sender: NodeId, payload: P) -> Result<()> {
        self.shared.publish(sender, payload)
    }

    pub fn is_running(&self) -> bool {
        self.shared.central.lock().state == BusState::Running
    }

    /// Stop accepting events and wake the dispatcher. Idempotent.
    ///
    /// Events accepted before the call are still delivered before the
    /// dispatch loop returns.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Run the dispatch loop on the calling thread until [`EventBus::stop`].
    ///
    /// Fails with [`BusError::DispatcherRunning`] if another loop is active.
    pub fn run(&self) -> Result<()> {
        let _claim = self.claim_dispatcher()?;
        self.shared.dispatch_loop();
        Ok(())
    }

    /// Run the dispatch loop on a dedicated thread.
    ///
    /// The thread exits after [`EventBus::stop`] or once every handle to the
    /// bus has been dropped.
    pub fn spawn(&self) -> Result<JoinHandle<()>> {
        let claim = self.claim_dispatcher()?;
        let handle = std::thread::Builder::new()
            .name("eventring-dispatch".into())
            .spawn(move || claim.shared.dispatch_loop())?;
        Ok(handle)
    }

    /// Get stats
    pub fn stats(&self) -> EventBusStats {
        let backlog_size = self.shared.central.lock().queue.len();
        let active_subscriptions = self.subscriber_count();
        let counters = &self.shared.counters;
        EventBusStats {
            total_published: counters.published.load(Ordering::Relaxed),
            total_delivered: counters.delivered.load(Ordering::Relaxed),
            active_subscriptions,
            backlog_size,
            dropped_events: counters.dropped.load(Ordering::Relaxed),
        }
    }

    fn claim_dispatcher(&self) -> Result<DispatchClaim<P>> {
        if self.shared.dispatching.swap(true, Ordering::AcqRel) {
            return Err(BusError::DispatcherRunning);
        }
        Ok(DispatchClaim {
            shared: Arc::clone(&self.shared),
        })
    }
}
