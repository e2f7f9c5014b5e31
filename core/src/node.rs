//! Publishing and receiving endpoint attached to an [`EventBus`].

use crate::config::BufferConfig;
use crate::event::{BusShared, EventBus};
use crate::payload::{NodeId, Payload, TaggedEvent};
use crate::ring_buffer::RingBuffer;
use crate::{BusError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// A node's inbound queue. Only the dispatch loop writes to it.
pub(crate) struct Mailbox<P> {
    queue: Mutex<RingBuffer<TaggedEvent<P>>>,
    dropped: AtomicU64,
}

impl<P> Mailbox<P> {
    fn new(config: BufferConfig) -> Result<Self> {
        Ok(Self {
            queue: Mutex::new(RingBuffer::new(config.capacity, config.growable)?),
            dropped: AtomicU64::new(0),
        })
    }

    pub(crate) fn deliver(&self, event: TaggedEvent<P>) -> Result<()> {
        let result = self.queue.lock().push(event);
        if result.is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

/// Subscriber and publisher on a bus.
///
/// A node exists on its own until [`EventNode::subscribe`] attaches it. It
/// holds only a weak reference to the bus. Incoming events wait in a private
/// mailbox until the owner calls [`EventNode::receive`].
///
/// Dropping a subscribed node unsubscribes it.
pub struct EventNode<P = Payload> {
    id: NodeId,
    mailbox: Arc<Mailbox<P>>,
    bus: Option<Weak<BusShared<P>>>,
    // Keeps this node's publishes in order when it is shared across threads.
    publish_lock: Mutex<()>,
}

impl<P: Clone + Send + 'static> EventNode<P> {
    pub fn new(mailbox: BufferConfig) -> Result<Self> {
        Ok(Self {
            id: NodeId::BUS,
            mailbox: Arc::new(Mailbox::new(mailbox)?),
            bus: None,
            publish_lock: Mutex::new(()),
        })
    }

    /// Id assigned by the bus, [`NodeId::BUS`] while unsubscribed.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// `true` while attached to a bus that still exists.
    pub fn is_subscribed(&self) -> bool {
        self.bus.as_ref().is_some_and(|weak| weak.strong_count() > 0)
    }

    pub fn subscribe(&mut self, bus: &EventBus<P>) -> Result<NodeId> {
        bus.subscribe(self)
    }

    /// Leave the bus. Events already in the mailbox stay there.
    pub fn unsubscribe(&mut self) -> Result<()> {
        let id = self.id;
        let weak = self.bus.take().ok_or(BusError::NotSubscribed(id))?;
        self.id = NodeId::BUS;

        // Bus is gone; nothing left to detach from.
        let Some(shared) = weak.upgrade() else {
            return Ok(());
        };
        if !shared.remove_subscriber(id) {
            return Err(BusError::NotSubscribed(id));
        }
        info!(target: "event_node", node_id = %id, "Node unsubscribed");
        Ok(())
    }

    /// Publish `payload` under this node's id.
    pub fn publish(&self, payload: P) -> Result<()> {
        let bus = self.bus()?;
        let _order = self.publish_lock.lock();
        bus.publish(self.id, payload)
    }

    /// Take the oldest pending event. Never blocks.
    pub fn receive(&self) -> Result<TaggedEvent<P>> {
        let event = self.mailbox.queue.lock().pop()?;
        debug!(target: "event_node", node_id = %self.id, sender = %event.sender, "Event received");
        Ok(event)
    }

    /// Copy of the oldest pending event, left in place.
    pub fn peek(&self) -> Result<TaggedEvent<P>> {
        self.mailbox.queue.lock().front().cloned()
    }

    /// Number of events waiting in the mailbox.
    pub fn pending(&self) -> usize {
        self.mailbox.queue.lock().len()
    }

    /// Events the bus could not deliver because the mailbox was full.
    pub fn dropped(&self) -> u64 {
        self.mailbox.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn mailbox(&self) -> Arc<Mailbox<P>> {
        Arc::clone(&self.mailbox)
    }

    pub(crate) fn attach(&mut self, id: NodeId, bus: Weak<BusShared<P>>) {
        self.id = id;
        self.bus = Some(bus);
    }

    fn bus(&self) -> Result<Arc<BusShared<P>>> {
        let weak = self.bus.as_ref().ok_or(BusError::NotSubscribed(self.id))?;
        weak.upgrade().ok_or(BusError::ShuttingDown)
    }
}

impl<P> Drop for EventNode<P> {
    fn drop(&mut self) {
        let Some(shared) = self.bus.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        if shared.remove_subscriber(self.id) {
            info!(target: "event_node", node_id = %self.id, "Node dropped; unsubscribed");
        }
    }
}
