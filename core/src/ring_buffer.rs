//! Growable ring buffer used as the queue behind the bus and every mailbox.
//!
//! Elements live in one contiguous slice. `begin` is the physical slot of the
//! oldest element and the live range wraps past the end of the slice for
//! exactly `len` slots. A bounded buffer rejects pushes with
//! [`BusError::BufferFull`]; a growable one doubles its storage instead.

use crate::{BusError, Result};
use std::fmt;

pub struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    begin: usize,
    size: usize,
    growable: bool,
}

impl<T> RingBuffer<T> {
    /// Create a buffer with `capacity` slots.
    ///
    /// Fails with [`BusError::InvalidCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize, growable: bool) -> Result<Self> {
        if capacity == 0 {
            return Err(BusError::InvalidCapacity(capacity));
        }
        Ok(Self {
            slots: empty_slots(capacity),
            begin: 0,
            size: 0,
            growable,
        })
    }

    /// Bounded buffer: pushes past `capacity` fail.
    pub fn bounded(capacity: usize) -> Result<Self> {
        Self::new(capacity, false)
    }

    /// Growable buffer starting at `capacity` slots.
    pub fn growable(capacity: usize) -> Result<Self> {
        Self::new(capacity, true)
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_growable(&self) -> bool {
        self.growable
    }

    /// Physical slot of the oldest element.
    pub fn begin(&self) -> usize {
        self.begin
    }

    /// Physical slot of the newest element, `None` when empty.
    pub fn end(&self) -> Option<usize> {
        if self.size == 0 {
            None
        } else {
            Some(self.physical(self.size - 1))
        }
    }

    /// Append `value` at the back.
    ///
    /// A full bounded buffer returns [`BusError::BufferFull`] and is left
    /// untouched. A full growable buffer doubles first.
    pub fn push(&mut self, value: T) -> Result<()> {
        if self.is_full() {
            if !self.growable {
                return Err(BusError::BufferFull {
                    capacity: self.capacity(),
                });
            }
            self.grow();
        }
        let slot = self.physical(self.size);
        self.slots[slot] = Some(value);
        self.size += 1;
        Ok(())
    }

    /// Remove and return the oldest element.
    pub fn pop(&mut self) -> Result<T> {
        if self.size == 0 {
            return Err(BusError::BufferEmpty);
        }
        let value = self.slots[self.begin].take().ok_or(BusError::BufferEmpty)?;
        self.begin = (self.begin + 1) % self.capacity();
        self.size -= 1;
        Ok(value)
    }

    pub fn front(&self) -> Result<&T> {
        if self.size == 0 {
            return Err(BusError::BufferEmpty);
        }
        self.slot(0)
    }

    pub fn back(&self) -> Result<&T> {
        if self.size == 0 {
            return Err(BusError::BufferEmpty);
        }
        self.slot(self.size - 1)
    }

    /// Element at logical position `index`, counted from the front.
    pub fn at(&self, index: usize) -> Result<&T> {
        self.check_index(index)?;
        self.slot(index)
    }

    /// Overwrite the element at logical position `index`.
    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        self.check_index(index)?;
        let slot = self.physical(index);
        self.slots[slot] = Some(value);
        Ok(())
    }

    /// Iterate front to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.size).filter_map(move |i| self.slots[self.physical(i)].as_ref())
    }

    /// Drop every element. Capacity is kept.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.begin = 0;
        self.size = 0;
    }

    // Doubles the storage. Live elements are moved in logical order to the
    // start of the new slice, so a wrapped range and a contiguous range end up
    // in the same layout.
    fn grow(&mut self) {
        let old_capacity = self.capacity();
        let mut slots = empty_slots(old_capacity * 2);
        for (i, slot) in slots.iter_mut().enumerate().take(self.size) {
            let from = (self.begin + i) % old_capacity;
            *slot = self.slots[from].take();
        }
        self.slots = slots;
        self.begin = 0;
        tracing::debug!(
            target: "ring_buffer",
            from = old_capacity,
            to = old_capacity * 2,
            len = self.size,
            "Ring buffer grew"
        );
    }

    fn physical(&self, index: usize) -> usize {
        (self.begin + index) % self.capacity()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.size {
            return Err(BusError::IndexOutOfRange {
                index,
                len: self.size,
            });
        }
        Ok(())
    }

    fn slot(&self, index: usize) -> Result<&T> {
        self.slots[self.physical(index)]
            .as_ref()
            .ok_or(BusError::IndexOutOfRange {
                index,
                len: self.size,
            })
    }
}

fn empty_slots<T>(capacity: usize) -> Box<[Option<T>]> {
    (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice()
}

impl<T: fmt::Debug> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("begin", &self.begin)
            .field("len", &self.size)
            .field("growable", &self.growable)
            .field("items", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}
