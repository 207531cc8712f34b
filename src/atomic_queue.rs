// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Bounded single-producer/single-consumer lock-free FIFO. This is the data
// plane of a channel (§4.1): the only path bulk messages take between a
// channel's two endpoints. Producer and consumer each cache the other's
// cursor and only reload the atomic when the cache says the queue looks
// full (producer) or empty (consumer), so the common case costs one relaxed
// load plus one relaxed store.

use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

/// Create a bounded SPSC queue. `capacity` is rounded up to the next power of
/// two (the original's `ATOMIC_QUEUE_SIZE` is itself already a power of two).
///
/// # Panics
/// Panics if `capacity` is zero.
pub fn bounded<T: Send>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    assert!(capacity > 0, "atomic queue capacity must be non-zero");
    let capacity = capacity.next_power_of_two();
    let mask = capacity - 1;

    let mut slots = ManuallyDrop::new(Vec::<T>::with_capacity(capacity));
    let buffer = slots.as_mut_ptr();

    let shared = Arc::new(Shared {
        tail: CachePadded::new(AtomicUsize::new(0)),
        head: CachePadded::new(AtomicUsize::new(0)),
        buffer,
        mask,
    });

    (
        QueueProducer {
            local_tail: 0,
            cached_head: 0,
            shared: Arc::clone(&shared),
        },
        QueueConsumer {
            local_head: 0,
            cached_tail: 0,
            shared,
        },
    )
}

struct Shared<T> {
    tail: CachePadded<AtomicUsize>,
    head: CachePadded<AtomicUsize>,
    buffer: *mut T,
    mask: usize,
}

unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();

        let mut i = head;
        while i != tail {
            unsafe { self.buffer.add(i & self.mask).drop_in_place() };
            i = i.wrapping_add(1);
        }
        unsafe {
            let _ = Vec::from_raw_parts(self.buffer, 0, self.mask + 1);
        }
    }
}

/// The producer half of an atomic queue. Only the thread that owns this value
/// may push — there is no way to call [`push`](QueueProducer::push) from two
/// threads at once because the type is not `Sync` and `push` takes `&mut
/// self`.
pub struct QueueProducer<T> {
    local_tail: usize,
    cached_head: usize,
    shared: Arc<Shared<T>>,
}

unsafe impl<T: Send> Send for QueueProducer<T> {}

impl<T> QueueProducer<T> {
    /// Push `value` onto the queue. Returns the value back on failure (queue
    /// full) so the caller can reroute it without extra copies.
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), T> {
        let tail = self.local_tail;

        if tail.wrapping_sub(self.cached_head) > self.mask() {
            self.cached_head = self.shared.head.load(Ordering::Acquire);
            if tail.wrapping_sub(self.cached_head) > self.mask() {
                return Err(value);
            }
        }

        unsafe {
            self.shared.buffer.add(tail & self.mask()).write(value);
        }
        let new_tail = tail.wrapping_add(1);
        self.shared.tail.store(new_tail, Ordering::Release);
        self.local_tail = new_tail;
        Ok(())
    }

    /// Capacity of the queue (always a power of two).
    pub fn capacity(&self) -> usize {
        self.mask() + 1
    }

    #[inline]
    fn mask(&self) -> usize {
        self.shared.mask
    }
}

/// The consumer half of an atomic queue. Only the thread that owns this value
/// may pop.
pub struct QueueConsumer<T> {
    local_head: usize,
    cached_tail: usize,
    shared: Arc<Shared<T>>,
}

unsafe impl<T: Send> Send for QueueConsumer<T> {}

impl<T> QueueConsumer<T> {
    /// Pop the next value, or `None` if the queue is empty.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let head = self.local_head;

        if head == self.cached_tail {
            self.cached_tail = self.shared.tail.load(Ordering::Acquire);
            if head == self.cached_tail {
                return None;
            }
        }

        let value = unsafe { self.shared.buffer.add(head & self.mask()).read() };
        let new_head = head.wrapping_add(1);
        self.shared.head.store(new_head, Ordering::Release);
        self.local_head = new_head;
        Some(value)
    }

    /// Capacity of the queue (always a power of two).
    pub fn capacity(&self) -> usize {
        self.mask() + 1
    }

    #[inline]
    fn mask(&self) -> usize {
        self.shared.mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_fifo_order() {
        let (mut p, mut c) = bounded::<u32>(4);
        assert!(p.push(1).is_ok());
        assert!(p.push(2).is_ok());
        assert_eq!(c.pop(), Some(1));
        assert_eq!(c.pop(), Some(2));
        assert_eq!(c.pop(), None);
    }

    #[test]
    fn rounds_capacity_up_to_power_of_two() {
        let (p, _c) = bounded::<u8>(1000);
        assert_eq!(p.capacity(), 1024);
    }

    #[test]
    fn reports_full_without_blocking() {
        let (mut p, mut c) = bounded::<u32>(2);
        assert!(p.push(1).is_ok());
        assert!(p.push(2).is_ok());
        assert_eq!(p.push(3), Err(3));
        assert_eq!(c.pop(), Some(1));
        assert!(p.push(3).is_ok());
    }

    #[test]
    fn drops_undrained_values() {
        use std::sync::atomic::AtomicUsize as ADrop;
        static DROPS: ADrop = ADrop::new(0);
        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }
        let (mut p, c) = bounded::<Counted>(4);
        p.push(Counted).unwrap();
        p.push(Counted).unwrap();
        drop(p);
        drop(c);
        assert_eq!(DROPS.load(Ordering::Relaxed), 2);
    }
}
