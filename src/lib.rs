//! turnstile - ticket-based bounded MPMC queue
//!
//! - `send` / `recv` : blocking (spin) operations, wait-free once a slot is claimed
//! - `try_send` / `try_recv` : non-blocking variants that return Err when full/empty
//! - capacity is fixed at construction and does not need to be a power of two
//!
//! Producers and consumers each draw a monotonic 64-bit ticket from their own
//! counter, then rendezvous on the slot the ticket maps to. A slot whose turn
//! counter reads `2g` is empty and waiting for the generation-`g` producer;
//! `2g + 1` means full and waiting for the generation-`g` consumer. The
//! release/acquire handshake on the turn counter is the only synchronization
//! between threads; `head` and `tail` never wait on each other.
//!
//! Share the queue across threads behind an [`std::sync::Arc`]; all operations
//! take `&self`.

#![warn(missing_docs)]

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ops::Deref;
use core::ptr::{self, NonNull};
use std::alloc::{self, Layout};

use crossbeam_utils::CachePadded;
use thiserror::Error;

use crate::sync::{AtomicU64, Backoff, Ordering};

mod sync;

/// Construction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The requested capacity was zero.
    #[error("capacity must be at least 1")]
    InvalidCapacity,
    /// The slot array could not be allocated.
    #[error("slot array allocation failed")]
    AllocationFailed,
}

/// Non-blocking send failure; hands the rejected element back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendError<T>(pub T);

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

/// Non-blocking recv failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvError;

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is empty")
    }
}

/// One cell of the ring: the turn counter plus inline storage for a single
/// element. Storage is occupied iff `turn` is odd.
struct Slot<T> {
    turn: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Slot {
            turn: AtomicU64::new(0),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Move `value` into the slot's storage.
    ///
    /// # Safety
    ///
    /// The caller must hold the producer side of this slot's turn (even value
    /// matching its ticket), so no element is live and no other thread touches
    /// the storage.
    unsafe fn fill(&self, value: T) {
        unsafe { (*self.value.get()).write(value) };
    }

    /// Move the live element out of the slot's storage.
    ///
    /// # Safety
    ///
    /// The caller must hold the consumer side of this slot's turn (odd value
    /// matching its ticket), so the storage holds a live element no other
    /// thread touches. The storage is uninitialized afterwards.
    unsafe fn take(&self) -> T {
        unsafe { (*self.value.get()).assume_init_read() }
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        // occupancy is turn parity
        if self.turn.load(Ordering::Relaxed) & 1 == 1 {
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

// Safety: slot access is serialized by the turn handshake; T crosses threads.
unsafe impl<T: Send> Send for Slot<T> {}
unsafe impl<T: Send> Sync for Slot<T> {}

/// Owns the heap allocation holding the ring's slots. One spare slot is
/// allocated past the end, left uninitialized, so the last live slot never
/// shares a cache line with a neighboring allocation.
struct SlotBuffer<T> {
    ptr: NonNull<CachePadded<Slot<T>>>,
    len: usize,
    layout: Layout,
    _marker: PhantomData<T>,
}

impl<T> SlotBuffer<T> {
    fn allocate(capacity: usize) -> Result<Self, Error> {
        let len = capacity.checked_add(1).ok_or(Error::AllocationFailed)?;
        let layout =
            Layout::array::<CachePadded<Slot<T>>>(len).map_err(|_| Error::AllocationFailed)?;
        let raw = unsafe { alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(raw.cast::<CachePadded<Slot<T>>>()) else {
            return Err(Error::AllocationFailed);
        };
        // The global allocator honors the layout's alignment, which already
        // carries the cache-line requirement of CachePadded.
        debug_assert_eq!(raw as usize % core::mem::align_of::<CachePadded<Slot<T>>>(), 0);
        for i in 0..capacity {
            unsafe { ptr.as_ptr().add(i).write(CachePadded::new(Slot::new())) };
        }
        Ok(SlotBuffer {
            ptr,
            len: capacity,
            layout,
            _marker: PhantomData,
        })
    }
}

impl<T> Deref for SlotBuffer<T> {
    type Target = [CachePadded<Slot<T>>];

    fn deref(&self) -> &Self::Target {
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> Drop for SlotBuffer<T> {
    fn drop(&mut self) {
        unsafe {
            // The spare slot was never initialized; drop only the ring.
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len));
            alloc::dealloc(self.ptr.as_ptr().cast(), self.layout);
        }
    }
}

/// Bounded ticket-based MPMC queue.
///
/// - `send` / `recv` spin until they complete and never fail.
/// - `try_send` / `try_recv` return immediately with an error when the queue
///   is full / empty.
///
/// Any number of producers and consumers may operate concurrently. Elements
/// are delivered in ticket order; storage lives inline in the slot array, so
/// the hot paths never allocate.
pub struct Queue<T> {
    slots: SlotBuffer<T>,
    capacity: usize,
    /// producer ticket dispenser (monotonic)
    head: CachePadded<AtomicU64>,
    /// consumer ticket dispenser (monotonic)
    tail: CachePadded<AtomicU64>,
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("capacity", &self.capacity)
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> Queue<T> {
    /// Create a queue holding at most `capacity` elements.
    ///
    /// Fails with [`Error::InvalidCapacity`] when `capacity` is zero and with
    /// [`Error::AllocationFailed`] when the slot array cannot be allocated.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        const {
            // False-sharing audit: each slot spans whole cache lines, and the
            // head and tail dispensers sit on distinct lines.
            assert!(
                core::mem::size_of::<CachePadded<Slot<T>>>()
                    % core::mem::align_of::<CachePadded<Slot<T>>>()
                    == 0
            );
            assert!(
                core::mem::offset_of!(Self, head).abs_diff(core::mem::offset_of!(Self, tail))
                    >= core::mem::size_of::<CachePadded<AtomicU64>>()
            );
        }
        if capacity < 1 {
            return Err(Error::InvalidCapacity);
        }
        Ok(Queue {
            slots: SlotBuffer::allocate(capacity)?,
            capacity,
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
        })
    }

    #[inline]
    fn idx(&self, ticket: u64) -> usize {
        (ticket % self.capacity as u64) as usize
    }

    #[inline]
    fn generation(&self, ticket: u64) -> u64 {
        ticket / self.capacity as u64
    }

    /// Blocking send: draw a ticket, wait for the slot's turn, publish.
    ///
    /// Spins until the generation-matching consumer has freed the slot.
    /// Producers holding different slots never wait on each other.
    pub fn send(&self, value: T) {
        // The turn handshake orders the payload; the ticket only needs atomicity.
        let ticket = self.head.fetch_add(1, Ordering::Relaxed);
        let slot = &self.slots[self.idx(ticket)];
        let turn = 2 * self.generation(ticket);

        let backoff = Backoff::new();
        while slot.turn.load(Ordering::Acquire) != turn {
            backoff.snooze();
        }

        unsafe { slot.fill(value) };
        slot.turn.store(turn + 1, Ordering::Release);
    }

    /// Non-blocking send: returns `Err(SendError(value))` when the queue is
    /// full.
    ///
    /// Failure is reported only when `head` did not advance between two
    /// consecutive observations, which distinguishes genuine fullness from
    /// transient contention with other producers.
    pub fn try_send(&self, value: T) -> Result<(), SendError<T>> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let slot = &self.slots[self.idx(head)];
            let turn = 2 * self.generation(head);
            if slot.turn.load(Ordering::Acquire) == turn {
                match self
                    .head
                    .compare_exchange(head, head + 1, Ordering::AcqRel, Ordering::Acquire)
                {
                    Ok(_) => {
                        unsafe { slot.fill(value) };
                        slot.turn.store(turn + 1, Ordering::Release);
                        return Ok(());
                    }
                    Err(observed) => head = observed,
                }
            } else {
                let prev = head;
                head = self.head.load(Ordering::Acquire);
                if head == prev {
                    return Err(SendError(value));
                }
            }
        }
    }

    /// Blocking recv: draw a ticket, wait for the slot to fill, move the
    /// element out and free the slot for the next generation.
    pub fn recv(&self) -> T {
        let ticket = self.tail.fetch_add(1, Ordering::Relaxed);
        let slot = &self.slots[self.idx(ticket)];
        let turn = 2 * self.generation(ticket) + 1;

        let backoff = Backoff::new();
        while slot.turn.load(Ordering::Acquire) != turn {
            backoff.snooze();
        }

        let value = unsafe { slot.take() };
        slot.turn.store(turn + 1, Ordering::Release);
        value
    }

    /// Non-blocking recv: returns `Err(RecvError)` when the queue is empty.
    ///
    /// Same two-observation rule as [`Queue::try_send`], applied to `tail`.
    pub fn try_recv(&self) -> Result<T, RecvError> {
        let mut tail = self.tail.load(Ordering::Acquire);
        loop {
            let slot = &self.slots[self.idx(tail)];
            let turn = 2 * self.generation(tail) + 1;
            if slot.turn.load(Ordering::Acquire) == turn {
                match self
                    .tail
                    .compare_exchange(tail, tail + 1, Ordering::AcqRel, Ordering::Acquire)
                {
                    Ok(_) => {
                        let value = unsafe { slot.take() };
                        slot.turn.store(turn + 1, Ordering::Release);
                        return Ok(value);
                    }
                    Err(observed) => tail = observed,
                }
            } else {
                let prev = tail;
                tail = self.tail.load(Ordering::Acquire);
                if tail == prev {
                    return Err(RecvError);
                }
            }
        }
    }

    /// Number of elements in the queue, as the signed difference between the
    /// ticket dispensers. Negative when consumers have claimed tickets no
    /// producer has satisfied yet.
    ///
    /// Best-effort while producers or consumers are active; exact once all
    /// participating threads have quiesced.
    pub fn size(&self) -> i64 {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail) as i64
    }

    /// True when [`Queue::size`] is zero or negative. Best-effort, like
    /// `size`.
    pub fn is_empty(&self) -> bool {
        self.size() <= 0
    }

    /// Capacity fixed at construction.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

// Safety: the queue can be shared and sent across threads when T can; all
// interior mutation goes through atomics or the turn-guarded slot storage.
unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}
