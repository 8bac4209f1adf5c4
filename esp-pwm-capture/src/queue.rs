//! # Sample queue
//!
//! A bounded FIFO moving [`Sample`]s from interrupt context to the consumer.
//!
//! The producer side ([`SampleQueue::try_send`]) never blocks and never
//! allocates: storage for `capacity` samples is reserved when the queue is
//! created. When the queue is full the sample is dropped and counted, as an
//! interrupt handler has nobody to report the failure to.
//!
//! The consumer can poll with [`SampleQueue::try_receive`] or wait with
//! [`SampleQueue::receive`]. Only one task should wait on a queue at a time.

use alloc::collections::VecDeque;
use core::{cell::RefCell, future::poll_fn, task::Poll};

use critical_section::Mutex;
use embassy_sync::waitqueue::AtomicWaker;
use portable_atomic::{AtomicU32, Ordering};

use crate::Sample;

/// Errors when creating a [`SampleQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    /// A queue must hold at least one sample.
    ZeroCapacity,
    /// The backing storage could not be allocated.
    OutOfMemory,
}

impl core::fmt::Display for QueueError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            QueueError::ZeroCapacity => write!(f, "Queue capacity must not be zero"),
            QueueError::OutOfMemory => write!(f, "Not enough memory for the queue"),
        }
    }
}

impl core::error::Error for QueueError {}

/// Bounded, interrupt-safe queue of completed measurements.
pub struct SampleQueue {
    ring: Mutex<RefCell<VecDeque<Sample>>>,
    capacity: usize,
    dropped: AtomicU32,
    waker: AtomicWaker,
}

impl SampleQueue {
    /// Creates a queue holding up to `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or the storage cannot be allocated. Use
    /// [`SampleQueue::try_new`] to handle these cases.
    pub fn new(capacity: usize) -> Self {
        match Self::try_new(capacity) {
            Ok(queue) => queue,
            Err(e) => panic!("Failed to create sample queue: {}", e),
        }
    }

    /// Creates a queue holding up to `capacity` samples.
    pub fn try_new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }

        let mut ring = VecDeque::new();
        ring.try_reserve_exact(capacity)
            .map_err(|_| QueueError::OutOfMemory)?;

        Ok(Self {
            ring: Mutex::new(RefCell::new(ring)),
            capacity,
            dropped: AtomicU32::new(0),
            waker: AtomicWaker::new(),
        })
    }

    /// Enqueues a sample without blocking.
    ///
    /// Safe to call from interrupt context. If the queue is full the sample is
    /// handed back and the drop counter is incremented.
    #[inline(always)]
    pub fn try_send(&self, sample: Sample) -> Result<(), Sample> {
        let accepted = critical_section::with(|cs| {
            let mut ring = self.ring.borrow_ref_mut(cs);
            if ring.len() >= self.capacity {
                return false;
            }
            // Storage was reserved up front, this doesn't reallocate.
            ring.push_back(sample);
            true
        });

        if accepted {
            self.waker.wake();
            Ok(())
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            Err(sample)
        }
    }

    /// Dequeues the oldest sample, if any.
    pub fn try_receive(&self) -> Option<Sample> {
        critical_section::with(|cs| self.ring.borrow_ref_mut(cs).pop_front())
    }

    /// Waits for the next sample.
    pub async fn receive(&self) -> Sample {
        poll_fn(|cx| {
            // Register first so a sample sent right after the check still
            // wakes us.
            self.waker.register(cx.waker());
            match self.try_receive() {
                Some(sample) => Poll::Ready(sample),
                None => Poll::Pending,
            }
        })
        .await
    }

    /// Returns an iterator that dequeues samples until the queue is empty.
    pub fn drain(&self) -> Drain<'_> {
        Drain { queue: self }
    }

    /// Discards every queued sample. The drop counter is left untouched.
    pub fn clear(&self) {
        critical_section::with(|cs| self.ring.borrow_ref_mut(cs).clear());
    }

    /// Number of queued samples.
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.ring.borrow_ref(cs).len())
    }

    /// Returns `true` if no sample is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the next [`SampleQueue::try_send`] would drop.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Maximum number of queued samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples dropped because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns the drop counter and resets it to zero.
    pub fn take_dropped(&self) -> u32 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

impl core::fmt::Debug for SampleQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SampleQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Iterator returned by [`SampleQueue::drain`].
pub struct Drain<'a> {
    queue: &'a SampleQueue,
}

impl Iterator for Drain<'_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        self.queue.try_receive()
    }
}
