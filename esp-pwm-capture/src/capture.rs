//! Per-channel interrupt state and the edge measurement algorithm.
//!
//! A falling edge closes the high phase and records `duty`. A rising edge
//! closes the cycle, records `period` and publishes the pending sample.

use core::ptr::NonNull;

use crate::{sample::ZERO, Duration, Edge, Instant, Level, Line, Sample, SampleQueue};

/// How much of the signal has been seen since the channel was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arming {
    /// No edge yet.
    Idle,
    /// One edge seen, `last_edge` is a real transition.
    Reference,
    /// A full high phase has been measured, the next rising edge completes a
    /// valid cycle.
    Armed,
}

/// State shared between a channel and its interrupt handler.
///
/// Only touched by the handler while the channel is active, and only by the
/// channel otherwise.
#[derive(Debug)]
pub(crate) struct IsrContext {
    pending: Sample,
    last_edge: Instant,
    arming: Arming,
    discard_first_cycle: bool,
    queue: Option<NonNull<SampleQueue>>,
}

impl IsrContext {
    pub(crate) const fn new(line: Line) -> Self {
        Self {
            pending: Sample::empty(line),
            last_edge: Instant::from_ticks(0),
            arming: Arming::Idle,
            discard_first_cycle: true,
            queue: None,
        }
    }

    /// Prepares for a fresh measurement, forgetting every previous edge.
    pub(crate) fn arm(&mut self, queue: NonNull<SampleQueue>, discard_first_cycle: bool) {
        self.pending = Sample::empty(self.pending.line);
        self.last_edge = Instant::from_ticks(0);
        self.arming = Arming::Idle;
        self.discard_first_cycle = discard_first_cycle;
        self.queue = Some(queue);
    }

    pub(crate) fn detach_queue(&mut self) {
        self.queue = None;
    }

    /// Feeds one transition through the measurement and returns the sample
    /// it completes, if any.
    #[inline(always)]
    pub(crate) fn on_edge(&mut self, edge: Edge) -> Option<Sample> {
        let now = edge.timestamp;
        let since = now.checked_duration_since(self.last_edge).unwrap_or(ZERO);

        let completed = match edge.level {
            Level::High => {
                self.pending.period = self
                    .pending
                    .duty
                    .checked_add(since)
                    .unwrap_or(Duration::from_ticks(u64::MAX));

                (!self.discard_first_cycle || self.arming == Arming::Armed)
                    .then_some(self.pending)
            }
            Level::Low => {
                self.pending.duty = since;
                self.pending.t0 = self.last_edge;
                if self.arming == Arming::Reference {
                    self.arming = Arming::Armed;
                }
                None
            }
        };

        if self.arming == Arming::Idle {
            self.arming = Arming::Reference;
        }
        self.last_edge = now;

        completed
    }
}

/// Interrupt handler registered for every active channel.
///
/// # Safety
///
/// `arg` must point to the channel's [`IsrContext`], and nothing else may
/// access that context while the handler runs.
#[cfg_attr(all(feature = "esp-hal", place_isr_in_ram), esp_hal::ram)]
pub(crate) unsafe fn on_edge_interrupt(arg: NonNull<()>, edge: Edge) {
    let context = unsafe { arg.cast::<IsrContext>().as_mut() };

    let Some(sample) = context.on_edge(edge) else {
        return;
    };

    if let Some(queue) = context.queue {
        // Overflow is counted by the queue.
        let _ = unsafe { queue.as_ref() }.try_send(sample);
    }
}
