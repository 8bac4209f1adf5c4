//! The hardware seam: what the capture driver needs from a GPIO peripheral.

use crate::{Instant, Level, Line};

/// Pull setting for an input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    /// No pull
    None,
    /// Pull up
    Up,
    /// Pull down
    Down,
}

/// Event used to trigger pin interrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Interrupts trigger on rising pin edge.
    RisingEdge,
    /// Interrupts trigger on falling pin edge.
    FallingEdge,
    /// Interrupts trigger on either rising or falling pin edges.
    AnyEdge,
}

/// Electrical and trigger configuration of a captured line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinConfig {
    /// Pull resistor. The pin is always configured as an input.
    pub pull: Pull,
    /// Which transitions raise the pin interrupt.
    pub event: Event,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            pull: Pull::Down,
            event: Event::AnyEdge,
        }
    }
}

/// A GPIO peripheral able to raise an interrupt on logic-level transitions.
///
/// Methods take `&self` so a [`DispatchService`](crate::DispatchService) can
/// live in a `static`; implementations are expected to use interior
/// mutability. [`EdgeController::level`] and [`EdgeController::now`] are
/// called from interrupt context and must neither block nor allocate.
pub trait EdgeController {
    /// Error reported by the peripheral.
    type Error: core::fmt::Debug;

    /// Routes the shared GPIO interrupt to the dispatch service.
    fn install(&self) -> Result<(), Self::Error>;

    /// Detaches the shared GPIO interrupt.
    fn uninstall(&self) -> Result<(), Self::Error>;

    /// Configures `line` as an input.
    fn configure_pin(&self, line: Line, config: &PinConfig) -> Result<(), Self::Error>;

    /// Returns `line` to its reset state.
    fn reset_pin(&self, line: Line) -> Result<(), Self::Error>;

    /// Enables the interrupt of `line`.
    fn listen(&self, line: Line, event: Event) -> Result<(), Self::Error>;

    /// Disables the interrupt of `line`.
    fn unlisten(&self, line: Line) -> Result<(), Self::Error>;

    /// Current level of `line`.
    fn level(&self, line: Line) -> Level;

    /// Current time of the high-resolution timer.
    fn now(&self) -> Instant;
}

impl<T: EdgeController + ?Sized> EdgeController for &T {
    type Error = T::Error;

    fn install(&self) -> Result<(), Self::Error> {
        (**self).install()
    }

    fn uninstall(&self) -> Result<(), Self::Error> {
        (**self).uninstall()
    }

    fn configure_pin(&self, line: Line, config: &PinConfig) -> Result<(), Self::Error> {
        (**self).configure_pin(line, config)
    }

    fn reset_pin(&self, line: Line) -> Result<(), Self::Error> {
        (**self).reset_pin(line)
    }

    fn listen(&self, line: Line, event: Event) -> Result<(), Self::Error> {
        (**self).listen(line, event)
    }

    fn unlisten(&self, line: Line) -> Result<(), Self::Error> {
        (**self).unlisten(line)
    }

    fn level(&self, line: Line) -> Level {
        (**self).level(line)
    }

    fn now(&self) -> Instant {
        (**self).now()
    }
}
