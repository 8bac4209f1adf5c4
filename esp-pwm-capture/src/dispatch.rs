//! # Interrupt dispatch
//!
//! GPIO peripherals raise a single interrupt for all of their pins. The
//! [`DispatchService`] owns that interrupt and routes each transition to the
//! handler registered for the pin (its "line"), together with a small opaque
//! context pointer.
//!
//! ## Lifecycle
//!
//! The service must be enabled once, before any channel is configured, and
//! may only be disabled again once every handler has been removed. Both
//! rules are enforced by returning an error.
//!
//! ## Critical sections
//!
//! Handlers run inside a critical section, and registration slots are only
//! modified inside one. Once [`DispatchService::remove_handler`] returns, the
//! handler is not running and will not be invoked again.

use core::{cell::RefCell, ptr::NonNull};

use critical_section::Mutex;
use esp_config::esp_config_int_parse;
use portable_atomic::{AtomicBool, Ordering};

use crate::{
    controller::{EdgeController, Event},
    fmt::Debug2Format,
    Edge,
    Error,
    Line,
};

/// Number of lines the handler table has room for.
pub const MAX_LINES: usize = esp_config::esp_config_int!(usize, "ESP_PWM_CAPTURE_MAX_LINES");

/// A function invoked on every transition of a registered line.
///
/// `arg` is the pointer passed to [`DispatchService::add_handler`]. Handlers
/// run in interrupt context: they must not block or allocate.
pub type EdgeHandler = unsafe fn(arg: NonNull<()>, edge: Edge);

#[derive(Clone, Copy)]
struct Registration {
    handler: EdgeHandler,
    arg: NonNull<()>,
}

// SAFETY: `arg` is only dereferenced by `handler`, which only runs inside the
// dispatch critical section.
unsafe impl Send for Registration {}

/// Routes GPIO transitions to per-line handlers.
///
/// There is one of these per GPIO peripheral, usually in a `static`.
pub struct DispatchService<C> {
    controller: C,
    installed: AtomicBool,
    handlers: Mutex<RefCell<[Option<Registration>; MAX_LINES]>>,
}

impl<C> DispatchService<C> {
    /// Creates a disabled dispatch service on top of `controller`.
    pub const fn new(controller: C) -> Self {
        Self {
            controller,
            installed: AtomicBool::new(false),
            handlers: Mutex::new(RefCell::new([None; MAX_LINES])),
        }
    }

    /// The underlying GPIO peripheral.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Returns `true` between a successful [`enable`](Self::enable) and the
    /// matching [`disable`](Self::disable).
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Number of lines that currently have a handler.
    pub fn registered_handlers(&self) -> usize {
        critical_section::with(|cs| {
            self.handlers
                .borrow_ref(cs)
                .iter()
                .filter(|slot| slot.is_some())
                .count()
        })
    }

    /// Returns `true` if `line` has a handler.
    pub fn is_registered(&self, line: Line) -> bool {
        let Some(index) = slot_index(line) else {
            return false;
        };
        critical_section::with(|cs| self.handlers.borrow_ref(cs)[index].is_some())
    }
}

impl<C: EdgeController> DispatchService<C> {
    /// Installs the dispatch mechanism.
    ///
    /// Fails with [`Error::AlreadyInstalled`] if the service is already
    /// enabled.
    pub fn enable(&self) -> Result<(), Error> {
        if self.is_installed() {
            error!("ISR service already initialized");
            return Err(Error::AlreadyInstalled);
        }

        self.controller.install().map_err(|e| {
            error!("Failed to install gpio isr service: {:?}", Debug2Format(&e));
            Error::Handler
        })?;

        self.installed.store(true, Ordering::Release);
        debug!("ISR service installed");
        Ok(())
    }

    /// Uninstalls the dispatch mechanism.
    ///
    /// Fails with [`Error::NotInstalled`] if the service is not enabled, and
    /// with [`Error::InvalidState`] while any handler is still registered.
    pub fn disable(&self) -> Result<(), Error> {
        if !self.is_installed() {
            error!("ISR service not initialized yet");
            return Err(Error::NotInstalled);
        }

        let registered = self.registered_handlers();
        if registered != 0 {
            error!(
                "Failed to uninstall ISR service, {} handler(s) still registered",
                registered
            );
            return Err(Error::InvalidState);
        }

        self.controller.uninstall().map_err(|e| {
            error!("Failed to uninstall gpio isr service: {:?}", Debug2Format(&e));
            Error::Handler
        })?;

        self.installed.store(false, Ordering::Release);
        debug!("ISR service uninstalled");
        Ok(())
    }

    /// Registers `handler` for `line` and enables the line's interrupt on
    /// any edge.
    ///
    /// Fails with [`Error::InvalidState`] if the service is not enabled, and
    /// with [`Error::Handler`] if `line` is out of range, already has a
    /// handler, or its interrupt can't be enabled. Nothing is registered on
    /// failure.
    ///
    /// # Safety
    ///
    /// `arg` must remain valid for `handler` until
    /// [`remove_handler`](Self::remove_handler) has returned `Ok` for `line`.
    pub unsafe fn add_handler(
        &self,
        line: Line,
        handler: EdgeHandler,
        arg: NonNull<()>,
    ) -> Result<(), Error> {
        if !self.is_installed() {
            error!("Cannot add handler for line {}: ISR service not initialized", line.0);
            return Err(Error::InvalidState);
        }

        let Some(index) = slot_index(line) else {
            error!("Line {} is out of range", line.0);
            return Err(Error::Handler);
        };

        critical_section::with(|cs| {
            let mut handlers = self.handlers.borrow_ref_mut(cs);
            if handlers[index].is_some() {
                error!("Line {} already has a handler", line.0);
                return Err(Error::Handler);
            }
            handlers[index] = Some(Registration { handler, arg });
            Ok(())
        })?;

        // The slot is filled before the interrupt is enabled, so the first
        // edge already finds its handler.
        if let Err(e) = self.controller.listen(line, Event::AnyEdge) {
            critical_section::with(|cs| self.handlers.borrow_ref_mut(cs)[index] = None);
            error!("Failed to listen on line {}: {:?}", line.0, Debug2Format(&e));
            return Err(Error::Handler);
        }

        trace!("Handler added for line {}", line.0);
        Ok(())
    }

    /// Disables the interrupt of `line` and removes its handler.
    ///
    /// Fails with [`Error::Handler`] if no handler is registered or the
    /// interrupt can't be disabled, in which case the handler stays
    /// registered.
    pub fn remove_handler(&self, line: Line) -> Result<(), Error> {
        if !self.is_registered(line) {
            error!("Line {} has no handler", line.0);
            return Err(Error::Handler);
        }

        self.controller.unlisten(line).map_err(|e| {
            error!("Failed to unlisten line {}: {:?}", line.0, Debug2Format(&e));
            Error::Handler
        })?;

        if let Some(index) = slot_index(line) {
            critical_section::with(|cs| self.handlers.borrow_ref_mut(cs)[index] = None);
        }

        trace!("Handler removed for line {}", line.0);
        Ok(())
    }

    /// Runs the handler of `line`, if any.
    ///
    /// Call this from the GPIO interrupt for every line whose interrupt
    /// status is set. The line level is sampled first and the timestamp read
    /// right after. Returns `true` if a handler ran.
    #[inline]
    pub fn handle_interrupt(&self, line: Line) -> bool {
        let Some(index) = slot_index(line) else {
            return false;
        };

        critical_section::with(|cs| {
            let registration = self.handlers.borrow_ref(cs)[index];
            let Some(registration) = registration else {
                return false;
            };

            let level = self.controller.level(line);
            let timestamp = self.controller.now();

            // SAFETY: registrations are removed before their context is freed,
            // and removal can't interleave with this critical section.
            unsafe { (registration.handler)(registration.arg, Edge { level, timestamp }) };
            true
        })
    }

    /// Runs the handler of every line flagged in `status`.
    ///
    /// `status` is an interrupt status word whose bit 0 corresponds to line
    /// `offset`, as read from one GPIO bank. Lines are handled lowest first.
    /// Returns the number of handlers that ran.
    pub fn handle_status(&self, offset: u8, status: u32) -> usize {
        let mut handled = 0;
        let mut pending = status;
        while pending != 0 {
            let pin_pos = pending.trailing_zeros();
            pending -= 1 << pin_pos;

            if self.handle_interrupt(Line(offset.saturating_add(pin_pos as u8))) {
                handled += 1;
            }
        }
        handled
    }
}

fn slot_index(line: Line) -> Option<usize> {
    let index = line.0 as usize;
    (index < MAX_LINES).then_some(index)
}
