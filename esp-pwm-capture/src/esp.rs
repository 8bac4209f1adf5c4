//! # `esp-hal` backend
//!
//! [`EspGpio`] implements [`EdgeController`] on top of the `esp-hal` GPIO
//! driver, and [`DISPATCH`] is the dispatch service its interrupt handler
//! routes into.
//!
//! ```rust, ignore
//! use esp_pwm_capture::{esp::DISPATCH, CaptureChannel, Line};
//!
//! DISPATCH.enable()?;
//!
//! let mut channel = CaptureChannel::new(&DISPATCH, Line(4), "fan");
//! channel.configure_default()?;
//! channel.start()?;
//! ```
//!
//! Pins are taken over by number: nothing else may use a line while a
//! channel has it configured.

use core::cell::RefCell;

use critical_section::Mutex;
use esp_hal::{
    gpio::{self, AnyPin, Flex, InputConfig, Io},
    handler,
    interrupt,
    peripherals::{Interrupt, IO_MUX},
    system::Cpu,
};

use crate::{
    controller::{EdgeController, Event, PinConfig, Pull},
    dispatch::MAX_LINES,
    DispatchService,
    Instant,
    Level,
    Line,
};

/// The dispatch service for the GPIO peripheral.
pub static DISPATCH: DispatchService<EspGpio> = DispatchService::new(EspGpio::new());

/// Errors reported by [`EspGpio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum EspGpioError {
    /// The line number is beyond the handler table.
    LineOutOfRange,
    /// The line has not been configured.
    NotConfigured,
}

impl core::fmt::Display for EspGpioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EspGpioError::LineOutOfRange => write!(f, "GPIO number out of range"),
            EspGpioError::NotConfigured => write!(f, "GPIO not configured"),
        }
    }
}

impl core::error::Error for EspGpioError {}

/// `esp-hal` GPIO driver as an [`EdgeController`].
pub struct EspGpio {
    pins: Mutex<RefCell<[Option<Flex<'static>>; MAX_LINES]>>,
}

impl EspGpio {
    const fn new() -> Self {
        Self {
            pins: Mutex::new(RefCell::new([const { None }; MAX_LINES])),
        }
    }

    fn with_pin<R>(
        &self,
        line: Line,
        f: impl FnOnce(&mut Flex<'static>) -> R,
    ) -> Result<R, EspGpioError> {
        let index = line.0 as usize;
        if index >= MAX_LINES {
            return Err(EspGpioError::LineOutOfRange);
        }
        critical_section::with(|cs| {
            self.pins.borrow_ref_mut(cs)[index]
                .as_mut()
                .map(f)
                .ok_or(EspGpioError::NotConfigured)
        })
    }
}

impl From<Pull> for gpio::Pull {
    fn from(pull: Pull) -> Self {
        match pull {
            Pull::None => gpio::Pull::None,
            Pull::Up => gpio::Pull::Up,
            Pull::Down => gpio::Pull::Down,
        }
    }
}

impl From<Event> for gpio::Event {
    fn from(event: Event) -> Self {
        match event {
            Event::RisingEdge => gpio::Event::RisingEdge,
            Event::FallingEdge => gpio::Event::FallingEdge,
            Event::AnyEdge => gpio::Event::AnyEdge,
        }
    }
}

impl From<gpio::Level> for Level {
    fn from(level: gpio::Level) -> Self {
        match level {
            gpio::Level::Low => Level::Low,
            gpio::Level::High => Level::High,
        }
    }
}

impl EdgeController for EspGpio {
    type Error = EspGpioError;

    fn install(&self) -> Result<(), EspGpioError> {
        // SAFETY: `Io` only binds the interrupt handler, pins are driven
        // through `Flex`.
        let mut io = Io::new(unsafe { IO_MUX::steal() });
        io.set_interrupt_handler(gpio_interrupt);
        Ok(())
    }

    fn uninstall(&self) -> Result<(), EspGpioError> {
        interrupt::disable(Cpu::current(), Interrupt::GPIO);
        Ok(())
    }

    fn configure_pin(&self, line: Line, config: &PinConfig) -> Result<(), EspGpioError> {
        let index = line.0 as usize;
        if index >= MAX_LINES {
            return Err(EspGpioError::LineOutOfRange);
        }

        // SAFETY: the channel owning `line` is its only user.
        let mut pin = Flex::new(unsafe { AnyPin::steal(line.0) });
        pin.apply_input_config(&InputConfig::default().with_pull(config.pull.into()));
        pin.set_input_enable(true);

        critical_section::with(|cs| self.pins.borrow_ref_mut(cs)[index] = Some(pin));
        Ok(())
    }

    fn reset_pin(&self, line: Line) -> Result<(), EspGpioError> {
        let index = line.0 as usize;
        if index >= MAX_LINES {
            return Err(EspGpioError::LineOutOfRange);
        }
        // Dropping the driver returns the pin to its default state.
        let pin = critical_section::with(|cs| self.pins.borrow_ref_mut(cs)[index].take());
        drop(pin);
        Ok(())
    }

    fn listen(&self, line: Line, event: Event) -> Result<(), EspGpioError> {
        self.with_pin(line, |pin| {
            pin.clear_interrupt();
            pin.listen(event.into());
        })
    }

    fn unlisten(&self, line: Line) -> Result<(), EspGpioError> {
        self.with_pin(line, |pin| {
            pin.unlisten();
            pin.clear_interrupt();
        })
    }

    #[inline]
    fn level(&self, line: Line) -> Level {
        self.with_pin(line, |pin| pin.level().into())
            .unwrap_or(Level::Low)
    }

    #[inline]
    fn now(&self) -> Instant {
        Instant::from_ticks(
            esp_hal::time::Instant::now()
                .duration_since_epoch()
                .as_micros(),
        )
    }
}

const BANKS: usize = MAX_LINES.div_ceil(32);

#[handler]
fn gpio_interrupt() {
    let mut status = [0u32; BANKS];

    critical_section::with(|cs| {
        let mut pins = DISPATCH.controller().pins.borrow_ref_mut(cs);
        for (line, slot) in pins.iter_mut().enumerate() {
            if let Some(pin) = slot {
                if pin.is_interrupt_set() {
                    pin.clear_interrupt();
                    status[line / 32] |= 1 << (line % 32);
                }
            }
        }
    });

    // The pin table is released here: handlers read levels through it.
    for (bank, bits) in status.into_iter().enumerate() {
        if bits != 0 {
            DISPATCH.handle_status((bank * 32) as u8, bits);
        }
    }
}
