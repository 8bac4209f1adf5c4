//! # Capture channel
//!
//! A [`CaptureChannel`] measures the PWM signal on one line. It moves
//! through three states:
//!
//! ```text
//!                configure            start
//! Uninitialized ──────────► Configured ──────► Active
//!               ◄──────────            ◄──────
//!                deconfigure           stop
//! ```
//!
//! Every transition is checked: calling an operation from the wrong state
//! returns [`Error::InvalidState`] and changes nothing. A failed operation
//! leaves the channel in the state it was in.
//!
//! ## Queues
//!
//! Completed samples are published to a [`SampleQueue`]. The channel either
//! allocates its own ([`CaptureChannel::configure`]) or borrows one with a
//! `'static` lifetime ([`CaptureChannel::configure_with_queue`]), for
//! example when a consumer task needs to hold on to it.
//!
//! ## Dropping
//!
//! Dropping a channel stops and deconfigures it. An owned queue is freed, a
//! borrowed one is left alone.

use alloc::boxed::Box;
use core::ptr::NonNull;
use esp_config::esp_config_int_parse;

use crate::{
    capture::{on_edge_interrupt, IsrContext},
    controller::{EdgeController, Event, PinConfig, Pull},
    fmt::Debug2Format,
    DispatchService,
    Error,
    Line,
    SampleQueue,
};

/// Capacity of the queue allocated by [`CaptureChannel::configure_default`].
pub const DEFAULT_QUEUE_CAPACITY: usize =
    esp_config::esp_config_int!(usize, "ESP_PWM_CAPTURE_DEFAULT_QUEUE_CAPACITY");

/// Lifecycle state of a [`CaptureChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No queue and no pin configuration.
    Uninitialized,
    /// Pin and queue are set up, no handler is registered.
    Configured,
    /// The handler is registered and samples are being produced.
    Active,
}

/// Channel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct Config {
    pull: Pull,
    discard_first_cycle: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pull: Pull::Down,
            discard_first_cycle: cfg!(discard_first_cycle),
        }
    }
}

impl Config {
    /// Pull resistor applied when the line is configured.
    pub fn pull(&self) -> Pull {
        self.pull
    }

    /// Sets the pull resistor.
    pub fn with_pull(mut self, pull: Pull) -> Self {
        self.pull = pull;
        self
    }

    /// Whether the cycle completed without a preceding reference edge is
    /// suppressed after each [`CaptureChannel::start`].
    pub fn discard_first_cycle(&self) -> bool {
        self.discard_first_cycle
    }

    /// Sets whether the reference-less first cycle is suppressed. When
    /// disabled, the first sample after each start has meaningless `t0` and
    /// `duty` values.
    pub fn with_discard_first_cycle(mut self, discard: bool) -> Self {
        self.discard_first_cycle = discard;
        self
    }
}

/// A heap allocated queue with a stable address.
struct OwnedQueue(NonNull<SampleQueue>);

impl OwnedQueue {
    fn new(capacity: usize) -> Result<Self, crate::QueueError> {
        let queue = SampleQueue::try_new(capacity)?;
        Ok(Self(NonNull::from(Box::leak(Box::new(queue)))))
    }
}

impl Drop for OwnedQueue {
    fn drop(&mut self) {
        // SAFETY: allocated in `OwnedQueue::new`, and the handler that could
        // reference it is deregistered before the slot holding it is dropped.
        drop(unsafe { Box::from_raw(self.0.as_ptr()) });
    }
}

enum QueueSlot {
    Owned(OwnedQueue),
    Borrowed(&'static SampleQueue),
}

impl QueueSlot {
    fn as_ptr(&self) -> NonNull<SampleQueue> {
        match self {
            QueueSlot::Owned(queue) => queue.0,
            QueueSlot::Borrowed(queue) => NonNull::from(*queue),
        }
    }

    fn get(&self) -> &SampleQueue {
        // SAFETY: both variants point to a live queue for as long as the slot
        // exists.
        unsafe { self.as_ptr().as_ref() }
    }
}

/// Measures duty and period of the PWM signal on one line.
pub struct CaptureChannel<'d, C: EdgeController> {
    service: &'d DispatchService<C>,
    line: Line,
    label: &'static str,
    config: Config,
    state: State,
    queue: Option<QueueSlot>,
    // Shared with the interrupt handler while `Active`.
    context: NonNull<IsrContext>,
}

// SAFETY: the context and queue are only shared with the interrupt handler,
// which runs under the dispatch critical section.
unsafe impl<C: EdgeController + Sync> Send for CaptureChannel<'_, C> {}

impl<'d, C: EdgeController> CaptureChannel<'d, C> {
    /// Creates an unconfigured channel for `line`.
    ///
    /// `label` tags every log line of this channel.
    pub fn new(service: &'d DispatchService<C>, line: Line, label: &'static str) -> Self {
        let context = Box::new(IsrContext::new(line));
        Self {
            service,
            line,
            label,
            config: Config::default(),
            state: State::Uninitialized,
            queue: None,
            context: NonNull::from(Box::leak(context)),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Replaces the configuration of a channel that is not running.
    ///
    /// The pull setting takes effect on the next [`configure`](Self::configure),
    /// `discard_first_cycle` on the next [`start`](Self::start).
    pub fn apply_config(&mut self, config: &Config) -> Result<(), Error> {
        if self.state == State::Active {
            error!("{}: Failed to apply config, still started", self.label);
            return Err(Error::InvalidState);
        }
        self.config = *config;
        Ok(())
    }

    /// Configures the line and allocates a queue for `capacity` samples.
    ///
    /// Fails with [`Error::InvalidState`] unless the channel is
    /// uninitialized and the dispatch service is enabled, and with
    /// [`Error::Config`] if the queue or the pin can't be set up.
    pub fn configure(&mut self, capacity: usize) -> Result<(), Error> {
        self.check_configurable()?;

        let queue = OwnedQueue::new(capacity).map_err(|e| {
            error!("{}: Failed to create queue: {}", self.label, e);
            Error::Config
        })?;

        self.setup(QueueSlot::Owned(queue))
    }

    /// [`configure`](Self::configure) with [`DEFAULT_QUEUE_CAPACITY`].
    pub fn configure_default(&mut self) -> Result<(), Error> {
        self.configure(DEFAULT_QUEUE_CAPACITY)
    }

    /// Configures the line to publish into `queue`.
    ///
    /// The queue is never freed by the channel. Fails like
    /// [`configure`](Self::configure).
    pub fn configure_with_queue(&mut self, queue: &'static SampleQueue) -> Result<(), Error> {
        self.check_configurable()?;
        self.setup(QueueSlot::Borrowed(queue))
    }

    fn check_configurable(&self) -> Result<(), Error> {
        if self.state != State::Uninitialized || !self.service.is_installed() {
            error!(
                "{}: Trying to initialize: {}",
                self.label,
                if self.state != State::Uninitialized {
                    "Already initialized"
                } else {
                    "ISR service not initialized yet"
                }
            );
            return Err(Error::InvalidState);
        }
        Ok(())
    }

    fn setup(&mut self, queue: QueueSlot) -> Result<(), Error> {
        let controller = self.service.controller();
        let pin_config = PinConfig {
            pull: self.config.pull,
            event: Event::AnyEdge,
        };

        controller
            .reset_pin(self.line)
            .and_then(|_| controller.configure_pin(self.line, &pin_config))
            .map_err(|e| {
                error!("{}: Failed to init gpio: {:?}", self.label, Debug2Format(&e));
                Error::Config
            })?;

        // Replaces a queue kept attached by `deconfigure(false)`.
        self.queue = Some(queue);
        self.state = State::Configured;
        debug!("{}: Configured line {}", self.label, self.line.0);
        Ok(())
    }

    /// Resets the line and, if `release_queue` is set, lets go of the queue.
    ///
    /// Releasing frees an owned queue. A borrowed queue is cleared and
    /// detached instead, the caller keeps owning it. Without releasing, the
    /// queue stays readable through [`queue`](Self::queue) until the channel
    /// is configured again.
    ///
    /// Fails with [`Error::InvalidState`] unless the channel is configured
    /// and stopped, and with [`Error::Config`] if the pin can't be reset.
    pub fn deconfigure(&mut self, release_queue: bool) -> Result<(), Error> {
        match self.state {
            State::Configured => {}
            State::Uninitialized => {
                error!("{}: Failed to deinitialize, not initialized yet", self.label);
                return Err(Error::InvalidState);
            }
            State::Active => {
                error!("{}: Failed to deinitialize, still started", self.label);
                return Err(Error::InvalidState);
            }
        }

        self.service
            .controller()
            .reset_pin(self.line)
            .map_err(|e| {
                error!("{}: Failed to reset gpio pin: {:?}", self.label, Debug2Format(&e));
                Error::Config
            })?;

        if release_queue {
            // SAFETY: no handler is registered outside of `Active`.
            unsafe { self.context.as_mut() }.detach_queue();
            if let Some(QueueSlot::Borrowed(queue)) = self.queue.take() {
                queue.clear();
            }
        }

        self.state = State::Uninitialized;
        debug!("{}: Deconfigured line {}", self.label, self.line.0);
        Ok(())
    }

    /// Starts measuring.
    ///
    /// Each start begins a fresh measurement, edges seen before the last
    /// [`stop`](Self::stop) are forgotten. Fails with
    /// [`Error::InvalidState`] unless the channel is configured and stopped
    /// and the dispatch service is enabled, and with [`Error::Handler`] if the
    /// interrupt handler can't be registered.
    pub fn start(&mut self) -> Result<(), Error> {
        let queue = match (self.state, &self.queue) {
            (State::Configured, Some(queue)) => queue.as_ptr(),
            _ => {
                error!(
                    "{}: Trying to start: {}",
                    self.label,
                    if self.state == State::Active {
                        "Already started"
                    } else {
                        "Not initialized yet"
                    }
                );
                return Err(Error::InvalidState);
            }
        };

        // SAFETY: no handler is registered outside of `Active`.
        unsafe { self.context.as_mut() }.arm(queue, self.config.discard_first_cycle);

        // SAFETY: the context outlives the registration: it is only freed
        // after a successful `stop`, or leaked.
        unsafe {
            self.service
                .add_handler(self.line, on_edge_interrupt, self.context.cast())
        }
        .map_err(|e| {
            error!("{}: Failed to add gpio isr handler: {}", self.label, e);
            registration_error(e)
        })?;

        self.state = State::Active;
        debug!("{}: Started", self.label);
        Ok(())
    }

    /// Stops measuring.
    ///
    /// Once this returns `Ok`, the handler won't run again until the next
    /// [`start`](Self::start). Fails with [`Error::InvalidState`] unless the
    /// channel is active, and with [`Error::Handler`] if the interrupt
    /// handler can't be removed.
    pub fn stop(&mut self) -> Result<(), Error> {
        if self.state != State::Active {
            error!("{}: Failed to stop, not started yet", self.label);
            return Err(Error::InvalidState);
        }

        self.service.remove_handler(self.line).map_err(|e| {
            error!("{}: Failed to remove gpio isr handler: {}", self.label, e);
            registration_error(e)
        })?;

        self.state = State::Configured;
        debug!("{}: Stopped", self.label);
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns `true` if the channel is configured, stopped or not.
    pub fn is_configured(&self) -> bool {
        self.state != State::Uninitialized
    }

    /// Returns `true` if the channel is active.
    pub fn is_started(&self) -> bool {
        self.state == State::Active
    }

    /// Returns `true` if the attached queue was allocated by the channel.
    pub fn owns_queue(&self) -> bool {
        matches!(self.queue, Some(QueueSlot::Owned(_)))
    }

    /// The monitored line.
    pub fn line(&self) -> Line {
        self.line
    }

    /// The label used in log messages.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// The current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The queue samples are published to, if one is attached.
    pub fn queue(&self) -> Option<&SampleQueue> {
        self.queue.as_ref().map(QueueSlot::get)
    }
}

// Sequencing errors from the dispatch service are reported as such, anything
// else is a registration failure.
fn registration_error(e: Error) -> Error {
    match e {
        Error::InvalidState => Error::InvalidState,
        _ => Error::Handler,
    }
}

impl<C: EdgeController> Drop for CaptureChannel<'_, C> {
    fn drop(&mut self) {
        if self.state == State::Active && self.stop().is_err() {
            // The handler may still run: keep everything it points to alive.
            error!("{}: Handler still registered, leaking its context", self.label);
            core::mem::forget(self.queue.take());
            return;
        }

        if self.state == State::Configured {
            let release = self.owns_queue();
            // Logged by `deconfigure`. The queue slot is freed below anyway.
            let _ = self.deconfigure(release);
        }

        // SAFETY: allocated in `new`, and no handler references it anymore.
        drop(unsafe { Box::from_raw(self.context.as_ptr()) });
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use crate::{mock::MockController, Duration, Instant, Level, Sample};

    const LINE: Line = Line(4);

    fn static_queue(capacity: usize) -> &'static SampleQueue {
        Box::leak(Box::new(SampleQueue::new(capacity)))
    }

    fn enabled(mock: &MockController) -> DispatchService<&MockController> {
        let service = DispatchService::new(mock);
        service.enable().unwrap();
        service
    }

    fn drain<C: EdgeController>(channel: &CaptureChannel<'_, C>) -> Vec<Sample> {
        channel.queue().map(|q| q.drain().collect()).unwrap_or_default()
    }

    #[test]
    fn measures_pwm_after_discarding_first_cycle() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");

        channel.configure(8).unwrap();
        channel.start().unwrap();
        mock.pwm(&service, LINE, 0, 1000, 3000, 5);

        let samples = drain(&channel);
        assert_eq!(samples.len(), 4);
        for s in samples {
            assert_eq!(s.duty, Duration::from_ticks(1000));
            assert_eq!(s.period, Duration::from_ticks(3000));
            assert_eq!(s.line, LINE);
        }

        channel.stop().unwrap();
        channel.deconfigure(true).unwrap();
        assert_eq!(channel.state(), State::Uninitialized);
    }

    #[test]
    fn pin_is_configured_as_requested() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4")
            .with_config(Config::default().with_pull(Pull::Up));

        channel.configure_default().unwrap();
        let pin = mock.with(|m| m.configured.get(&LINE.0).copied());
        assert_eq!(
            pin,
            Some(PinConfig {
                pull: Pull::Up,
                event: Event::AnyEdge
            })
        );
        assert_eq!(
            channel.queue().map(SampleQueue::capacity),
            Some(DEFAULT_QUEUE_CAPACITY)
        );
        assert!(channel.owns_queue());
    }

    #[test]
    fn start_twice_fails_and_stays_active() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
        channel.configure(4).unwrap();

        assert_eq!(channel.start(), Ok(()));
        assert_eq!(channel.start(), Err(Error::InvalidState));
        assert_eq!(channel.state(), State::Active);
        assert_eq!(service.registered_handlers(), 1);
    }

    #[test]
    fn start_requires_configuration() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");

        assert_eq!(channel.start(), Err(Error::InvalidState));
        assert_eq!(channel.state(), State::Uninitialized);
        assert_eq!(service.registered_handlers(), 0);
    }

    #[test]
    fn stop_requires_active_channel() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");

        assert_eq!(channel.stop(), Err(Error::InvalidState));
        assert_eq!(channel.state(), State::Uninitialized);

        channel.configure(4).unwrap();
        assert_eq!(channel.stop(), Err(Error::InvalidState));

        channel.start().unwrap();
        assert_eq!(channel.stop(), Ok(()));
        assert_eq!(channel.stop(), Err(Error::InvalidState));
        assert_eq!(channel.state(), State::Configured);
    }

    #[test]
    fn configure_requires_enabled_service() {
        let mock = MockController::new();
        let service = DispatchService::new(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");

        assert_eq!(channel.configure(4), Err(Error::InvalidState));
        assert_eq!(
            channel.configure_with_queue(static_queue(4)),
            Err(Error::InvalidState)
        );
        assert_eq!(channel.state(), State::Uninitialized);
        assert!(channel.queue().is_none());
        assert!(mock.with(|m| m.configured.is_empty() && m.resets.is_empty()));
    }

    #[test]
    fn configure_twice_fails() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");

        channel.configure(4).unwrap();
        assert_eq!(channel.configure(4), Err(Error::InvalidState));
        assert_eq!(channel.queue().map(SampleQueue::capacity), Some(4));
    }

    #[test]
    fn failed_configure_leaves_channel_uninitialized() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");

        assert_eq!(channel.configure(0), Err(Error::Config));
        assert!(mock.with(|m| m.resets.is_empty()));

        mock.with(|m| m.fail_configure = true);
        assert_eq!(channel.configure(4), Err(Error::Config));
        assert_eq!(channel.state(), State::Uninitialized);
        assert!(channel.queue().is_none());

        mock.with(|m| m.fail_configure = false);
        assert_eq!(channel.configure(4), Ok(()));
    }

    #[test]
    fn failed_start_leaves_channel_configured() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
        channel.configure(4).unwrap();

        mock.with(|m| m.fail_listen = true);
        assert_eq!(channel.start(), Err(Error::Handler));
        assert_eq!(channel.state(), State::Configured);

        mock.with(|m| m.fail_listen = false);
        assert_eq!(channel.start(), Ok(()));
    }

    #[test]
    fn start_after_service_disabled_is_invalid_state() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
        channel.configure(4).unwrap();

        service.disable().unwrap();
        assert_eq!(channel.start(), Err(Error::InvalidState));
        assert_eq!(channel.state(), State::Configured);
        assert!(mock.with(|m| !m.listening.contains(&LINE.0)));

        service.enable().unwrap();
        assert_eq!(channel.start(), Ok(()));
    }

    #[test]
    fn failed_stop_leaves_channel_active() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
        channel.configure(4).unwrap();
        channel.start().unwrap();

        mock.with(|m| m.fail_unlisten = true);
        assert_eq!(channel.stop(), Err(Error::Handler));
        assert!(channel.is_started());

        mock.with(|m| m.fail_unlisten = false);
        assert_eq!(channel.stop(), Ok(()));
    }

    #[test]
    fn deconfigure_requires_stopped_channel() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");

        assert_eq!(channel.deconfigure(true), Err(Error::InvalidState));

        channel.configure(4).unwrap();
        channel.start().unwrap();
        assert_eq!(channel.deconfigure(true), Err(Error::InvalidState));
        assert_eq!(channel.state(), State::Active);
    }

    #[test]
    fn failed_pin_reset_keeps_channel_configured() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
        channel.configure(4).unwrap();

        mock.with(|m| m.fail_reset = true);
        assert_eq!(channel.deconfigure(true), Err(Error::Config));
        assert_eq!(channel.state(), State::Configured);
        assert!(channel.queue().is_some());

        mock.with(|m| m.fail_reset = false);
    }

    #[test]
    fn kept_queue_stays_readable() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
        channel.configure(8).unwrap();
        channel.start().unwrap();
        mock.pwm(&service, LINE, 0, 250, 1000, 3);
        channel.stop().unwrap();

        channel.deconfigure(false).unwrap();
        assert_eq!(drain(&channel).len(), 2);

        // Configuring again replaces the kept queue.
        channel.configure(2).unwrap();
        assert_eq!(channel.queue().map(SampleQueue::capacity), Some(2));
    }

    #[test]
    fn releasing_borrowed_queue_clears_and_detaches() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let queue = static_queue(8);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
        channel.configure_with_queue(queue).unwrap();
        assert!(!channel.owns_queue());

        channel.start().unwrap();
        mock.pwm(&service, LINE, 0, 250, 1000, 3);
        channel.stop().unwrap();
        assert!(!queue.is_empty());

        channel.deconfigure(true).unwrap();
        assert!(queue.is_empty());
        assert!(channel.queue().is_none());
    }

    #[test]
    fn edges_while_stopped_are_ignored_and_restart_rearms() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let queue = static_queue(16);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
        channel.configure_with_queue(queue).unwrap();

        channel.start().unwrap();
        mock.pwm(&service, LINE, 0, 1000, 3000, 3);
        channel.stop().unwrap();
        mock.pwm(&service, LINE, 9000, 1000, 3000, 3);
        assert_eq!(queue.drain().count(), 2);

        // A different signal after restart: the cycle spanning the pause is
        // discarded, not reported with a bogus period.
        channel.start().unwrap();
        mock.pwm(&service, LINE, 100_000, 200, 500, 4);
        let samples: Vec<Sample> = queue.drain().collect();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].t0, Instant::from_ticks(100_000));
        assert!(samples.iter().all(|s| s.period == Duration::from_ticks(500)));
    }

    #[test]
    fn overflow_drops_newest_samples() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let queue = static_queue(3);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
        channel.configure_with_queue(queue).unwrap();
        channel.start().unwrap();

        mock.pwm(&service, LINE, 0, 1000, 3000, 10);

        assert_eq!(queue.dropped(), 6);
        let t0: Vec<u64> = queue.drain().map(|s| s.t0.ticks()).collect();
        assert_eq!(t0, [0, 3000, 6000]);
    }

    #[test]
    fn faithful_mode_publishes_first_cycle() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4")
            .with_config(Config::default().with_discard_first_cycle(false));
        channel.configure(8).unwrap();
        channel.start().unwrap();

        mock.pwm(&service, LINE, 0, 1000, 3000, 5);
        assert_eq!(drain(&channel).len(), 5);
    }

    #[test]
    fn config_cannot_change_while_active() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
        channel.configure(4).unwrap();
        channel.start().unwrap();

        let config = Config::default().with_pull(Pull::None);
        assert_eq!(channel.apply_config(&config), Err(Error::InvalidState));
        channel.stop().unwrap();
        assert_eq!(channel.apply_config(&config), Ok(()));
        assert_eq!(channel.config().pull(), Pull::None);
    }

    #[test]
    fn independent_channels_share_the_service() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut a = CaptureChannel::new(&service, Line(4), "a");
        let mut b = CaptureChannel::new(&service, Line(5), "b");
        a.configure(8).unwrap();
        b.configure(8).unwrap();
        a.start().unwrap();
        b.start().unwrap();

        mock.pwm(&service, Line(4), 0, 100, 1000, 3);
        mock.pwm(&service, Line(5), 0, 700, 1000, 4);

        let sa = drain(&a);
        let sb = drain(&b);
        assert_eq!(sa.len(), 2);
        assert_eq!(sb.len(), 3);
        assert!(sa.iter().all(|s| s.line == Line(4) && s.duty.ticks() == 100));
        assert!(sb.iter().all(|s| s.line == Line(5) && s.duty.ticks() == 700));
    }

    #[test]
    fn dropping_active_channel_stops_and_deconfigures() {
        let mock = MockController::new();
        let service = enabled(&mock);
        {
            let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
            channel.configure(4).unwrap();
            channel.start().unwrap();
        }

        assert_eq!(service.registered_handlers(), 0);
        assert!(mock.with(|m| !m.listening.contains(&LINE.0)));
        assert!(mock.with(|m| !m.configured.contains_key(&LINE.0)));
        assert_eq!(service.disable(), Ok(()));
    }

    #[test]
    fn dropping_channel_leaves_borrowed_queue_intact() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let queue = static_queue(8);
        {
            let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
            channel.configure_with_queue(queue).unwrap();
            channel.start().unwrap();
            mock.pwm(&service, LINE, 0, 250, 1000, 3);
        }

        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn dropping_channel_with_stuck_handler_keeps_context_alive() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let queue = static_queue(8);
        {
            let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
            channel.configure_with_queue(queue).unwrap();
            channel.start().unwrap();
            mock.with(|m| m.fail_unlisten = true);
        }

        // The handler is still registered and must still find valid memory.
        assert_eq!(service.registered_handlers(), 1);
        mock.pwm(&service, LINE, 0, 250, 1000, 3);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn disable_refuses_while_a_channel_is_active() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
        channel.configure(4).unwrap();
        channel.start().unwrap();

        assert_eq!(service.disable(), Err(Error::InvalidState));
        channel.stop().unwrap();
        assert_eq!(service.disable(), Ok(()));
    }

    #[test]
    fn consumer_can_await_samples() {
        let mock = MockController::new();
        let service = enabled(&mock);
        let queue = static_queue(4);
        let mut channel = CaptureChannel::new(&service, LINE, "pwm4");
        channel.configure_with_queue(queue).unwrap();
        channel.start().unwrap();

        mock.edge(&service, LINE, Level::High, 0);
        mock.edge(&service, LINE, Level::Low, 400);
        mock.edge(&service, LINE, Level::High, 1000);
        mock.edge(&service, LINE, Level::Low, 1400);
        mock.edge(&service, LINE, Level::High, 2000);

        let sample = embassy_futures::block_on(queue.receive());
        assert_eq!(sample.t0, Instant::from_ticks(0));
        assert_eq!(sample.duty, Duration::from_ticks(400));
        assert_eq!(sample.period, Duration::from_ticks(1000));
    }
}
