//! In-memory GPIO peripheral for host tests.

extern crate std;

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
    vec::Vec,
};

use crate::{
    controller::{EdgeController, Event, PinConfig},
    DispatchService,
    Instant,
    Level,
    Line,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockError {
    Rejected,
}

#[derive(Debug)]
pub(crate) struct MockState {
    pub installed: bool,
    pub installs: usize,
    pub levels: BTreeMap<u8, Level>,
    pub now: Instant,
    pub configured: BTreeMap<u8, PinConfig>,
    pub listening: BTreeSet<u8>,
    pub resets: Vec<u8>,
    pub fail_install: bool,
    pub fail_configure: bool,
    pub fail_reset: bool,
    pub fail_listen: bool,
    pub fail_unlisten: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            installed: false,
            installs: 0,
            levels: BTreeMap::new(),
            now: Instant::from_ticks(0),
            configured: BTreeMap::new(),
            listening: BTreeSet::new(),
            resets: Vec::new(),
            fail_install: false,
            fail_configure: false,
            fail_reset: false,
            fail_listen: false,
            fail_unlisten: false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct MockController {
    state: Mutex<MockState>,
}

impl MockController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Drives `line` to `level`, `at` microseconds after boot.
    pub fn set(&self, line: Line, level: Level, at: u64) {
        self.with(|m| {
            m.levels.insert(line.0, level);
            m.now = Instant::from_ticks(at);
        });
    }

    /// Drives `line` and raises its interrupt if it is listening.
    pub fn edge<C: EdgeController>(
        &self,
        service: &DispatchService<C>,
        line: Line,
        level: Level,
        at: u64,
    ) {
        self.set(line, level, at);
        if self.with(|m| m.listening.contains(&line.0)) {
            service.handle_interrupt(line);
        }
    }

    /// A full PWM signal: `cycles` times high for `duty` then low until
    /// `period`, first rising edge at `start`.
    pub fn pwm<C: EdgeController>(
        &self,
        service: &DispatchService<C>,
        line: Line,
        start: u64,
        duty: u64,
        period: u64,
        cycles: u64,
    ) {
        for n in 0..cycles {
            let rise = start + n * period;
            self.edge(service, line, Level::High, rise);
            self.edge(service, line, Level::Low, rise + duty);
        }
    }
}

fn check(fail: bool) -> Result<(), MockError> {
    if fail {
        Err(MockError::Rejected)
    } else {
        Ok(())
    }
}

impl EdgeController for MockController {
    type Error = MockError;

    fn install(&self) -> Result<(), MockError> {
        self.with(|m| {
            check(m.fail_install)?;
            m.installed = true;
            m.installs += 1;
            Ok(())
        })
    }

    fn uninstall(&self) -> Result<(), MockError> {
        self.with(|m| {
            m.installed = false;
            Ok(())
        })
    }

    fn configure_pin(&self, line: Line, config: &PinConfig) -> Result<(), MockError> {
        self.with(|m| {
            check(m.fail_configure)?;
            m.configured.insert(line.0, *config);
            Ok(())
        })
    }

    fn reset_pin(&self, line: Line) -> Result<(), MockError> {
        self.with(|m| {
            check(m.fail_reset)?;
            m.configured.remove(&line.0);
            m.resets.push(line.0);
            Ok(())
        })
    }

    fn listen(&self, line: Line, _event: Event) -> Result<(), MockError> {
        self.with(|m| {
            check(m.fail_listen)?;
            m.listening.insert(line.0);
            Ok(())
        })
    }

    fn unlisten(&self, line: Line) -> Result<(), MockError> {
        self.with(|m| {
            check(m.fail_unlisten)?;
            m.listening.remove(&line.0);
            Ok(())
        })
    }

    fn level(&self, line: Line) -> Level {
        self.with(|m| m.levels.get(&line.0).copied().unwrap_or(Level::Low))
    }

    fn now(&self) -> Instant {
        self.with(|m| m.now)
    }
}
