//! Measurement records and the primitive types they are built from.

/// Timestamp with microsecond resolution.
pub type Instant = fugit::TimerInstantU64<1_000_000>;

/// Duration with microsecond resolution.
pub type Duration = fugit::MicrosDurationU64;

pub(crate) const ZERO: Duration = Duration::from_ticks(0);

/// A monitored digital input, identified by its GPIO number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Line(pub u8);

impl Line {
    /// The GPIO number of this line.
    #[inline]
    pub const fn number(self) -> u8 {
        self.0
    }
}

impl From<u8> for Line {
    fn from(number: u8) -> Self {
        Self(number)
    }
}

/// Logic level of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// Low
    Low,
    /// High
    High,
}

impl core::ops::Not for Level {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Self::High
        } else {
            Self::Low
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> bool {
        level == Level::High
    }
}

/// A logic-level transition as seen by an interrupt handler.
///
/// `level` is sampled first, `timestamp` immediately after.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Edge {
    /// Level of the line after the transition.
    pub level: Level,
    /// When the transition was observed.
    pub timestamp: Instant,
}

/// One fully measured PWM cycle.
///
/// A cycle starts on a rising edge at `t0`, stays high for `duty` and ends on
/// the next rising edge, `period` after `t0`. In the absence of missed edges
/// `duty <= period` holds, but this is not enforced.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    /// Start of the high phase.
    pub t0: Instant,
    /// Length of the high phase.
    pub duty: Duration,
    /// Rising edge to rising edge.
    pub period: Duration,
    /// The line the cycle was measured on.
    pub line: Line,
}

impl Sample {
    pub(crate) const fn empty(line: Line) -> Self {
        Self {
            t0: Instant::from_ticks(0),
            duty: ZERO,
            period: ZERO,
            line,
        }
    }

    /// Length of the low phase, `period - duty`, or zero if an edge was
    /// missed and `duty` exceeds `period`.
    pub fn low_time(&self) -> Duration {
        self.period.checked_sub(self.duty).unwrap_or(ZERO)
    }

    /// Duty cycle in per-mille of the period. Returns 0 for a zero period.
    pub fn duty_permille(&self) -> u32 {
        let period = self.period.ticks();
        if period == 0 {
            return 0;
        }
        (self.duty.ticks().saturating_mul(1000) / period) as u32
    }

    /// Signal frequency in millihertz. Returns 0 for a zero period.
    pub fn frequency_millihertz(&self) -> u64 {
        match self.period.ticks() {
            0 => 0,
            period => 1_000_000_000 / period,
        }
    }
}
