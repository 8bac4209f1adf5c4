//! # PWM capture
//!
//! ## Overview
//! Measures the duty cycle and period of PWM signals on GPIO inputs by
//! timestamping every logic-level transition in the GPIO interrupt.
//!
//! Each monitored line is a [`CaptureChannel`]. Channels publish one
//! [`Sample`] per completed cycle (rising edge to rising edge) to a bounded
//! [`SampleQueue`], which the application drains by polling or awaiting.
//! All channels share one [`DispatchService`], which owns the GPIO interrupt
//! and routes transitions to the channel of each line.
//!
//! The hardware is reached through the [`EdgeController`] trait. With the
//! `esp-hal` feature, [`esp::DISPATCH`] provides a ready-made service for
//! the ESP32 family.
//!
//! ## Example
//!
//! ```rust,ignore
//! use esp_pwm_capture::{esp::DISPATCH, CaptureChannel, Line};
//!
//! DISPATCH.enable().unwrap();
//!
//! let mut fan = CaptureChannel::new(&DISPATCH, Line(4), "fan");
//! fan.configure(8).unwrap();
//! fan.start().unwrap();
//!
//! loop {
//!     let sample = fan.queue().unwrap().receive().await;
//!     println!("{}‰ at {} mHz", sample.duty_permille(), sample.frequency_millihertz());
//! }
//! ```
//!
//! ## Feature Flags
#![doc = document_features::document_features!()]
#![doc(html_logo_url = "https://avatars.githubusercontent.com/u/46717278")]
#![deny(missing_docs)]
#![no_std]

extern crate alloc;

// MUST be the first module
mod fmt;

mod capture;
mod channel;
mod controller;
mod dispatch;
#[cfg(feature = "esp-hal")]
pub mod esp;
#[cfg(test)]
mod mock;
mod queue;
mod sample;

pub use self::{
    channel::{CaptureChannel, Config, State, DEFAULT_QUEUE_CAPACITY},
    controller::{EdgeController, Event, PinConfig, Pull},
    dispatch::{DispatchService, EdgeHandler, MAX_LINES},
    queue::{Drain, QueueError, SampleQueue},
    sample::{Duration, Edge, Instant, Level, Line, Sample},
};

/// Errors returned by the dispatch service and capture channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The operation is not allowed in the current state, e.g. starting a
    /// channel twice or configuring it before the dispatch service is
    /// enabled.
    InvalidState,
    /// The pin or the queue could not be set up.
    Config,
    /// The interrupt handler could not be registered or removed.
    Handler,
    /// The dispatch service is already enabled.
    AlreadyInstalled,
    /// The dispatch service is not enabled.
    NotInstalled,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidState => write!(f, "Invalid state"),
            Error::Config => write!(f, "Pin or queue configuration failed"),
            Error::Handler => write!(f, "Interrupt handler registration failed"),
            Error::AlreadyInstalled => write!(f, "Dispatch service already installed"),
            Error::NotInstalled => write!(f, "Dispatch service not installed"),
        }
    }
}

impl core::error::Error for Error {}
