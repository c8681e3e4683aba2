//! Control core for a dual-input solar MPPT battery charge controller.
//!
//! Regulates two output bucks with PID loops, tracks the maximum power point of
//! two PV inputs by perturb-and-observe, and arbitrates CC/CV battery charging.
//! A cooperative scheduler runs the fast PID cadence and the slow MPPT cadence
//! from timer-raised flags under watchdog supervision.
//!
//! The crate is `no_std`. Peripherals are reached through the traits in [`hal`];
//! adapters over `embedded-hal` PWM and GPIO are provided. Optional features:
//! `async` (async poll mirror) and `defmt` (logging and `Format` derives).

#![no_std]

#[macro_use]
mod fmt;

pub mod battery;
pub mod calibration;
pub mod config;
pub mod control;
pub mod data_types;
pub mod error;
pub mod hal;
pub mod latch;
pub mod mppt;
pub mod pid;
pub mod scheduler;
pub mod watchdog;

pub use battery::Battery;
pub use config::CoreConfig;
pub use control::ControlCore;
pub use error::{Error, Fault};
pub use mppt::MpptTracker;
pub use pid::PidController;
pub use scheduler::{ActivationFlags, Activity, Hardware, PassOutcome, Scheduler};
