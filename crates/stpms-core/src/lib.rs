//! Hardware-independent core library for the stpms tire pressure beacon
//!
//! This crate contains all platform-agnostic logic for the beacon: the
//! ILPS22QS pressure sensor driver, the register transports it runs over,
//! the reset-surviving state block, the broadcast payload, the advertising
//! frame builder and the Measure/Advertise/Sleep duty cycle.
//!
//! It is `#![no_std]` so it compiles on both the ESP32-S3 target and desktop
//! hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

pub mod advertising;
pub mod battery;
pub mod build_info;
pub mod collaborators;
pub mod config;
pub mod duty_cycle;
pub mod fault;
pub mod reading;
pub mod retained;
pub mod sensors;
pub mod signals;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use duty_cycle::{DutyCycle, State};
pub use fault::Fatal;
pub use reading::{ErrorFlags, Reading, ReadingAggregator};
pub use retained::{BootReport, ResetReason, RetainedState, RetainedStore};
