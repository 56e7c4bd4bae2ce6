//! ESP32-S3 firmware modules for the stpms tire pressure beacon
//!
//! This crate holds the code that only builds for the target: peripheral
//! bring-up, the BLE advertiser, light sleep, the watchdog, reset handling
//! and the retained block's place in RTC memory. Everything it builds is
//! handed to the `stpms_core` duty cycle.

#![no_std]

pub mod board;
pub mod retained;
pub mod settings;
