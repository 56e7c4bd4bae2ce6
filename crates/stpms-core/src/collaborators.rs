//! Platform services the duty cycle drives.
//!
//! The firmware implements these on ESP32-S3 peripherals, the simulator on
//! host threads and the tests on recording fakes.

use thiserror_no_std::Error;

use crate::advertising::AdvertisingError;
use crate::retained::ResetReason;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    #[error("controller rejected the request")]
    Rejected,
    #[error("controller is busy")]
    Busy,
    #[error("advertising did not complete in time")]
    Timeout,
    #[error("advertising data could not be encoded: {0}")]
    Encoding(AdvertisingError),
}

impl From<AdvertisingError> for RadioError {
    fn from(value: AdvertisingError) -> Self {
        RadioError::Encoding(value)
    }
}

/// Broadcast-only radio.
pub trait Radio {
    /// Starts a burst of advertising events carrying `payload`.
    fn start_advertising(&mut self, payload: &[u8]) -> Result<(), RadioError>;

    /// Reports, once, that the burst started by the last call has finished.
    fn is_advertise_complete(&mut self) -> bool;
}

/// Low-power timer that wakes the processor after the measure period.
pub trait WakeTimer {
    fn arm(&mut self, period_secs: u16);

    /// Returns `true` once per expiry and clears the flag.
    fn consume_wake_flag(&mut self) -> bool;
}

/// Expiry of an armed wake timer on a free-running microsecond clock.
///
/// Sleeps interrupted by something other than the timer resume with the
/// time left instead of a whole period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeDeadline {
    at_us: u64,
}

impl WakeDeadline {
    pub const fn after(now_us: u64, period_secs: u16) -> Self {
        Self {
            at_us: now_us.saturating_add(period_secs as u64 * 1_000_000),
        }
    }

    /// Microseconds left to sleep, `None` once the deadline has passed.
    pub const fn remaining_us(&self, now_us: u64) -> Option<u64> {
        if now_us >= self.at_us {
            None
        } else {
            Some(self.at_us - now_us)
        }
    }
}

pub trait Watchdog {
    fn feed(&mut self);
}

pub trait PowerControl {
    /// Suspends the processor until any event or interrupt.
    fn wait_for_event(&mut self);
}

pub trait SystemReset {
    fn reboot(&mut self, reason: ResetReason) -> !;
}

/// Everything the duty cycle drives, owned by it for its lifetime.
pub struct Collaborators<S, B, R, T, W, P, D> {
    pub sensor: S,
    pub battery: B,
    pub radio: R,
    pub timer: T,
    pub watchdog: W,
    pub power: P,
    /// Delay between polls.
    pub delay: D,
}
