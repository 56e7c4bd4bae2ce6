mod ilps22qs;
pub mod registers;

pub use ilps22qs::*;

use embedded_hal::delay::DelayNs;
use thiserror_no_std::Error;

use crate::transport::TransportError;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("transport failed: {0}")]
    Transport(TransportError),
    #[error("unexpected device id {found:#04x}")]
    UnexpectedDevice { found: u8 },
    #[error("sensor did not respond in time")]
    Timeout,
    #[error("interface not ready")]
    Interface,
    #[error("board hook failed")]
    BoardHook,
    #[error("register {register:#04x} holds reserved value {value:#04x}")]
    InvalidRegister { register: u8, value: u8 },
}

impl From<TransportError> for SensorError {
    fn from(value: TransportError) -> Self {
        SensorError::Transport(value)
    }
}

/// Trait for the pressure sensor as the duty cycle drives it.
///
/// The duty cycle triggers one conversion, waits for it with a bounded
/// number of polls, then reads both channels separately so it can tell a
/// partial sample from a failed one.
pub trait PressureSensor {
    /// Starts a single conversion.
    fn trigger(&mut self) -> Result<(), SensorError>;

    /// Waits until both channels hold fresh data, giving up after `max_polls`.
    fn wait_ready(&mut self, max_polls: u16) -> Result<(), SensorError>;

    /// Pressure in whole millibar.
    fn read_pressure(&mut self) -> Result<u16, SensorError>;

    /// Temperature in hundredths of a degree in the configured scale.
    fn read_temperature(&mut self) -> Result<i16, SensorError>;
}

/// Millisecond tick source used to bound busy waits.
pub trait TickSource {
    fn now_ms(&self) -> u32;
}

/// No tick source; waits are bounded by the caller instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTicks;

impl TickSource for NoTicks {
    fn now_ms(&self) -> u32 {
        0
    }
}

/// Delay that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Board-level power hooks run around the sensor's lifetime, e.g. driving
/// the supply or chip-select pin.
pub trait BoardHooks {
    fn power_up(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
}

impl BoardHooks for () {}
