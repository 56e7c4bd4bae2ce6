//! Register-level transport between the sensor driver and the bus.
//!
//! The driver never talks to a HAL directly. It issues single-register reads
//! and writes through [`Transport`], so the same driver runs over I2C or SPI.

use embedded_hal::i2c::{self, I2c, SevenBitAddress};
use embedded_hal::spi::{self, Operation, SpiDevice};
use log::error;
use thiserror_no_std::Error;

/// 7-bit I2C address of the ILPS22QS.
pub const DEFAULT_I2C_ADDRESS: SevenBitAddress = 0x5C;

/// Set on the register byte of an SPI read.
const SPI_READ_FLAG: u8 = 0x80;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("peripheral did not acknowledge")]
    Nack,
    #[error("bus error")]
    Bus,
    #[error("transfer timed out")]
    Timeout,
    #[error("transport is not ready")]
    NotReady,
}

/// Register access the sensor driver needs from a bus.
pub trait Transport {
    /// Reads `buffer.len()` bytes starting at `register`.
    fn read(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), TransportError>;

    /// Writes one byte to `register`.
    fn write(&mut self, register: u8, value: u8) -> Result<(), TransportError>;

    /// Reports whether the transport is usable before the first transfer.
    fn check(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), TransportError> {
        T::read(self, register, buffer)
    }

    fn write(&mut self, register: u8, value: u8) -> Result<(), TransportError> {
        T::write(self, register, value)
    }

    fn check(&self) -> Result<(), TransportError> {
        T::check(self)
    }
}

// embedded-hal has no timeout kind; HALs report bus timeouts as `Other`.
fn map_i2c_error<E: i2c::Error>(error: E) -> TransportError {
    match error.kind() {
        i2c::ErrorKind::NoAcknowledge(_) => TransportError::Nack,
        i2c::ErrorKind::Bus | i2c::ErrorKind::ArbitrationLoss | i2c::ErrorKind::Overrun => {
            TransportError::Bus
        }
        _ => TransportError::Timeout,
    }
}

fn map_spi_error<E: spi::Error>(error: E) -> TransportError {
    match error.kind() {
        spi::ErrorKind::Other => TransportError::Timeout,
        _ => TransportError::Bus,
    }
}

/// ILPS22QS over a blocking I2C bus.
pub struct I2cTransport<I> {
    i2c: I,
    address: SevenBitAddress,
}

impl<I: I2c> I2cTransport<I> {
    pub fn new(i2c: I) -> Self {
        Self::with_address(i2c, DEFAULT_I2C_ADDRESS)
    }

    pub fn with_address(i2c: I, address: SevenBitAddress) -> Self {
        Self { i2c, address }
    }

    pub fn bus(&self) -> &I {
        &self.i2c
    }

    /// Gives the bus back, e.g. to power it down across a sleep.
    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: I2c> Transport for I2cTransport<I> {
    fn read(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), TransportError> {
        self.i2c
            .write_read(self.address, &[register], buffer)
            .map_err(|e| {
                let mapped = map_i2c_error(e);
                error!("I2C read of {:#04x} failed: {}", register, mapped);
                mapped
            })
    }

    fn write(&mut self, register: u8, value: u8) -> Result<(), TransportError> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(|e| {
                let mapped = map_i2c_error(e);
                error!("I2C write of {:#04x} failed: {}", register, mapped);
                mapped
            })
    }
}

/// ILPS22QS over a blocking SPI device (4-wire, chip select handled by the device).
pub struct SpiTransport<S> {
    spi: S,
}

impl<S: SpiDevice> SpiTransport<S> {
    pub fn new(spi: S) -> Self {
        Self { spi }
    }

    pub fn release(self) -> S {
        self.spi
    }
}

impl<S: SpiDevice> Transport for SpiTransport<S> {
    fn read(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), TransportError> {
        self.spi
            .transaction(&mut [
                Operation::Write(&[register | SPI_READ_FLAG]),
                Operation::Read(buffer),
            ])
            .map_err(|e| {
                let mapped = map_spi_error(e);
                error!("SPI read of {:#04x} failed: {}", register, mapped);
                mapped
            })
    }

    fn write(&mut self, register: u8, value: u8) -> Result<(), TransportError> {
        self.spi
            .write(&[register & !SPI_READ_FLAG, value])
            .map_err(|e| {
                let mapped = map_spi_error(e);
                error!("SPI write of {:#04x} failed: {}", register, mapped);
                mapped
            })
    }
}
