//! Fakes shared by the unit tests.

use core::cell::Cell;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{self, I2c, NoAcknowledgeSource, SevenBitAddress};
use embedded_hal::spi::{self, Operation as SpiOperation, SpiDevice};
use heapless::LinearMap;

use crate::battery::BatteryMonitor;
use crate::build_info::{AppIdentity, BuildInfo};
use crate::collaborators::{PowerControl, Radio, RadioError, SystemReset, WakeTimer, Watchdog};
use crate::retained::ResetReason;
use crate::sensors::{PressureSensor, SensorError, TickSource};
use crate::transport::{DEFAULT_I2C_ADDRESS, Transport, TransportError};

pub const TEST_BUILD: BuildInfo<'static> = BuildInfo {
    app: AppIdentity::Name("stpms"),
    version: "v1.2.3",
    hardware_revision: "TPMS1",
    flags: "test",
};

/// Register file behind the [`Transport`] trait. Unset registers read as zero.
pub struct FakeRegisters {
    regs: LinearMap<u8, u8, 64>,
    writes: Vec<(u8, u8)>,
    reads: Vec<u8>,
    write_error: Option<TransportError>,
    not_ready: bool,
}

impl FakeRegisters {
    pub fn new() -> Self {
        Self {
            regs: LinearMap::new(),
            writes: Vec::new(),
            reads: Vec::new(),
            write_error: None,
            not_ready: false,
        }
    }

    pub fn set(&mut self, register: u8, value: u8) {
        self.regs.insert(register, value).unwrap();
    }

    /// Sets consecutive registers starting at `first`.
    pub fn set_many(&mut self, first: u8, values: &[u8]) {
        for (offset, value) in values.iter().enumerate() {
            self.set(first + offset as u8, *value);
        }
    }

    pub fn get(&self, register: u8) -> u8 {
        self.regs.get(&register).copied().unwrap_or(0)
    }

    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    pub fn reads(&self) -> &[u8] {
        &self.reads
    }

    pub fn fail_writes(&mut self, error: TransportError) {
        self.write_error = Some(error);
    }

    pub fn set_not_ready(&mut self) {
        self.not_ready = true;
    }
}

impl Transport for FakeRegisters {
    fn read(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), TransportError> {
        for (offset, byte) in buffer.iter_mut().enumerate() {
            let address = register + offset as u8;
            self.reads.push(address);
            *byte = self.get(address);
        }
        Ok(())
    }

    fn write(&mut self, register: u8, value: u8) -> Result<(), TransportError> {
        if let Some(error) = self.write_error {
            return Err(error);
        }
        self.writes.push((register, value));
        self.set(register, value);
        Ok(())
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.not_ready {
            Err(TransportError::NotReady)
        } else {
            Ok(())
        }
    }
}

/// Tick source that advances by a fixed step on every read.
pub struct SteppingTicks {
    now: Cell<u32>,
    step: u32,
}

impl SteppingTicks {
    pub fn new(step: u32) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }
}

impl TickSource for SteppingTicks {
    fn now_ms(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step));
        now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeI2cError(i2c::ErrorKind);

impl i2c::Error for FakeI2cError {
    fn kind(&self) -> i2c::ErrorKind {
        self.0
    }
}

/// Blocking I2C peripheral with an auto-incrementing register pointer.
pub struct FakeI2c {
    address: SevenBitAddress,
    regs: [u8; 128],
    pointer: u8,
    writes: Vec<(u8, u8)>,
    error: Option<i2c::ErrorKind>,
}

impl FakeI2c {
    pub fn new() -> Self {
        Self {
            address: DEFAULT_I2C_ADDRESS,
            regs: [0; 128],
            pointer: 0,
            writes: Vec::new(),
            error: None,
        }
    }

    pub fn set_register(&mut self, register: u8, value: u8) {
        self.regs[register as usize] = value;
    }

    pub fn register(&self, register: u8) -> u8 {
        self.regs[register as usize]
    }

    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    pub fn fail_with(&mut self, kind: i2c::ErrorKind) {
        self.error = Some(kind);
    }
}

impl i2c::ErrorType for FakeI2c {
    type Error = FakeI2cError;
}

impl I2c for FakeI2c {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        if let Some(kind) = self.error {
            return Err(FakeI2cError(kind));
        }
        if address != self.address {
            return Err(FakeI2cError(i2c::ErrorKind::NoAcknowledge(
                NoAcknowledgeSource::Address,
            )));
        }

        for operation in operations {
            match operation {
                i2c::Operation::Write(bytes) => {
                    if let [register, data @ ..] = bytes {
                        self.pointer = *register;
                        for value in data {
                            self.writes.push((self.pointer, *value));
                            self.regs[self.pointer as usize & 0x7F] = *value;
                            self.pointer = self.pointer.wrapping_add(1);
                        }
                    }
                }
                i2c::Operation::Read(buffer) => {
                    for byte in buffer.iter_mut() {
                        *byte = self.regs[self.pointer as usize & 0x7F];
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeSpiError;

impl spi::Error for FakeSpiError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

/// 4-wire SPI device: the first byte of a transaction selects the register,
/// bit 7 set for reads.
pub struct FakeSpi {
    regs: [u8; 128],
    commands: Vec<u8>,
}

impl FakeSpi {
    pub fn new() -> Self {
        Self {
            regs: [0; 128],
            commands: Vec::new(),
        }
    }

    pub fn set_register(&mut self, register: u8, value: u8) {
        self.regs[register as usize] = value;
    }

    pub fn register(&self, register: u8) -> u8 {
        self.regs[register as usize]
    }

    pub fn last_command(&self) -> Option<u8> {
        self.commands.last().copied()
    }
}

impl spi::ErrorType for FakeSpi {
    type Error = FakeSpiError;
}

impl SpiDevice for FakeSpi {
    fn transaction(&mut self, operations: &mut [SpiOperation<'_, u8>]) -> Result<(), Self::Error> {
        let mut pointer: Option<u8> = None;
        for operation in operations {
            match operation {
                SpiOperation::Write(bytes) => {
                    for byte in bytes.iter() {
                        match pointer {
                            None => {
                                self.commands.push(*byte);
                                pointer = Some(*byte & 0x7F);
                            }
                            Some(register) => {
                                self.regs[register as usize] = *byte;
                                pointer = Some(register.wrapping_add(1) & 0x7F);
                            }
                        }
                    }
                }
                SpiOperation::Read(buffer) => {
                    let mut register = pointer.ok_or(FakeSpiError)?;
                    for byte in buffer.iter_mut() {
                        *byte = self.regs[register as usize];
                        register = register.wrapping_add(1) & 0x7F;
                    }
                    pointer = Some(register);
                }
                SpiOperation::DelayNs(_) => {}
                _ => return Err(FakeSpiError),
            }
        }
        Ok(())
    }
}

/// Pressure sensor with scripted results.
pub struct FakeSensor {
    pub pressure: Result<u16, SensorError>,
    pub temperature: Result<i16, SensorError>,
    pub trigger_error: Option<SensorError>,
    pub never_ready: bool,
    pub triggers: u32,
    pub ready_polls: u32,
}

impl FakeSensor {
    pub fn new(pressure: u16, temperature: i16) -> Self {
        Self {
            pressure: Ok(pressure),
            temperature: Ok(temperature),
            trigger_error: None,
            never_ready: false,
            triggers: 0,
            ready_polls: 0,
        }
    }
}

impl PressureSensor for FakeSensor {
    fn trigger(&mut self) -> Result<(), SensorError> {
        self.triggers += 1;
        match self.trigger_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn wait_ready(&mut self, max_polls: u16) -> Result<(), SensorError> {
        if self.never_ready {
            self.ready_polls += u32::from(max_polls);
            Err(SensorError::Timeout)
        } else {
            self.ready_polls += 1;
            Ok(())
        }
    }

    fn read_pressure(&mut self) -> Result<u16, SensorError> {
        self.pressure
    }

    fn read_temperature(&mut self) -> Result<i16, SensorError> {
        self.temperature
    }
}

pub struct FakeBattery {
    pub millivolts: Option<u16>,
    pub starts: u32,
    pub polls: u32,
}

impl FakeBattery {
    pub fn new(millivolts: u16) -> Self {
        Self {
            millivolts: Some(millivolts),
            starts: 0,
            polls: 0,
        }
    }
}

impl BatteryMonitor for FakeBattery {
    fn start_measurement(&mut self) {
        self.starts += 1;
    }

    fn poll_millivolts(&mut self) -> Option<u16> {
        self.polls += 1;
        self.millivolts
    }
}

/// Radio that records every payload and fails the next `fail_next` bursts.
pub struct FakeRadio {
    pub payloads: Vec<Vec<u8>>,
    pub fail_next: u32,
    pub never_completes: bool,
    pub starts: u32,
    pub completion_polls: u32,
    active: bool,
}

impl FakeRadio {
    pub fn new() -> Self {
        Self {
            payloads: Vec::new(),
            fail_next: 0,
            never_completes: false,
            starts: 0,
            completion_polls: 0,
            active: false,
        }
    }
}

impl Radio for FakeRadio {
    fn start_advertising(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        self.starts += 1;
        self.payloads.push(payload.to_vec());
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(RadioError::Rejected);
        }
        self.active = true;
        Ok(())
    }

    fn is_advertise_complete(&mut self) -> bool {
        self.completion_polls += 1;
        if self.never_completes || !self.active {
            return false;
        }
        self.active = false;
        true
    }
}

/// Timer that fires during the first wait after arming, after `spurious_wakes` false wakes.
pub struct FakeTimer {
    pub armed: Vec<u16>,
    pub spurious_wakes: u32,
    pending: bool,
}

impl FakeTimer {
    pub fn new() -> Self {
        Self {
            armed: Vec::new(),
            spurious_wakes: 0,
            pending: false,
        }
    }
}

impl WakeTimer for FakeTimer {
    fn arm(&mut self, period_secs: u16) {
        self.armed.push(period_secs);
        self.pending = true;
    }

    fn consume_wake_flag(&mut self) -> bool {
        if self.spurious_wakes > 0 {
            self.spurious_wakes -= 1;
            return false;
        }
        core::mem::take(&mut self.pending)
    }
}

#[derive(Default)]
pub struct FakeWatchdog {
    pub feeds: u32,
}

impl Watchdog for FakeWatchdog {
    fn feed(&mut self) {
        self.feeds += 1;
    }
}

#[derive(Default)]
pub struct FakePower {
    pub waits: u32,
}

impl PowerControl for FakePower {
    fn wait_for_event(&mut self) {
        self.waits += 1;
    }
}

#[derive(Default)]
pub struct CountingDelay {
    pub total_ms: u32,
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ms += ns / 1_000_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.total_ms += ms;
    }
}

/// Panics with the reason instead of resetting.
pub struct FakeReset;

impl SystemReset for FakeReset {
    fn reboot(&mut self, reason: ResetReason) -> ! {
        panic!("reboot {:?}", reason)
    }
}
