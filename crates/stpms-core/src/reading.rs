//! The broadcast reading and its 15-byte payload encoding.
//!
//! Binary format (little-endian, 15 bytes):
//! - pressure: 2 bytes (u16, mbar)
//! - temperature: 2 bytes (i16, centi-degrees)
//! - voltage: 1 byte (centivolts above 2.00 V)
//! - uptime: 2 bytes (u16, hours)
//! - error flags: 1 byte
//! - firmware version: 3 bytes (major, minor, build)
//! - reset reason: 1 byte
//! - reset count: 1 byte
//! - hardware id: 1 byte
//! - config: 1 byte (see [`ConfigByte`])

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::build_info::BuildInfo;
use crate::config::Config;
use crate::retained::{BootReport, ResetReason, RetainedStore};

pub const PAYLOAD_LEN: usize = 15;

/// Millivolts per payload voltage step.
const VOLTAGE_STEP_MV: u16 = 10;
/// Payload voltage zero point, in steps (2.00 V).
const VOLTAGE_OFFSET_STEPS: u16 = 200;

/// Measure period resolution carried in the config byte.
pub const PERIOD_STEP_SECS: u16 = 5;
const PERIOD_SHIFT: u8 = 3;
const HARDWARE_ID_MASK: u8 = 0b111;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload is {0} bytes, expected 15")]
    Length(usize),
}

/// Error flag byte carried in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorFlags(u8);

impl ErrorFlags {
    pub const NONE: Self = Self(0);
    /// ADC peripheral failed to initialize at boot.
    pub const ADC_INIT: Self = Self(1 << 0);
    /// Sensor communication failed during the measurement.
    pub const MEASURE_FAIL: Self = Self(1 << 1);
    /// Sensor never reported data ready.
    pub const MEASURE_STATUS: Self = Self(1 << 2);
    /// Pressure was read but temperature was not.
    pub const PARTIAL_DATA: Self = Self(1 << 3);
    /// Battery voltage conversion did not complete.
    pub const VOLTAGE_TIMEOUT: Self = Self(1 << 4);
    /// The previous advertisement failed and is being retried.
    pub const ADV_RETRY: Self = Self(1 << 5);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for ErrorFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ErrorFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
}

impl FirmwareVersion {
    /// Parses `vX.Y.Z` (the `v` is optional). Trailing text after the build
    /// number, such as `-dirty`, is ignored.
    pub fn parse(version: &str) -> Option<Self> {
        let version = version.strip_prefix('v').unwrap_or(version);
        let mut parts = version.splitn(3, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let build_part = parts.next()?;
        let digits = build_part
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(build_part.len());
        let build = build_part[..digits].parse().ok()?;
        Some(Self {
            major,
            minor,
            build,
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Board revision, three bits in the config byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HardwareId {
    #[default]
    Unknown = 0,
    Tpms1 = 1,
}

impl HardwareId {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => HardwareId::Tpms1,
            _ => HardwareId::Unknown,
        }
    }
}

/// Config byte: bits 0..2 hardware id, bits 3..7 measure period in 5 s steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigByte {
    pub hardware_id: HardwareId,
    pub period_secs: u16,
}

impl ConfigByte {
    pub const fn pack(&self) -> u8 {
        let steps = (self.period_secs / PERIOD_STEP_SECS) as u8;
        ((self.hardware_id as u8) & HARDWARE_ID_MASK) | (steps << PERIOD_SHIFT)
    }

    pub const fn unpack(byte: u8) -> Self {
        Self {
            hardware_id: HardwareId::from_u8(byte & HARDWARE_ID_MASK),
            period_secs: (byte >> PERIOD_SHIFT) as u16 * PERIOD_STEP_SECS,
        }
    }
}

/// Converts a battery voltage to the payload byte. 0 mV means no reading and stays 0.
pub fn encode_voltage(millivolts: u16) -> u8 {
    (millivolts / VOLTAGE_STEP_MV)
        .saturating_sub(VOLTAGE_OFFSET_STEPS)
        .min(u8::MAX as u16) as u8
}

pub fn decode_voltage(encoded: u8) -> u16 {
    if encoded == 0 {
        0
    } else {
        (encoded as u16 + VOLTAGE_OFFSET_STEPS) * VOLTAGE_STEP_MV
    }
}

/// The reading broadcast in every advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reading {
    pub pressure: u16,
    pub temperature: i16,
    pub voltage: u8,
    pub uptime_hours: u16,
    pub error_flags: ErrorFlags,
    pub firmware_version: FirmwareVersion,
    pub reset_reason: ResetReason,
    pub reset_count: u8,
    pub hardware_id: HardwareId,
    pub config: u8,
}

impl Reading {
    pub fn encode(&self) -> [u8; PAYLOAD_LEN] {
        let mut bytes = [0u8; PAYLOAD_LEN];
        bytes[0..2].copy_from_slice(&self.pressure.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.temperature.to_le_bytes());
        bytes[4] = self.voltage;
        bytes[5..7].copy_from_slice(&self.uptime_hours.to_le_bytes());
        bytes[7] = self.error_flags.bits();
        bytes[8] = self.firmware_version.major;
        bytes[9] = self.firmware_version.minor;
        bytes[10] = self.firmware_version.build;
        bytes[11] = self.reset_reason.as_u8();
        bytes[12] = self.reset_count;
        bytes[13] = self.hardware_id as u8;
        bytes[14] = self.config;
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PayloadError> {
        let bytes: &[u8; PAYLOAD_LEN] = bytes
            .try_into()
            .map_err(|_| PayloadError::Length(bytes.len()))?;
        Ok(Self {
            pressure: u16::from_le_bytes([bytes[0], bytes[1]]),
            temperature: i16::from_le_bytes([bytes[2], bytes[3]]),
            voltage: bytes[4],
            uptime_hours: u16::from_le_bytes([bytes[5], bytes[6]]),
            error_flags: ErrorFlags::from_bits(bytes[7]),
            firmware_version: FirmwareVersion {
                major: bytes[8],
                minor: bytes[9],
                build: bytes[10],
            },
            reset_reason: ResetReason::from_u8(bytes[11]),
            reset_count: bytes[12],
            hardware_id: HardwareId::from_u8(bytes[13]),
            config: bytes[14],
        })
    }
}

/// Owns the current reading and writes measured values through to the retained block.
pub struct ReadingAggregator<'r> {
    reading: Reading,
    retained: RetainedStore<'r>,
    boot: BootReport,
}

impl<'r> ReadingAggregator<'r> {
    /// Validates the retained block and seeds the reading from it.
    pub fn boot(
        mut retained: RetainedStore<'r>,
        hardware_cause: ResetReason,
        build: &BuildInfo<'_>,
        config: &Config<'_>,
    ) -> Self {
        let boot = retained.on_boot(hardware_cause);
        let state = retained.snapshot();

        let firmware_version = FirmwareVersion::parse(build.version).unwrap_or_else(|| {
            warn!("Unparseable firmware version {:?}, using 0.0.0", build.version);
            FirmwareVersion::default()
        });

        let mut aggregator = Self {
            reading: Reading {
                pressure: state.last_pressure,
                temperature: state.last_temperature,
                voltage: encode_voltage(state.last_voltage),
                uptime_hours: state.uptime_hours,
                ..Reading::default()
            },
            retained,
            boot,
        };
        aggregator.set_firmware_version(firmware_version);
        aggregator.set_reset_info(boot.reason, boot.reset_count);
        aggregator.set_config(ConfigByte {
            hardware_id: config.hardware_id,
            period_secs: config.measure_period_secs,
        });
        debug!("Reading restored: {:?}", aggregator.reading);
        aggregator
    }

    pub fn reading(&self) -> &Reading {
        &self.reading
    }

    pub fn boot_report(&self) -> &BootReport {
        &self.boot
    }

    pub fn retained(&self) -> &RetainedStore<'r> {
        &self.retained
    }

    pub fn retained_mut(&mut self) -> &mut RetainedStore<'r> {
        &mut self.retained
    }

    pub fn set_pressure(&mut self, mbar: u16) {
        self.reading.pressure = mbar;
        self.retained.set_last_pressure(mbar);
    }

    pub fn set_temperature(&mut self, centi: i16) {
        self.reading.temperature = centi;
        self.retained.set_last_temperature(centi);
    }

    pub fn set_voltage(&mut self, millivolts: u16) {
        self.reading.voltage = encode_voltage(millivolts);
        self.retained.set_last_voltage(millivolts);
    }

    pub fn increase_uptime_hour(&mut self) {
        self.reading.uptime_hours = self.retained.increment_uptime_hours();
    }

    pub fn set_error_flag(&mut self, flag: ErrorFlags) {
        self.reading.error_flags |= flag;
    }

    pub fn clear_error_flags(&mut self) {
        self.reading.error_flags = ErrorFlags::NONE;
    }

    pub fn set_reset_info(&mut self, reason: ResetReason, count: u8) {
        self.reading.reset_reason = reason;
        self.reading.reset_count = count;
    }

    pub fn set_firmware_version(&mut self, version: FirmwareVersion) {
        self.reading.firmware_version = version;
    }

    pub fn set_config(&mut self, config: ConfigByte) {
        self.reading.hardware_id = config.hardware_id;
        self.reading.config = config.pack();
    }

    /// Zeroes pressure and temperature in the broadcast reading only. The
    /// retained block keeps the last good values.
    pub fn mark_measurement_failed(&mut self, flag: ErrorFlags) {
        self.reading.pressure = 0;
        self.reading.temperature = 0;
        self.set_error_flag(flag);
    }

    pub fn encode(&self) -> [u8; PAYLOAD_LEN] {
        self.reading.encode()
    }
}
