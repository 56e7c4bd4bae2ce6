//! ILPS22QS register map and typed views of the configuration registers.

/// Registers used by the driver.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    InterruptConfig = 0x0B,
    PressureThresholdLow = 0x0C,
    PressureThresholdHigh = 0x0D,
    Interface = 0x0E,
    WhoAmI = 0x0F,
    Control1 = 0x10,
    Control2 = 0x11,
    Control3 = 0x12,
    ReferencePressureLow = 0x16,
    ReferencePressureHigh = 0x17,
    PressureOffsetLow = 0x1A,
    PressureOffsetHigh = 0x1B,
    InterruptSource = 0x24,
    Status = 0x27,
    PressureOutLow = 0x28,
    PressureOutMid = 0x29,
    PressureOutHigh = 0x2A,
    TemperatureOutLow = 0x2B,
    TemperatureOutHigh = 0x2C,
    /// Not listed in the register map. Cleared to turn the analog hub off; reboot restores it.
    AnalogHubDisable = 0x5F,
}

impl Register {
    pub const fn addr(self) -> u8 {
        self as u8
    }
}

/// Bits of [`Register::Control2`].
pub mod control2 {
    pub const ONE_SHOT: u8 = 1 << 0;
    pub const SOFTWARE_RESET: u8 = 1 << 2;
    pub const BLOCK_DATA_UPDATE: u8 = 1 << 3;
    pub const FILTER_ENABLE: u8 = 1 << 4;
    pub const FILTER_DISCARD: u8 = 1 << 5;
    pub const FULL_SCALE: u8 = 1 << 6;
    pub const BOOT: u8 = 1 << 7;
}

const AVERAGE_MASK: u8 = 0b111;
const DATA_RATE_SHIFT: u8 = 3;
const DATA_RATE_MASK: u8 = 0b1111;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureScale {
    /// Hundredths of a degree Celsius.
    #[default]
    Celsius,
    /// Hundredths of a degree Fahrenheit.
    Fahrenheit,
}

/// Full-scale range of the pressure output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PressureScale {
    /// Up to 1260 hPa, 4096 LSB/hPa.
    #[default]
    Low,
    /// Up to 4060 hPa, 2048 LSB/hPa.
    High,
}

impl PressureScale {
    /// LSB per hPa of the 24-bit pressure output.
    pub const fn divisor(self) -> i32 {
        match self {
            PressureScale::Low => 4096,
            PressureScale::High => 2048,
        }
    }

    /// LSB per hPa of the 16-bit threshold registers.
    pub const fn threshold_factor(self) -> u16 {
        match self {
            PressureScale::Low => 16,
            PressureScale::High => 8,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Average {
    #[default]
    X4 = 0b000,
    X8 = 0b001,
    X16 = 0b010,
    X32 = 0b011,
    X64 = 0b100,
    X128 = 0b101,
    X512 = 0b111,
}

impl Average {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits & AVERAGE_MASK {
            0b000 => Some(Average::X4),
            0b001 => Some(Average::X8),
            0b010 => Some(Average::X16),
            0b011 => Some(Average::X32),
            0b100 => Some(Average::X64),
            0b101 => Some(Average::X128),
            0b111 => Some(Average::X512),
            _ => None,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputDataRate {
    /// Power-down; conversions only on a one-shot trigger.
    #[default]
    OneShot = 0b0000,
    Hz1 = 0b0001,
    Hz4 = 0b0010,
    Hz10 = 0b0011,
    Hz25 = 0b0100,
    Hz50 = 0b0101,
    Hz75 = 0b0110,
    Hz100 = 0b0111,
    Hz200 = 0b1000,
}

impl OutputDataRate {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits & DATA_RATE_MASK {
            0b0000 => Some(OutputDataRate::OneShot),
            0b0001 => Some(OutputDataRate::Hz1),
            0b0010 => Some(OutputDataRate::Hz4),
            0b0011 => Some(OutputDataRate::Hz10),
            0b0100 => Some(OutputDataRate::Hz25),
            0b0101 => Some(OutputDataRate::Hz50),
            0b0110 => Some(OutputDataRate::Hz75),
            0b0111 => Some(OutputDataRate::Hz100),
            0b1000 => Some(OutputDataRate::Hz200),
            _ => None,
        }
    }
}

/// CTRL_REG1: averaging and output data rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataOutputConfig {
    pub average: Average,
    pub data_rate: OutputDataRate,
}

impl DataOutputConfig {
    pub const fn bits(&self) -> u8 {
        (self.average as u8) | ((self.data_rate as u8) << DATA_RATE_SHIFT)
    }

    pub const fn from_bits(bits: u8) -> Option<Self> {
        let Some(average) = Average::from_bits(bits) else {
            return None;
        };
        let Some(data_rate) = OutputDataRate::from_bits(bits >> DATA_RATE_SHIFT) else {
            return None;
        };
        Some(Self { average, data_rate })
    }
}

/// Low-pass filter discard setting (CTRL_REG2 bit 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterDiscard {
    /// Bandwidth ODR/4, one sample discarded.
    #[default]
    OneSample,
    /// Bandwidth ODR/9, six samples discarded.
    SixSamples,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterConfig {
    pub enabled: bool,
    pub discard: FilterDiscard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataUpdate {
    #[default]
    Continuous,
    /// Output registers hold until both MSB and LSB have been read.
    BlockUntilRead,
}

/// INTERRUPT_CFG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptConfig {
    pub pressure_high: bool,
    pub pressure_low: bool,
    pub latched: bool,
    pub reset_auto_zero: bool,
    pub auto_zero: bool,
    pub reset_auto_reference: bool,
    pub auto_reference: bool,
}

impl InterruptConfig {
    pub const fn bits(&self) -> u8 {
        (self.pressure_high as u8)
            | (self.pressure_low as u8) << 1
            | (self.latched as u8) << 2
            | (self.reset_auto_zero as u8) << 4
            | (self.auto_zero as u8) << 5
            | (self.reset_auto_reference as u8) << 6
            | (self.auto_reference as u8) << 7
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self {
            pressure_high: bits & (1 << 0) != 0,
            pressure_low: bits & (1 << 1) != 0,
            latched: bits & (1 << 2) != 0,
            reset_auto_zero: bits & (1 << 4) != 0,
            auto_zero: bits & (1 << 5) != 0,
            reset_auto_reference: bits & (1 << 6) != 0,
            auto_reference: bits & (1 << 7) != 0,
        }
    }
}

/// IF_CTRL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterfaceConfig {
    pub ss_pull_up: bool,
    pub sda_pull_up: bool,
    pub spi_read: bool,
    pub disable_i2c_i3c: bool,
}

impl InterfaceConfig {
    pub const fn bits(&self) -> u8 {
        (self.ss_pull_up as u8) << 1
            | (self.sda_pull_up as u8) << 4
            | (self.spi_read as u8) << 5
            | (self.disable_i2c_i3c as u8) << 6
    }
}

/// CTRL_REG3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogHubConfig {
    pub address_increment: bool,
    pub interleaved: bool,
    pub enabled: bool,
}

impl Default for AnalogHubConfig {
    fn default() -> Self {
        Self {
            address_increment: true,
            interleaved: false,
            enabled: false,
        }
    }
}

impl AnalogHubConfig {
    pub const fn bits(&self) -> u8 {
        (self.address_increment as u8) | (self.interleaved as u8) << 5 | (self.enabled as u8) << 7
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self {
            address_increment: bits & (1 << 0) != 0,
            interleaved: bits & (1 << 5) != 0,
            enabled: bits & (1 << 7) != 0,
        }
    }
}

/// INT_SOURCE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptSource {
    pub pressure_high: bool,
    pub pressure_low: bool,
    pub active: bool,
    pub boot_in_progress: bool,
}

impl InterruptSource {
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            pressure_high: bits & (1 << 0) != 0,
            pressure_low: bits & (1 << 1) != 0,
            active: bits & (1 << 2) != 0,
            boot_in_progress: bits & (1 << 7) != 0,
        }
    }
}

/// STATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataStatus {
    pub pressure_available: bool,
    pub temperature_available: bool,
    pub pressure_overrun: bool,
    pub temperature_overrun: bool,
}

impl DataStatus {
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            pressure_available: bits & (1 << 0) != 0,
            temperature_available: bits & (1 << 1) != 0,
            pressure_overrun: bits & (1 << 4) != 0,
            temperature_overrun: bits & (1 << 5) != 0,
        }
    }

    /// Both a pressure and a temperature sample are waiting.
    pub const fn is_ready(&self) -> bool {
        self.pressure_available && self.temperature_available
    }
}
