//! Register-level driver for the ST ILPS22QS absolute pressure sensor.
//!
//! The driver talks to the chip through any [`Transport`] and keeps no copy
//! of the chip's state except the pressure full-scale setting, which it
//! needs to convert raw output. All other configuration is read back from
//! the chip on demand.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use super::registers::{
    AnalogHubConfig, Average, DataOutputConfig, DataStatus, DataUpdate, FilterConfig, FilterDiscard,
    InterfaceConfig, InterruptConfig, InterruptSource, OutputDataRate, PressureScale, Register,
    TemperatureScale, control2,
};
use super::{BoardHooks, NoDelay, NoTicks, PressureSensor, SensorError, TickSource};
use crate::transport::Transport;

/// WHO_AM_I value of the ILPS22QS.
pub const CHIP_ID: u8 = 0xB4;

const SEMAPHORE_TIMEOUT_MS: u32 = 10;
const SEMAPHORE_POLL_MS: u32 = 1;
const DATA_READY_POLL_MS: u32 = 1;

/// Low-pass filter the beacon measures with, settling over six samples.
pub const ONE_SHOT_FILTER: FilterConfig = FilterConfig {
    enabled: true,
    discard: FilterDiscard::SixSamples,
};

/// Observed state of the driver's busy semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreState {
    Free,
    Taken,
}

/// Busy flag for transports that complete transfers from interrupt context.
///
/// Register accesses wait while it is taken.
#[derive(Debug, Default)]
pub struct BusySemaphore {
    taken: AtomicBool,
}

impl BusySemaphore {
    pub const fn new() -> Self {
        Self {
            taken: AtomicBool::new(false),
        }
    }

    pub fn take(&self) {
        self.taken.store(true, Ordering::Release);
    }

    pub fn free(&self) {
        self.taken.store(false, Ordering::Release);
    }

    pub fn state(&self) -> SemaphoreState {
        if self.taken.load(Ordering::Acquire) {
            SemaphoreState::Taken
        } else {
            SemaphoreState::Free
        }
    }
}

/// Converts a big-endian 24-bit two's complement pressure sample to millibar.
///
/// Negative samples clamp to zero.
pub fn decode_pressure(raw: [u8; 3], scale: PressureScale) -> u16 {
    // Shift into the top of an i32 and back to sign-extend bit 23.
    let sample = i32::from_be_bytes([raw[0], raw[1], raw[2], 0]) >> 8;
    (sample / scale.divisor()).clamp(0, u16::MAX as i32) as u16
}

/// Converts hundredths of a degree Celsius to the requested scale.
pub fn convert_temperature(centi_celsius: i16, scale: TemperatureScale) -> i16 {
    match scale {
        TemperatureScale::Celsius => centi_celsius,
        TemperatureScale::Fahrenheit => {
            let fahrenheit = 3200 + i32::from(centi_celsius) * 18 / 10;
            fahrenheit.clamp(i16::MIN as i32, i16::MAX as i32) as i16
        }
    }
}

pub struct Ilps22qs<T, D = NoDelay, K = NoTicks, H = ()> {
    transport: T,
    delay: Option<D>,
    ticks: Option<K>,
    hooks: H,
    semaphore: BusySemaphore,
    pressure_scale: PressureScale,
    temperature_scale: TemperatureScale,
}

impl<T: Transport> Ilps22qs<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            delay: None,
            ticks: None,
            hooks: (),
            semaphore: BusySemaphore::new(),
            pressure_scale: PressureScale::Low,
            temperature_scale: TemperatureScale::Celsius,
        }
    }
}

impl<T, D, K, H> Ilps22qs<T, D, K, H>
where
    T: Transport,
    D: DelayNs,
    K: TickSource,
    H: BoardHooks,
{
    /// Delay used between polls while waiting.
    pub fn with_delay<D2: DelayNs>(self, delay: D2) -> Ilps22qs<T, D2, K, H> {
        Ilps22qs {
            transport: self.transport,
            delay: Some(delay),
            ticks: self.ticks,
            hooks: self.hooks,
            semaphore: self.semaphore,
            pressure_scale: self.pressure_scale,
            temperature_scale: self.temperature_scale,
        }
    }

    /// Tick source bounding the busy wait. Without one a taken semaphore is waited on forever.
    pub fn with_tick_source<K2: TickSource>(self, ticks: K2) -> Ilps22qs<T, D, K2, H> {
        Ilps22qs {
            transport: self.transport,
            delay: self.delay,
            ticks: Some(ticks),
            hooks: self.hooks,
            semaphore: self.semaphore,
            pressure_scale: self.pressure_scale,
            temperature_scale: self.temperature_scale,
        }
    }

    pub fn with_board_hooks<H2: BoardHooks>(self, hooks: H2) -> Ilps22qs<T, D, K, H2> {
        Ilps22qs {
            transport: self.transport,
            delay: self.delay,
            ticks: self.ticks,
            hooks,
            semaphore: self.semaphore,
            pressure_scale: self.pressure_scale,
            temperature_scale: self.temperature_scale,
        }
    }

    pub fn with_temperature_scale(mut self, scale: TemperatureScale) -> Self {
        self.temperature_scale = scale;
        self
    }

    pub fn semaphore(&self) -> &BusySemaphore {
        &self.semaphore
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn release(self) -> T {
        self.transport
    }

    /// Brings the sensor up: checks the transport, runs the board power-up
    /// hook, optionally writes the interface configuration, verifies the chip
    /// id and caches the pressure scale.
    pub fn init(&mut self, interface: Option<InterfaceConfig>) -> Result<(), SensorError> {
        self.transport.check().map_err(|e| {
            error!("ILPS22QS transport not ready: {}", e);
            SensorError::Interface
        })?;

        self.hooks.power_up().map_err(|e| {
            error!("ILPS22QS power-up hook failed: {}", e);
            SensorError::BoardHook
        })?;

        if let Some(interface) = interface {
            self.write_register(Register::Interface, interface.bits())?;
        }

        let id = self.read_register(Register::WhoAmI)?;
        if id != CHIP_ID {
            error!("ILPS22QS unexpected WHO_AM_I {:#04x}", id);
            return Err(SensorError::UnexpectedDevice { found: id });
        }

        self.pressure_scale = self.read_pressure_scale()?;
        info!("ILPS22QS ready, pressure scale {:?}", self.pressure_scale);
        Ok(())
    }

    /// [`init`](Self::init) followed by the configuration the beacon measures
    /// with: analog hub off, [`ONE_SHOT_FILTER`], one-shot conversions averaged
    /// over `average` samples, output registers locked until both halves are read.
    pub fn start_one_shot_mode(
        &mut self,
        interface: Option<InterfaceConfig>,
        scale: PressureScale,
        average: Average,
    ) -> Result<(), SensorError> {
        self.init(interface)?;
        self.disable_analog_hub()?;
        self.set_pressure_scale(scale)?;
        self.set_filter(ONE_SHOT_FILTER)?;
        self.set_data_output(DataOutputConfig {
            average,
            data_rate: OutputDataRate::OneShot,
        })?;
        self.set_data_update(DataUpdate::BlockUntilRead)?;
        debug!("ILPS22QS one-shot mode, {:?} averaging", average);
        Ok(())
    }

    /// Runs the board power-down hook.
    pub fn deinit(&mut self) -> Result<(), SensorError> {
        self.hooks.power_down().map_err(|e| {
            error!("ILPS22QS power-down hook failed: {}", e);
            SensorError::BoardHook
        })
    }

    pub fn set_interrupt_config(&mut self, config: InterruptConfig) -> Result<(), SensorError> {
        self.write_register(Register::InterruptConfig, config.bits())
    }

    pub fn interrupt_config(&mut self) -> Result<InterruptConfig, SensorError> {
        Ok(InterruptConfig::from_bits(
            self.read_register(Register::InterruptConfig)?,
        ))
    }

    /// Sets the pressure interrupt threshold in hPa, MSB register first.
    pub fn set_pressure_threshold(&mut self, threshold_hpa: u16) -> Result<(), SensorError> {
        let raw = threshold_hpa.saturating_mul(self.pressure_scale.threshold_factor());
        let [high, low] = raw.to_be_bytes();
        self.write_register(Register::PressureThresholdHigh, high)?;
        self.write_register(Register::PressureThresholdLow, low)
    }

    pub fn pressure_threshold(&mut self) -> Result<u16, SensorError> {
        let high = self.read_register(Register::PressureThresholdHigh)?;
        let low = self.read_register(Register::PressureThresholdLow)?;
        Ok(u16::from_be_bytes([high, low]) / self.pressure_scale.threshold_factor())
    }

    /// Changes the pressure full scale. The cached scale only follows a successful write.
    pub fn set_pressure_scale(&mut self, scale: PressureScale) -> Result<(), SensorError> {
        let bit = match scale {
            PressureScale::Low => 0,
            PressureScale::High => control2::FULL_SCALE,
        };
        self.modify_register(Register::Control2, control2::FULL_SCALE, bit)?;
        self.pressure_scale = scale;
        Ok(())
    }

    pub fn pressure_scale(&self) -> PressureScale {
        self.pressure_scale
    }

    pub fn set_temperature_scale(&mut self, scale: TemperatureScale) {
        self.temperature_scale = scale;
    }

    pub fn temperature_scale(&self) -> TemperatureScale {
        self.temperature_scale
    }

    pub fn set_data_output(&mut self, config: DataOutputConfig) -> Result<(), SensorError> {
        self.write_register(Register::Control1, config.bits())
    }

    pub fn data_output(&mut self) -> Result<DataOutputConfig, SensorError> {
        let value = self.read_register(Register::Control1)?;
        DataOutputConfig::from_bits(value).ok_or(SensorError::InvalidRegister {
            register: Register::Control1.addr(),
            value,
        })
    }

    pub fn trigger_one_shot(&mut self) -> Result<(), SensorError> {
        self.modify_register(Register::Control2, 0, control2::ONE_SHOT)
            .map(|_| ())
    }

    pub fn set_filter(&mut self, config: FilterConfig) -> Result<(), SensorError> {
        let mut bits = 0;
        if config.enabled {
            bits |= control2::FILTER_ENABLE;
        }
        if config.discard == FilterDiscard::SixSamples {
            bits |= control2::FILTER_DISCARD;
        }
        self.modify_register(
            Register::Control2,
            control2::FILTER_ENABLE | control2::FILTER_DISCARD,
            bits,
        )
        .map(|_| ())
    }

    pub fn filter(&mut self) -> Result<FilterConfig, SensorError> {
        let value = self.read_register(Register::Control2)?;
        Ok(FilterConfig {
            enabled: value & control2::FILTER_ENABLE != 0,
            discard: if value & control2::FILTER_DISCARD != 0 {
                FilterDiscard::SixSamples
            } else {
                FilterDiscard::OneSample
            },
        })
    }

    pub fn set_data_update(&mut self, update: DataUpdate) -> Result<(), SensorError> {
        let bit = match update {
            DataUpdate::Continuous => 0,
            DataUpdate::BlockUntilRead => control2::BLOCK_DATA_UPDATE,
        };
        self.modify_register(Register::Control2, control2::BLOCK_DATA_UPDATE, bit)
            .map(|_| ())
    }

    pub fn data_update(&mut self) -> Result<DataUpdate, SensorError> {
        let value = self.read_register(Register::Control2)?;
        Ok(if value & control2::BLOCK_DATA_UPDATE != 0 {
            DataUpdate::BlockUntilRead
        } else {
            DataUpdate::Continuous
        })
    }

    pub fn software_reset(&mut self) -> Result<(), SensorError> {
        self.modify_register(Register::Control2, 0, control2::SOFTWARE_RESET)
            .map(|_| ())
    }

    /// Reloads trimming parameters. Also restores the analog hub.
    pub fn reboot_memory(&mut self) -> Result<(), SensorError> {
        self.modify_register(Register::Control2, 0, control2::BOOT)
            .map(|_| ())
    }

    pub fn disable_analog_hub(&mut self) -> Result<(), SensorError> {
        self.write_register(Register::AnalogHubDisable, 0)
    }

    pub fn set_analog_hub(&mut self, config: AnalogHubConfig) -> Result<(), SensorError> {
        self.write_register(Register::Control3, config.bits())
    }

    pub fn analog_hub(&mut self) -> Result<AnalogHubConfig, SensorError> {
        Ok(AnalogHubConfig::from_bits(
            self.read_register(Register::Control3)?,
        ))
    }

    pub fn reference_pressure(&mut self) -> Result<u16, SensorError> {
        let high = self.read_register(Register::ReferencePressureHigh)?;
        let low = self.read_register(Register::ReferencePressureLow)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    pub fn set_pressure_offset(&mut self, offset: i16) -> Result<(), SensorError> {
        let [high, low] = offset.to_be_bytes();
        self.write_register(Register::PressureOffsetHigh, high)?;
        self.write_register(Register::PressureOffsetLow, low)
    }

    pub fn pressure_offset(&mut self) -> Result<i16, SensorError> {
        let high = self.read_register(Register::PressureOffsetHigh)?;
        let low = self.read_register(Register::PressureOffsetLow)?;
        Ok(i16::from_be_bytes([high, low]))
    }

    pub fn interrupt_source(&mut self) -> Result<InterruptSource, SensorError> {
        Ok(InterruptSource::from_bits(
            self.read_register(Register::InterruptSource)?,
        ))
    }

    pub fn data_status(&mut self) -> Result<DataStatus, SensorError> {
        Ok(DataStatus::from_bits(self.read_register(Register::Status)?))
    }

    /// Pressure in millibar.
    pub fn pressure(&mut self) -> Result<u16, SensorError> {
        let high = self.read_register(Register::PressureOutHigh)?;
        let mid = self.read_register(Register::PressureOutMid)?;
        let low = self.read_register(Register::PressureOutLow)?;
        let mbar = decode_pressure([high, mid, low], self.pressure_scale);
        debug!("ILPS22QS pressure {} mbar", mbar);
        Ok(mbar)
    }

    /// Temperature in hundredths of a degree in the configured scale.
    pub fn temperature(&mut self) -> Result<i16, SensorError> {
        let high = self.read_register(Register::TemperatureOutHigh)?;
        let low = self.read_register(Register::TemperatureOutLow)?;
        let centi = convert_temperature(i16::from_be_bytes([high, low]), self.temperature_scale);
        debug!("ILPS22QS temperature {}", centi);
        Ok(centi)
    }

    /// Polls STATUS until both channels are available.
    pub fn wait_data_ready(&mut self, max_polls: u16) -> Result<(), SensorError> {
        for _ in 0..max_polls {
            if self.data_status()?.is_ready() {
                return Ok(());
            }
            if let Some(delay) = self.delay.as_mut() {
                delay.delay_ms(DATA_READY_POLL_MS);
            }
        }
        warn!("ILPS22QS data not ready after {} polls", max_polls);
        Err(SensorError::Timeout)
    }

    fn read_pressure_scale(&mut self) -> Result<PressureScale, SensorError> {
        let value = self.read_register(Register::Control2)?;
        Ok(if value & control2::FULL_SCALE != 0 {
            PressureScale::High
        } else {
            PressureScale::Low
        })
    }

    fn wait_for_semaphore(&mut self) -> Result<(), SensorError> {
        let start = self.ticks.as_ref().map(|ticks| ticks.now_ms());
        while self.semaphore.state() == SemaphoreState::Taken {
            if let (Some(ticks), Some(start)) = (self.ticks.as_ref(), start) {
                if ticks.now_ms().wrapping_sub(start) >= SEMAPHORE_TIMEOUT_MS {
                    warn!("ILPS22QS bus still busy after {} ms", SEMAPHORE_TIMEOUT_MS);
                    return Err(SensorError::Timeout);
                }
            }
            if let Some(delay) = self.delay.as_mut() {
                delay.delay_ms(SEMAPHORE_POLL_MS);
            }
        }
        Ok(())
    }

    fn read_register(&mut self, register: Register) -> Result<u8, SensorError> {
        self.wait_for_semaphore()?;
        let mut buffer = [0u8; 1];
        self.transport.read(register.addr(), &mut buffer)?;
        Ok(buffer[0])
    }

    fn write_register(&mut self, register: Register, value: u8) -> Result<(), SensorError> {
        self.wait_for_semaphore()?;
        self.transport.write(register.addr(), value)?;
        Ok(())
    }

    fn modify_register(
        &mut self,
        register: Register,
        clear: u8,
        set: u8,
    ) -> Result<u8, SensorError> {
        let value = (self.read_register(register)? & !clear) | set;
        self.write_register(register, value)?;
        Ok(value)
    }
}

impl<T, D, K, H> PressureSensor for Ilps22qs<T, D, K, H>
where
    T: Transport,
    D: DelayNs,
    K: TickSource,
    H: BoardHooks,
{
    fn trigger(&mut self) -> Result<(), SensorError> {
        self.trigger_one_shot()
    }

    fn wait_ready(&mut self, max_polls: u16) -> Result<(), SensorError> {
        self.wait_data_ready(max_polls)
    }

    fn read_pressure(&mut self) -> Result<u16, SensorError> {
        self.pressure()
    }

    fn read_temperature(&mut self) -> Result<i16, SensorError> {
        self.temperature()
    }
}
