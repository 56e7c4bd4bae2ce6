//! I2C bus and pressure sensor bring-up.

use esp_hal::Blocking;
use esp_hal::delay::Delay;
use esp_hal::i2c::master::{Config as I2cConfig, ConfigError, I2c};
use esp_hal::peripherals::{GPIO8, GPIO9, I2C0};
use esp_hal::time::Rate;
use log::info;

use stpms_core::sensors::registers::{Average, PressureScale};
use stpms_core::sensors::{Ilps22qs, SensorError};
use stpms_core::transport::I2cTransport;

/// Samples averaged per conversion. Trades conversion time against noise.
const SENSOR_AVERAGE: Average = Average::X16;

pub type SensorBus = I2c<'static, Blocking>;
pub type Sensor = Ilps22qs<I2cTransport<SensorBus>, Delay>;

/// Creates the I2C bus the sensor sits on (100 kHz, SDA on GPIO8, SCL on GPIO9).
pub fn create_i2c_bus(
    i2c0: I2C0<'static>,
    sda: GPIO8<'static>,
    scl: GPIO9<'static>,
) -> Result<SensorBus, ConfigError> {
    Ok(I2c::new(i2c0, I2cConfig::default().with_frequency(Rate::from_khz(100)))?
        .with_sda(sda)
        .with_scl(scl))
}

/// Identifies the sensor and configures it for one-shot conversions.
///
/// Tire pressures exceed the low full-scale range, so the high one is used.
pub fn init_sensor(bus: SensorBus) -> Result<Sensor, SensorError> {
    let mut sensor = Ilps22qs::new(I2cTransport::new(bus)).with_delay(Delay::new());
    sensor.start_one_shot_mode(None, PressureScale::High, SENSOR_AVERAGE)?;
    info!("Pressure sensor ready");
    Ok(sensor)
}
