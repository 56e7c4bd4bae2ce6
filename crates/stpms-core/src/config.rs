use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::advertising::MAX_NAME_LEN;
use crate::reading::{HardwareId, PERIOD_STEP_SECS};

/// Longest measure period the config byte can carry.
pub const MAX_MEASURE_PERIOD_SECS: u16 = 31 * PERIOD_STEP_SECS;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("measure period {0} s is not a multiple of 5 in 5..=155")]
    MeasurePeriod(u16),
    #[error("device name is {0} bytes, at most 29 fit")]
    DeviceName(usize),
    #[error("watchdog timeout {watchdog} s does not exceed measure period {period} s")]
    Watchdog { watchdog: u16, period: u16 },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

/// Build-time configuration of the beacon.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    /// Complete local name sent in the scan response.
    pub device_name: &'a str,
    pub hardware_id: HardwareId,
    /// Seconds between the start of two measurements.
    pub measure_period_secs: u16,
    pub adv_tx_power_dbm: i8,
    /// Advertising interval in 0.625 ms units.
    pub adv_interval_units: u16,
    /// Advertising events per broadcast.
    pub adv_event_count: u8,
    /// Consecutive advertising failures tolerated before rebooting.
    pub adv_fail_threshold: u8,
    /// Polls of the radio's completion flag before giving up on one broadcast.
    pub adv_complete_polls: u16,
    pub sensor_ready_polls: u16,
    pub adc_ready_polls: u16,
    /// Delay between two polls of any of the above.
    pub poll_interval_ms: u32,
    /// Cycles after a power-up that measure battery voltage.
    pub powerup_voltage_cycles: u8,
    pub watchdog_timeout_secs: u16,
    /// Bluetooth SIG company identifier for the manufacturer data.
    pub company_id: u16,
    /// Measure battery voltage on every cycle.
    pub debug_build: bool,
}

impl Config<'static> {
    pub const DEFAULT: Self = Self {
        device_name: "sTPMS",
        hardware_id: HardwareId::Tpms1,
        measure_period_secs: 30,
        adv_tx_power_dbm: 4,
        adv_interval_units: 160,
        adv_event_count: 3,
        adv_fail_threshold: 3,
        adv_complete_polls: 1000,
        sensor_ready_polls: 200,
        adc_ready_polls: 50,
        poll_interval_ms: 1,
        powerup_voltage_cycles: 3,
        watchdog_timeout_secs: 120,
        company_id: 0xFFFF,
        debug_build: false,
    };
}

impl Default for Config<'static> {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Config<'_> {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let period = self.measure_period_secs;
        if period == 0 || period % PERIOD_STEP_SECS != 0 || period > MAX_MEASURE_PERIOD_SECS {
            return Err(ConfigError::MeasurePeriod(period));
        }
        if self.device_name.len() > MAX_NAME_LEN {
            return Err(ConfigError::DeviceName(self.device_name.len()));
        }
        if self.watchdog_timeout_secs <= period {
            return Err(ConfigError::Watchdog {
                watchdog: self.watchdog_timeout_secs,
                period,
            });
        }
        if self.adv_event_count == 0 {
            return Err(ConfigError::Zero("adv_event_count"));
        }
        if self.adv_complete_polls == 0 {
            return Err(ConfigError::Zero("adv_complete_polls"));
        }
        if self.sensor_ready_polls == 0 {
            return Err(ConfigError::Zero("sensor_ready_polls"));
        }
        if self.adc_ready_polls == 0 {
            return Err(ConfigError::Zero("adc_ready_polls"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(Config::DEFAULT.validate(), Ok(()));
    }

    #[test]
    fn period_must_fit_config_byte() {
        for period in [0, 7, 160] {
            let config = Config {
                measure_period_secs: period,
                ..Config::DEFAULT
            };
            assert_eq!(config.validate(), Err(ConfigError::MeasurePeriod(period)));
        }
        let config = Config {
            measure_period_secs: 155,
            watchdog_timeout_secs: 300,
            ..Config::DEFAULT
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn long_name_rejected() {
        let config = Config {
            device_name: "a-device-name-far-too-long-for-a-scan-response",
            ..Config::DEFAULT
        };
        assert!(matches!(config.validate(), Err(ConfigError::DeviceName(_))));
    }

    #[test]
    fn watchdog_must_outlast_sleep() {
        let config = Config {
            watchdog_timeout_secs: 30,
            ..Config::DEFAULT
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Watchdog {
                watchdog: 30,
                period: 30
            })
        );
    }

    #[test]
    fn zero_poll_budget_rejected() {
        let config = Config {
            sensor_ready_polls: 0,
            ..Config::DEFAULT
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero("sensor_ready_polls"))
        );
    }
}
