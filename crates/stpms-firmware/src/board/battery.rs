//! Battery voltage through ADC1 and a 1:2 divider.

use embedded_hal::delay::DelayNs;
use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcConfig, AdcPin, Attenuation};
use esp_hal::peripherals::{ADC1, GPIO1};
use log::{debug, warn};

use stpms_core::battery::{AdcScale, BatteryMonitor, measure_millivolts};

/// 11 dB attenuation spans about 3.1 V at 12 bits, doubled by the divider.
pub const BATTERY_SCALE: AdcScale = AdcScale::new(3100, 2, 12);

pub struct AdcBattery {
    adc: Adc<'static, ADC1<'static>, Blocking>,
    pin: AdcPin<GPIO1<'static>, ADC1<'static>>,
    scale: AdcScale,
    converting: bool,
}

impl AdcBattery {
    pub fn new(adc1: ADC1<'static>, pin: GPIO1<'static>) -> Self {
        let mut config = AdcConfig::new();
        let pin = config.enable_pin(pin, Attenuation::_11dB);
        Self {
            adc: Adc::new(adc1, config),
            pin,
            scale: BATTERY_SCALE,
            converting: false,
        }
    }

    /// Runs one conversion to check the converter answers at all.
    ///
    /// Returns `false` if nothing came back within `polls` polls spaced
    /// `interval_ms` apart.
    pub fn probe(&mut self, delay: &mut impl DelayNs, polls: u16, interval_ms: u32) -> bool {
        match measure_millivolts(self, delay, polls, interval_ms) {
            Some(millivolts) => {
                debug!("ADC probe read {} mV", millivolts);
                true
            }
            None => {
                warn!("ADC did not answer within {} polls", polls);
                self.converting = false;
                false
            }
        }
    }
}

impl BatteryMonitor for AdcBattery {
    fn start_measurement(&mut self) {
        self.converting = true;
    }

    fn poll_millivolts(&mut self) -> Option<u16> {
        if !self.converting {
            return None;
        }
        // The first call starts the conversion, later ones report WouldBlock until done
        let raw = self.adc.read_oneshot(&mut self.pin).ok()?;
        self.converting = false;
        Some(self.scale.to_millivolts(i32::from(raw)))
    }
}
