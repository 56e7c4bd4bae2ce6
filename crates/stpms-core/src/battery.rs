//! Battery voltage measurement.

use embedded_hal::delay::DelayNs;

/// Scale from raw ADC counts to millivolts at the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcScale {
    /// ADC full-scale input at the configured attenuation.
    pub reference_mv: u32,
    /// Divider or gain between the battery and the ADC pin.
    pub gain: u32,
    pub resolution_bits: u8,
}

impl AdcScale {
    /// 0.6 V internal reference, 1/6 gain, 12-bit.
    pub const INTERNAL_REFERENCE: Self = Self::new(600, 6, 12);

    pub const fn new(reference_mv: u32, gain: u32, resolution_bits: u8) -> Self {
        Self {
            reference_mv,
            gain,
            resolution_bits,
        }
    }

    /// Converts a raw sample. Negative samples (ground noise) read as 0 mV.
    pub fn to_millivolts(&self, raw: i32) -> u16 {
        let raw = raw.max(0) as u64;
        let full_scale = 1u64 << self.resolution_bits;
        let mv = raw * u64::from(self.reference_mv) * u64::from(self.gain) / full_scale;
        mv.min(u64::from(u16::MAX)) as u16
    }
}

/// Source of battery voltage readings.
pub trait BatteryMonitor {
    /// Starts a conversion.
    fn start_measurement(&mut self);

    /// Returns the voltage once the conversion has completed.
    fn poll_millivolts(&mut self) -> Option<u16>;
}

/// Starts a conversion and polls it up to `polls` times, waiting
/// `interval_ms` after every poll that comes back empty. 0 mV counts as empty.
pub fn measure_millivolts(
    battery: &mut impl BatteryMonitor,
    delay: &mut impl DelayNs,
    polls: u16,
    interval_ms: u32,
) -> Option<u16> {
    battery.start_measurement();
    for _ in 0..polls {
        if let Some(millivolts) = battery.poll_millivolts().filter(|mv| *mv != 0) {
            return Some(millivolts);
        }
        delay.delay_ms(interval_ms);
    }
    None
}
