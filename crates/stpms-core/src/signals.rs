//! Flags raised from interrupt context and consumed by the duty cycle.
//!
//! Each flag is an embassy-sync [`Signal`]: an interrupt handler signals it
//! and the main loop takes it, which clears it. A signal raised while one is
//! already pending is coalesced, so a flag observed as set is consumed
//! exactly once.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

pub struct IsrFlags {
    wake: Signal<CriticalSectionRawMutex, ()>,
    advertise_done: Signal<CriticalSectionRawMutex, ()>,
    adc_millivolts: Signal<CriticalSectionRawMutex, u16>,
}

impl Default for IsrFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl IsrFlags {
    pub const fn new() -> Self {
        Self {
            wake: Signal::new(),
            advertise_done: Signal::new(),
            adc_millivolts: Signal::new(),
        }
    }

    /// Wake timer expired.
    pub fn signal_wake(&self) {
        self.wake.signal(());
    }

    pub fn take_wake(&self) -> bool {
        self.wake.try_take().is_some()
    }

    /// Non-consuming check, for waiting on the flag.
    pub fn wake_pending(&self) -> bool {
        self.wake.signaled()
    }

    /// The radio finished its advertising events.
    pub fn signal_advertise_done(&self) {
        self.advertise_done.signal(());
    }

    pub fn take_advertise_done(&self) -> bool {
        self.advertise_done.try_take().is_some()
    }

    /// ADC conversion completed with this battery voltage.
    pub fn signal_adc(&self, millivolts: u16) {
        self.adc_millivolts.signal(millivolts);
    }

    pub fn take_adc(&self) -> Option<u16> {
        self.adc_millivolts.try_take()
    }

    /// Drops stale flags before a new wait begins.
    pub fn reset(&self) {
        self.wake.reset();
        self.advertise_done.reset();
        self.adc_millivolts.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_is_consumed_once() {
        let flags = IsrFlags::new();
        flags.signal_wake();
        flags.signal_wake();
        assert!(flags.wake_pending());
        assert!(flags.take_wake());
        assert!(!flags.take_wake());
    }

    #[test]
    fn latest_adc_value_wins() {
        let flags = IsrFlags::new();
        flags.signal_adc(3100);
        flags.signal_adc(3050);
        assert_eq!(flags.take_adc(), Some(3050));
        assert_eq!(flags.take_adc(), None);
    }

    #[test]
    fn reset_clears_everything() {
        let flags = IsrFlags::new();
        flags.signal_wake();
        flags.signal_advertise_done();
        flags.signal_adc(1);
        flags.reset();
        assert!(!flags.take_wake());
        assert!(!flags.take_advertise_done());
        assert_eq!(flags.take_adc(), None);
    }

    #[test]
    fn signals_cross_threads() {
        static FLAGS: IsrFlags = IsrFlags::new();
        std::thread::spawn(|| FLAGS.signal_advertise_done())
            .join()
            .unwrap();
        assert!(FLAGS.take_advertise_done());
    }
}
