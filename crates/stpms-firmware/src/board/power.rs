//! Light sleep, wake timer, watchdog and resets.

use core::cell::{Cell, RefCell};
use core::time::Duration;

use esp_hal::peripherals::TIMG1;
use esp_hal::rtc_cntl::sleep::TimerWakeupSource;
use esp_hal::rtc_cntl::{Rtc, SocResetReason, reset_reason, wakeup_cause};
use esp_hal::system::{Cpu, software_reset};
use esp_hal::timer::timg::{MwdtStage, Wdt};
use log::{debug, info};

use stpms_core::collaborators::{PowerControl, SystemReset, WakeDeadline, WakeTimer, Watchdog};
use stpms_core::retained::ResetReason;
use stpms_core::signals::IsrFlags;

use crate::retained;

/// Light sleep on the RTC timer.
///
/// The duty cycle needs a wake timer and a power controller that share the
/// RTC, so both traits are implemented for `&SleepController`.
pub struct SleepController<'d> {
    rtc: RefCell<Rtc<'d>>,
    /// Expiry of the armed period, on the RTC clock that keeps running in sleep.
    deadline: Cell<Option<WakeDeadline>>,
    flags: &'d IsrFlags,
}

impl<'d> SleepController<'d> {
    pub fn new(rtc: Rtc<'d>, flags: &'d IsrFlags) -> Self {
        Self {
            rtc: RefCell::new(rtc),
            deadline: Cell::new(None),
            flags,
        }
    }

    fn now_us(&self) -> u64 {
        self.rtc.borrow().current_time_us()
    }
}

impl WakeTimer for &SleepController<'_> {
    fn arm(&mut self, period_secs: u16) {
        self.deadline
            .set(Some(WakeDeadline::after(self.now_us(), period_secs)));
    }

    fn consume_wake_flag(&mut self) -> bool {
        self.flags.take_wake()
    }
}

impl PowerControl for &SleepController<'_> {
    fn wait_for_event(&mut self) {
        let Some(deadline) = self.deadline.get() else {
            return;
        };

        if let Some(remaining) = deadline.remaining_us(self.now_us()) {
            let timer = TimerWakeupSource::new(Duration::from_micros(remaining));
            self.rtc.borrow_mut().sleep_light(&[&timer]);

            if let Some(left) = deadline.remaining_us(self.now_us()) {
                debug!("Woke from {:?} with {} us left", wakeup_cause(), left);
                return;
            }
        }

        self.deadline.set(None);
        self.flags.signal_wake();
    }
}

/// Main watchdog of timer group 1.
pub struct MainWatchdog {
    wdt: Wdt<TIMG1<'static>>,
}

impl MainWatchdog {
    pub fn start(mut wdt: Wdt<TIMG1<'static>>, timeout_secs: u16) -> Self {
        wdt.set_timeout(
            MwdtStage::Stage0,
            esp_hal::time::Duration::from_secs(u64::from(timeout_secs)),
        );
        wdt.enable();
        info!("Watchdog armed, {} s", timeout_secs);
        Self { wdt }
    }
}

impl Watchdog for MainWatchdog {
    fn feed(&mut self) {
        self.wdt.feed();
    }
}

pub struct SocReset;

impl SystemReset for SocReset {
    fn reboot(&mut self, reason: ResetReason) -> ! {
        retained::record_reset_reason(reason);
        info!("Resetting, reason {:?}", reason);
        software_reset()
    }
}

/// What the chip reports as the cause of the last reset.
pub fn hardware_reset_cause() -> ResetReason {
    match reset_reason(Cpu::ProCpu) {
        Some(SocResetReason::ChipPowerOn) => ResetReason::Powerup,
        Some(SocResetReason::CoreSw | SocResetReason::Cpu0Sw) => ResetReason::SoftReset,
        Some(
            SocResetReason::CoreMwdt0
            | SocResetReason::CoreMwdt1
            | SocResetReason::CoreRtcWdt
            | SocResetReason::Cpu0Mwdt0
            | SocResetReason::Cpu0Mwdt1
            | SocResetReason::Cpu0RtcWdt
            | SocResetReason::SysRtcWdt
            | SocResetReason::SysSuperWdt,
        ) => ResetReason::Watchdog,
        Some(SocResetReason::SysBrownOut) => ResetReason::Brownout,
        _ => ResetReason::Unknown,
    }
}
