//! Host stand-ins for the beacon's peripherals.
//!
//! Interrupts are modelled by threads that sleep for the hardware's latency,
//! scaled by the simulation's time scale, and then raise the matching
//! [`IsrFlags`] signal. Dropping a peripheral cancels whatever it still has
//! in flight, so nothing leaks into the next boot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use stpms_core::advertising::AdvertisingData;
use stpms_core::battery::BatteryMonitor;
use stpms_core::collaborators::{PowerControl, Radio, RadioError, WakeTimer, Watchdog};
use stpms_core::config::Config;
use stpms_core::sensors::TickSource;
use stpms_core::signals::IsrFlags;

/// Longest a single wait-for-event blocks before returning spuriously.
const EVENT_SLICE: Duration = Duration::from_millis(5);

/// ADC conversion time on the target.
const ADC_CONVERSION: Duration = Duration::from_micros(500);

/// Frames seen by a listener in range, oldest first.
pub type Air = Arc<Mutex<Vec<AdvertisingData>>>;

// ---------------------------------------------------------------------------
// Deferred interrupts
// ---------------------------------------------------------------------------

/// Scales durations of simulated hardware into host time.
#[derive(Debug, Clone, Copy)]
pub struct TimeScale(f64);

impl TimeScale {
    /// `factor` host seconds per simulated second.
    pub fn new(factor: f64) -> Self {
        Self(factor.max(0.0))
    }

    pub fn apply(self, simulated: Duration) -> Duration {
        simulated.mul_f64(self.0)
    }
}

/// Set on drop; pending interrupts check it before they fire.
#[derive(Debug, Default)]
struct Cancel(Arc<AtomicBool>);

impl Cancel {
    /// Runs `isr` after `delay` on its own thread unless cancelled first.
    fn after(&self, delay: Duration, isr: impl FnOnce() + Send + 'static) {
        let cancelled = Arc::clone(&self.0);
        thread::spawn(move || {
            thread::sleep(delay);
            if !cancelled.load(Ordering::Acquire) {
                isr();
            }
        });
    }

    /// Cancels everything pending and starts over.
    fn renew(&mut self) {
        self.0.store(true, Ordering::Release);
        self.0 = Arc::default();
    }
}

impl Drop for Cancel {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Wake timer and sleep
// ---------------------------------------------------------------------------

pub struct HostTimer {
    flags: Arc<IsrFlags>,
    scale: TimeScale,
    pending: Cancel,
    armed: u32,
}

impl HostTimer {
    pub fn new(flags: Arc<IsrFlags>, scale: TimeScale) -> Self {
        Self {
            flags,
            scale,
            pending: Cancel::default(),
            armed: 0,
        }
    }

    /// Times the timer has been armed.
    pub fn armed(&self) -> u32 {
        self.armed
    }
}

impl WakeTimer for HostTimer {
    fn arm(&mut self, period_secs: u16) {
        self.pending.renew();
        self.armed += 1;
        let flags = Arc::clone(&self.flags);
        let delay = self.scale.apply(Duration::from_secs(u64::from(period_secs)));
        debug!("Wake timer armed for {} s ({:?} host)", period_secs, delay);
        self.pending.after(delay, move || flags.signal_wake());
    }

    fn consume_wake_flag(&mut self) -> bool {
        self.flags.take_wake()
    }
}

/// Blocks until the wake flag is raised or a short slice has passed.
pub struct HostPower {
    flags: Arc<IsrFlags>,
    waits: u32,
}

impl HostPower {
    pub fn new(flags: Arc<IsrFlags>) -> Self {
        Self { flags, waits: 0 }
    }

    pub fn waits(&self) -> u32 {
        self.waits
    }
}

impl PowerControl for HostPower {
    fn wait_for_event(&mut self) {
        self.waits += 1;
        let start = Instant::now();
        while !self.flags.wake_pending() && start.elapsed() < EVENT_SLICE {
            thread::sleep(Duration::from_micros(100));
        }
    }
}

// ---------------------------------------------------------------------------
// Radio
// ---------------------------------------------------------------------------

/// Broadcasts into an [`Air`] and reports completion after the burst's airtime.
pub struct SimulatedRadio {
    flags: Arc<IsrFlags>,
    scale: TimeScale,
    air: Air,
    device_name: String,
    tx_power_dbm: i8,
    company_id: u16,
    airtime: Duration,
    failures_left: u32,
    pending: Cancel,
}

impl SimulatedRadio {
    pub fn new(flags: Arc<IsrFlags>, scale: TimeScale, air: Air, config: &Config<'_>) -> Self {
        // Interval is in 0.625 ms units
        let airtime_us =
            u64::from(config.adv_event_count) * u64::from(config.adv_interval_units) * 625;
        Self {
            flags,
            scale,
            air,
            device_name: config.device_name.to_owned(),
            tx_power_dbm: config.adv_tx_power_dbm,
            company_id: config.company_id,
            airtime: Duration::from_micros(airtime_us),
            failures_left: 0,
            pending: Cancel::default(),
        }
    }

    /// Rejects the next `count` broadcasts.
    pub fn failing(mut self, count: u32) -> Self {
        self.failures_left = count;
        self
    }

    pub fn failures_left(&self) -> u32 {
        self.failures_left
    }
}

impl Radio for SimulatedRadio {
    fn start_advertising(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            warn!("Radio rejecting broadcast ({} more)", self.failures_left);
            return Err(RadioError::Rejected);
        }

        let frame =
            AdvertisingData::new(&self.device_name, self.tx_power_dbm, self.company_id, payload)?;
        self.air
            .lock()
            .map_err(|_| RadioError::Busy)?
            .push(frame);

        self.pending.renew();
        let flags = Arc::clone(&self.flags);
        self.pending
            .after(self.scale.apply(self.airtime), move || {
                flags.signal_advertise_done()
            });
        Ok(())
    }

    fn is_advertise_complete(&mut self) -> bool {
        self.flags.take_advertise_done()
    }
}

// ---------------------------------------------------------------------------
// Battery
// ---------------------------------------------------------------------------

/// Coin cell that loses a little voltage with every conversion.
pub struct SimulatedBattery {
    flags: Arc<IsrFlags>,
    millivolts: f64,
    drain_per_sample_mv: f64,
    dead: bool,
    pending: Cancel,
}

impl SimulatedBattery {
    pub fn new(flags: Arc<IsrFlags>, millivolts: u16) -> Self {
        Self {
            flags,
            millivolts: f64::from(millivolts),
            drain_per_sample_mv: 2.5,
            dead: false,
            pending: Cancel::default(),
        }
    }

    /// Conversions are started but never complete.
    pub fn dead(mut self) -> Self {
        self.dead = true;
        self
    }

    pub fn millivolts(&self) -> u16 {
        self.millivolts as u16
    }
}

impl BatteryMonitor for SimulatedBattery {
    fn start_measurement(&mut self) {
        if self.dead {
            debug!("ADC conversion started on a dead converter");
            return;
        }
        self.millivolts = (self.millivolts - self.drain_per_sample_mv).max(0.0);
        let millivolts = self.millivolts as u16;
        let flags = Arc::clone(&self.flags);
        self.pending.renew();
        self.pending
            .after(ADC_CONVERSION, move || flags.signal_adc(millivolts));
    }

    fn poll_millivolts(&mut self) -> Option<u16> {
        self.flags.take_adc()
    }
}

// ---------------------------------------------------------------------------
// Watchdog, delay, ticks
// ---------------------------------------------------------------------------

/// Warns where the hardware watchdog would have reset the chip.
pub struct HostWatchdog {
    timeout: Duration,
    last_feed: Instant,
    feeds: u32,
}

impl HostWatchdog {
    pub fn new(timeout_secs: u16, scale: TimeScale) -> Self {
        info!("Watchdog armed, {} s", timeout_secs);
        Self {
            timeout: scale.apply(Duration::from_secs(u64::from(timeout_secs))),
            last_feed: Instant::now(),
            feeds: 0,
        }
    }

    pub fn feeds(&self) -> u32 {
        self.feeds
    }
}

impl Watchdog for HostWatchdog {
    fn feed(&mut self) {
        let since = self.last_feed.elapsed();
        if since > self.timeout {
            warn!("Watchdog fed after {:?}, target would have reset", since);
        }
        self.last_feed = Instant::now();
        self.feeds += 1;
    }
}

/// Real-time delay; poll intervals are not scaled.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostDelay;

impl DelayNs for HostDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

pub struct HostTicks(Instant);

impl HostTicks {
    pub fn new() -> Self {
        Self(Instant::now())
    }
}

impl Default for HostTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for HostTicks {
    fn now_ms(&self) -> u32 {
        self.0.elapsed().as_millis() as u32
    }
}
