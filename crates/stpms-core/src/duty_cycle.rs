//! Measure, Advertise, Sleep.
//!
//! One tick runs one state and returns the next. Every wait inside a state
//! is bounded by a poll budget from [`Config`]; running out of budget is
//! recorded as an error flag, or as an advertising failure, and never blocks
//! the cycle. The only exit is a [`Fatal`] error, which records its reset
//! reason in the retained block before it is returned.

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::battery::{BatteryMonitor, measure_millivolts};
use crate::collaborators::{
    Collaborators, PowerControl, Radio, RadioError, SystemReset, WakeTimer, Watchdog,
};
use crate::config::Config;
use crate::fault::{Fatal, record_fatal};
use crate::reading::{ErrorFlags, ReadingAggregator};
use crate::retained::ResetReason;
use crate::sensors::{PressureSensor, SensorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Measure,
    Advertise,
    Sleep,
}

pub struct DutyCycle<'a, S, B, R, T, W, P, D> {
    hw: Collaborators<S, B, R, T, W, P, D>,
    aggregator: ReadingAggregator<'a>,
    config: Config<'a>,
    state: State,
    /// Flags raised during boot and repeated in every reading.
    boot_flags: ErrorFlags,
    timer_armed: bool,
    advertise_failures: u8,
    powerup_voltage_cycles: u8,
    fatal: Option<Fatal>,
}

impl<'a, S, B, R, T, W, P, D> DutyCycle<'a, S, B, R, T, W, P, D>
where
    S: PressureSensor,
    B: BatteryMonitor,
    R: Radio,
    T: WakeTimer,
    W: Watchdog,
    P: PowerControl,
    D: DelayNs,
{
    pub fn new(
        config: Config<'a>,
        aggregator: ReadingAggregator<'a>,
        hw: Collaborators<S, B, R, T, W, P, D>,
    ) -> Self {
        let powerup_voltage_cycles = if aggregator.boot_report().reason == ResetReason::Powerup {
            config.powerup_voltage_cycles
        } else {
            0
        };

        Self {
            hw,
            aggregator,
            config,
            state: State::Measure,
            boot_flags: ErrorFlags::NONE,
            timer_armed: false,
            advertise_failures: 0,
            powerup_voltage_cycles,
            fatal: None,
        }
    }

    /// Flags that describe the boot rather than a cycle, e.g. [`ErrorFlags::ADC_INIT`].
    pub fn with_boot_flags(mut self, flags: ErrorFlags) -> Self {
        self.boot_flags = flags;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn aggregator(&self) -> &ReadingAggregator<'a> {
        &self.aggregator
    }

    pub fn aggregator_mut(&mut self) -> &mut ReadingAggregator<'a> {
        &mut self.aggregator
    }

    pub fn collaborators(&self) -> &Collaborators<S, B, R, T, W, P, D> {
        &self.hw
    }

    pub fn collaborators_mut(&mut self) -> &mut Collaborators<S, B, R, T, W, P, D> {
        &mut self.hw
    }

    pub fn consecutive_advertise_failures(&self) -> u8 {
        self.advertise_failures
    }

    /// Runs the current state once.
    ///
    /// After a fatal error every further call returns the same error without
    /// touching the hardware.
    pub fn tick(&mut self) -> Result<State, Fatal> {
        if let Some(fatal) = self.fatal {
            return Err(fatal);
        }

        let next = match self.state {
            State::Measure => Ok(self.measure()),
            State::Advertise => self.advertise(),
            State::Sleep => Ok(self.sleep()),
        };

        match next {
            Ok(next) => {
                if next != self.state {
                    debug!("{:?} -> {:?}", self.state, next);
                }
                self.state = next;
                Ok(next)
            }
            Err(fatal) => {
                record_fatal(self.aggregator.retained_mut(), fatal);
                self.fatal = Some(fatal);
                Err(fatal)
            }
        }
    }

    /// Ticks forever. A fatal error resets the system.
    pub fn run(mut self, reset: &mut impl SystemReset) -> ! {
        info!(
            "Duty cycle running, period {} s",
            self.config.measure_period_secs
        );
        loop {
            if let Err(fatal) = self.tick() {
                reset.reboot(fatal.reset_reason());
            }
        }
    }

    fn measure(&mut self) -> State {
        self.aggregator.clear_error_flags();
        self.aggregator.set_error_flag(self.boot_flags);
        if self.advertise_failures > 0 {
            self.aggregator.set_error_flag(ErrorFlags::ADV_RETRY);
        }

        let hour_rolled = self
            .aggregator
            .retained_mut()
            .add_working_seconds(self.config.measure_period_secs);
        if hour_rolled {
            self.aggregator.increase_uptime_hour();
            info!("Uptime {} h", self.aggregator.reading().uptime_hours);
        }
        self.aggregator.retained_mut().increment_measure_count();

        if self.voltage_due(hour_rolled) {
            self.measure_voltage();
        }
        self.measure_pressure();

        State::Advertise
    }

    fn voltage_due(&mut self, hour_rolled: bool) -> bool {
        if self.boot_flags.contains(ErrorFlags::ADC_INIT) {
            return false;
        }
        let after_powerup = self.powerup_voltage_cycles > 0;
        self.powerup_voltage_cycles = self.powerup_voltage_cycles.saturating_sub(1);
        self.config.debug_build || after_powerup || hour_rolled
    }

    fn measure_voltage(&mut self) {
        let reading = measure_millivolts(
            &mut self.hw.battery,
            &mut self.hw.delay,
            self.config.adc_ready_polls,
            self.config.poll_interval_ms,
        );
        match reading {
            Some(millivolts) => {
                debug!("Battery {} mV", millivolts);
                self.aggregator.set_voltage(millivolts);
            }
            None => {
                warn!(
                    "Battery voltage not ready after {} polls",
                    self.config.adc_ready_polls
                );
                self.aggregator.set_error_flag(ErrorFlags::VOLTAGE_TIMEOUT);
            }
        }
    }

    fn measure_pressure(&mut self) {
        let polls = self.config.sensor_ready_polls;
        let sensor = &mut self.hw.sensor;
        if let Err(e) = sensor.trigger().and_then(|()| sensor.wait_ready(polls)) {
            warn!("Pressure measurement failed: {}", e);
            let flag = match e {
                SensorError::Timeout => ErrorFlags::MEASURE_STATUS,
                _ => ErrorFlags::MEASURE_FAIL,
            };
            self.aggregator.mark_measurement_failed(flag);
            return;
        }

        let pressure = self.hw.sensor.read_pressure();
        let temperature = self.hw.sensor.read_temperature();
        match (pressure, temperature) {
            (Ok(pressure), Ok(temperature)) => {
                debug!("Measured {} mbar, {} cC", pressure, temperature);
                self.aggregator.set_pressure(pressure);
                self.aggregator.set_temperature(temperature);
            }
            (Ok(pressure), Err(e)) => {
                warn!("Temperature read failed: {}", e);
                self.aggregator
                    .mark_measurement_failed(ErrorFlags::MEASURE_FAIL | ErrorFlags::PARTIAL_DATA);
                self.aggregator.set_pressure(pressure);
            }
            (Err(e), _) => {
                warn!("Pressure read failed: {}", e);
                self.aggregator
                    .mark_measurement_failed(ErrorFlags::MEASURE_FAIL);
            }
        }
    }

    fn advertise(&mut self) -> Result<State, Fatal> {
        let payload = self.aggregator.encode();
        let result = self
            .hw
            .radio
            .start_advertising(&payload)
            .and_then(|()| self.await_advertise_complete());

        match result {
            Ok(()) => {
                if self.advertise_failures > 0 {
                    info!(
                        "Advertising recovered after {} failures",
                        self.advertise_failures
                    );
                }
                self.advertise_failures = 0;
            }
            Err(e) => {
                self.advertise_failures = self.advertise_failures.saturating_add(1);
                warn!(
                    "Advertising failed: {} ({} in a row)",
                    e, self.advertise_failures
                );
                if self.advertise_failures > self.config.adv_fail_threshold {
                    return Err(Fatal::RepeatedAdvertiseFailure {
                        attempts: self.advertise_failures,
                    });
                }
            }
        }

        self.hw.watchdog.feed();
        Ok(State::Sleep)
    }

    fn await_advertise_complete(&mut self) -> Result<(), RadioError> {
        for _ in 0..self.config.adv_complete_polls {
            if self.hw.radio.is_advertise_complete() {
                return Ok(());
            }
            self.hw.delay.delay_ms(self.config.poll_interval_ms);
        }
        Err(RadioError::Timeout)
    }

    fn sleep(&mut self) -> State {
        if !self.timer_armed {
            self.hw.timer.arm(self.config.measure_period_secs);
            self.timer_armed = true;
        }

        self.hw.power.wait_for_event();

        if self.hw.timer.consume_wake_flag() {
            self.timer_armed = false;
            State::Measure
        } else {
            State::Sleep
        }
    }
}
