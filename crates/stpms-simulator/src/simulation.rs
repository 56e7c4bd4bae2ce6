//! Boot-to-reboot runs of the duty cycle on simulated hardware.
//!
//! Every boot rebuilds the peripherals the way a reset would, revalidates
//! the retained block and runs the duty cycle until it has advertised the
//! requested number of times in total or hits a fatal error. A fatal error
//! reboots in-process with a software reset as the hardware cause.

use std::sync::Arc;

use log::{error, info, warn};

use stpms_core::advertising::AdvertisingData;
use stpms_core::build_info::BuildInfo;
use stpms_core::collaborators::Collaborators;
use stpms_core::fault::{Subsystem, record_fatal};
use stpms_core::sensors::Ilps22qs;
use stpms_core::sensors::registers::{Average, PressureScale};
use stpms_core::signals::IsrFlags;
use stpms_core::transport::I2cTransport;
use stpms_core::{
    BootReport, Config, DutyCycle, Fatal, Reading, ReadingAggregator, ResetReason, RetainedState,
    RetainedStore, State,
};

use crate::chip::{SimulatedChip, TireModel};
use crate::peripherals::{
    Air, HostDelay, HostPower, HostTicks, HostTimer, HostWatchdog, SimulatedBattery,
    SimulatedRadio, TimeScale,
};

/// Fresh coin cell.
const BATTERY_MV: u16 = 3050;

/// Samples the chip averages per conversion.
const SENSOR_AVERAGE: Average = Average::X16;

/// Failures injected into the simulated hardware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// Broadcasts the radio rejects before it starts working, across boots.
    pub radio_failures: u32,
    pub sensor_absent: bool,
    pub sensor_never_ready: bool,
    pub temperature_nack: bool,
    pub adc_dead: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SimulationOptions<'a> {
    pub config: Config<'a>,
    pub build: BuildInfo<'a>,
    /// Advertising cycles to run, counted over all boots.
    pub cycles: u32,
    /// Host seconds per simulated second for timers and airtime.
    pub time_scale: f64,
    /// Reason reported by the "hardware" on the first boot.
    pub hardware_cause: ResetReason,
    /// Stops rebooting after this many boots.
    pub max_boots: u32,
    pub faults: Faults,
}

#[derive(Debug, Default)]
pub struct SimulationReport {
    pub boots: Vec<BootReport>,
    pub fatals: Vec<Fatal>,
    /// The reading of every completed cycle, in order.
    pub readings: Vec<Reading>,
    /// Frames that made it on air.
    pub frames: Vec<AdvertisingData>,
    pub cycles: u32,
}

/// Runs the beacon on `retained` until `options.cycles` cycles complete or
/// `options.max_boots` boots are used up.
pub fn run(options: &SimulationOptions<'_>, retained: &mut RetainedState) -> SimulationReport {
    let flags = Arc::new(IsrFlags::new());
    let air = Air::default();
    let scale = TimeScale::new(options.time_scale);
    let config = options.config;

    let mut report = SimulationReport::default();
    let mut radio_failures = options.faults.radio_failures;
    let mut hardware_cause = options.hardware_cause;
    let mut model = TireModel::new(config.measure_period_secs);

    while report.cycles < options.cycles && (report.boots.len() as u32) < options.max_boots {
        flags.reset();

        let mut aggregator = ReadingAggregator::boot(
            RetainedStore::new(retained),
            hardware_cause,
            &options.build,
            &config,
        );
        let boot = *aggregator.boot_report();
        info!(
            "Boot {}: reason {:?}, reset count {}{}",
            report.boots.len() + 1,
            boot.reason,
            boot.reset_count,
            if boot.fresh { ", retained block reinitialized" } else { "" }
        );
        report.boots.push(boot);
        hardware_cause = ResetReason::SoftReset;

        // ---- Sensor bring-up ------------------------------------------------
        let mut chip = SimulatedChip::new(model);
        if options.faults.sensor_absent {
            chip = chip.absent();
        }
        if options.faults.sensor_never_ready {
            chip = chip.never_ready();
        }
        if options.faults.temperature_nack {
            chip = chip.temperature_nack();
        }
        let mut sensor = Ilps22qs::new(I2cTransport::new(chip))
            .with_delay(HostDelay)
            .with_tick_source(HostTicks::new());
        if let Err(e) = sensor.start_one_shot_mode(None, PressureScale::High, SENSOR_AVERAGE) {
            error!("Sensor bring-up failed: {}", e);
            let fatal = Fatal::SubsystemInit(Subsystem::Sensor);
            record_fatal(aggregator.retained_mut(), fatal);
            report.fatals.push(fatal);
            continue;
        }

        // ---- Remaining peripherals -----------------------------------------
        let mut battery = SimulatedBattery::new(Arc::clone(&flags), BATTERY_MV);
        if options.faults.adc_dead {
            battery = battery.dead();
        }
        let radio = SimulatedRadio::new(Arc::clone(&flags), scale, Arc::clone(&air), &config)
            .failing(radio_failures);

        let hw = Collaborators {
            sensor,
            battery,
            radio,
            timer: HostTimer::new(Arc::clone(&flags), scale),
            watchdog: HostWatchdog::new(config.watchdog_timeout_secs, scale),
            power: HostPower::new(Arc::clone(&flags)),
            delay: HostDelay,
        };
        let mut duty_cycle = DutyCycle::new(config, aggregator, hw);

        // ---- Duty cycle -----------------------------------------------------
        let mut state = duty_cycle.state();
        while report.cycles < options.cycles {
            match duty_cycle.tick() {
                Ok(next) => {
                    if state == State::Advertise && next == State::Sleep {
                        let reading = *duty_cycle.aggregator().reading();
                        info!(
                            "Cycle {}: {} mbar, {} cC, flags {:#04x}",
                            report.cycles + 1,
                            reading.pressure,
                            reading.temperature,
                            reading.error_flags.bits()
                        );
                        report.readings.push(reading);
                        report.cycles += 1;
                    }
                    state = next;
                }
                Err(fatal) => {
                    warn!("Rebooting after {}", fatal);
                    report.fatals.push(fatal);
                    break;
                }
            }
        }

        let hw = duty_cycle.collaborators();
        radio_failures = hw.radio.failures_left();
        model = hw.sensor.transport().bus().model();
    }

    if let Ok(mut frames) = air.lock() {
        report.frames = std::mem::take(&mut *frames);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retained_file;
    use stpms_core::advertising::find_manufacturer_data;
    use stpms_core::build_info::AppIdentity;
    use stpms_core::reading::PAYLOAD_LEN;
    use stpms_core::ErrorFlags;

    const BUILD: BuildInfo<'static> = BuildInfo {
        app: AppIdentity::Name("stpms-test"),
        version: "v1.4.2",
        hardware_revision: "host",
        flags: "test",
    };

    fn options(cycles: u32) -> SimulationOptions<'static> {
        let mut config = Config::DEFAULT;
        config.measure_period_secs = 5;
        SimulationOptions {
            config,
            build: BUILD,
            cycles,
            time_scale: 0.001,
            hardware_cause: ResetReason::Powerup,
            max_boots: 4,
            faults: Faults::default(),
        }
    }

    #[test]
    fn fresh_power_up_broadcasts_measurements() {
        let mut retained = retained_file::power_cycled();
        let report = run(&options(3), &mut retained);

        assert_eq!(report.cycles, 3);
        assert_eq!(report.boots.len(), 1);
        assert!(report.boots[0].fresh);
        assert_eq!(report.boots[0].reason, ResetReason::Powerup);
        assert!(report.fatals.is_empty());
        assert_eq!(report.frames.len(), 3);

        for reading in &report.readings {
            assert!(reading.error_flags.is_empty(), "{:?}", reading.error_flags);
            assert!((3000..3400).contains(&reading.pressure), "{}", reading.pressure);
            assert!(reading.voltage > 0);
            assert_eq!(reading.reset_reason, ResetReason::Powerup);
            assert_eq!(reading.firmware_version.to_string(), "v1.4.2");
        }

        assert!(retained.is_initialized());
        assert_eq!(retained.measure_count, 3);
        assert_eq!(retained.working_seconds, 15);
    }

    #[test]
    fn frames_carry_the_advertised_reading() {
        let mut retained = retained_file::power_cycled();
        let report = run(&options(2), &mut retained);

        for (frame, reading) in report.frames.iter().zip(&report.readings) {
            let (company, data) = find_manufacturer_data(&frame.advertisement).unwrap();
            assert_eq!(company, Config::DEFAULT.company_id);
            assert_eq!(data.len(), PAYLOAD_LEN);
            assert_eq!(Reading::decode(data), Ok(*reading));
        }
    }

    #[test]
    fn restart_keeps_retained_values() {
        let mut retained = retained_file::power_cycled();
        let first = run(&options(1), &mut retained);
        let measured = first.readings[0];
        assert_eq!(retained.last_pressure, measured.pressure);

        let mut restart = options(1);
        restart.hardware_cause = ResetReason::SoftReset;
        let second = run(&restart, &mut retained);

        let boot = second.boots[0];
        assert!(!boot.fresh);
        assert_eq!(boot.reason, ResetReason::SoftReset);
        assert_eq!(boot.reset_count, 1);
        assert_eq!(second.readings[0].reset_count, 1);
        assert_eq!(retained.measure_count, 2);
    }

    #[test]
    fn repeated_advertise_failure_reboots() {
        let mut opts = options(5);
        opts.faults.radio_failures = 4;
        let mut retained = retained_file::power_cycled();
        let report = run(&opts, &mut retained);

        assert_eq!(
            report.fatals,
            vec![Fatal::RepeatedAdvertiseFailure { attempts: 4 }]
        );
        assert_eq!(report.boots.len(), 2);
        assert_eq!(report.boots[1].reason, ResetReason::AdvFail);
        assert_eq!(report.boots[1].reset_count, 1);

        // Three failed cycles before the reboot, two good ones after
        assert_eq!(report.cycles, 5);
        assert_eq!(report.frames.len(), 2);
        let retry: Vec<bool> = report
            .readings
            .iter()
            .map(|r| r.error_flags.contains(ErrorFlags::ADV_RETRY))
            .collect();
        assert_eq!(retry, [false, true, true, false, false]);
        assert_eq!(report.readings[3].reset_reason, ResetReason::AdvFail);
    }

    #[test]
    fn absent_sensor_keeps_rebooting() {
        let mut opts = options(1);
        opts.faults.sensor_absent = true;
        let mut retained = retained_file::power_cycled();
        let report = run(&opts, &mut retained);

        assert_eq!(report.cycles, 0);
        assert_eq!(report.boots.len(), 4);
        assert!(
            report
                .fatals
                .iter()
                .all(|f| *f == Fatal::SubsystemInit(Subsystem::Sensor))
        );
        assert_eq!(report.boots[1].reason, ResetReason::SensorInit);
        assert_eq!(report.boots[3].reset_count, 3);
        assert!(report.frames.is_empty());
    }

    #[test]
    fn stuck_sensor_flags_status_and_zeroes_reading() {
        let mut opts = options(2);
        opts.faults.sensor_never_ready = true;
        let mut retained = retained_file::power_cycled();
        let report = run(&opts, &mut retained);

        assert_eq!(report.cycles, 2);
        for reading in &report.readings {
            assert!(reading.error_flags.contains(ErrorFlags::MEASURE_STATUS));
            assert_eq!(reading.pressure, 0);
            assert_eq!(reading.temperature, 0);
        }
    }

    #[test]
    fn temperature_nack_reports_partial_data() {
        let mut opts = options(1);
        opts.faults.temperature_nack = true;
        let mut retained = retained_file::power_cycled();
        let report = run(&opts, &mut retained);

        let reading = report.readings[0];
        assert!(
            reading
                .error_flags
                .contains(ErrorFlags::MEASURE_FAIL | ErrorFlags::PARTIAL_DATA)
        );
        assert!(reading.pressure > 0);
        assert_eq!(reading.temperature, 0);
        assert_eq!(retained.last_pressure, reading.pressure);
    }

    #[test]
    fn dead_adc_times_out_after_power_up() {
        let mut opts = options(1);
        opts.faults.adc_dead = true;
        let mut retained = retained_file::power_cycled();
        let report = run(&opts, &mut retained);

        let reading = report.readings[0];
        assert!(reading.error_flags.contains(ErrorFlags::VOLTAGE_TIMEOUT));
        assert_eq!(reading.voltage, 0);
        assert!(reading.pressure > 0);
    }

    #[test]
    fn scan_response_carries_device_name() {
        let mut opts = options(1);
        opts.config.device_name = "Tire-FL";
        let mut retained = retained_file::power_cycled();
        let report = run(&opts, &mut retained);

        let scan_response = &report.frames[0].scan_response;
        assert_eq!(scan_response[0] as usize, "Tire-FL".len() + 1);
        assert_eq!(scan_response[1], 0x09);
        assert_eq!(&scan_response[2..], b"Tire-FL");
    }

    #[test]
    fn retained_file_carries_state_between_runs() {
        let path = std::env::temp_dir().join(format!("stpms-sim-{}.bin", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut retained = retained_file::load(&path).unwrap();
        run(&options(2), &mut retained);
        retained_file::save(&path, &retained).unwrap();

        let mut reloaded = retained_file::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(reloaded, retained);

        let mut restart = options(1);
        restart.hardware_cause = ResetReason::SoftReset;
        let report = run(&restart, &mut reloaded);
        assert_eq!(report.boots[0].reset_count, 1);
        assert_eq!(reloaded.measure_count, 3);
    }
}
