//! Desktop simulator for the stpms tire pressure beacon.
//!
//! Runs the duty cycle on simulated hardware and logs every reading and
//! frame. The retained block is kept in a file, so consecutive runs behave
//! like resets of one device; `--power-cycle` discards it.
//!
//! # Options
//!
//! | Option                | Effect                                         |
//! |-----------------------|------------------------------------------------|
//! | `--cycles N`          | Advertising cycles to run (default 5)          |
//! | `--time-scale F`      | Host seconds per simulated second (0.01)       |
//! | `--period S`          | Measure period in seconds                      |
//! | `--retained PATH`     | Retained block file                            |
//! | `--power-cycle`       | Start from erased retained RAM                 |
//! | `--debug`             | Measure battery voltage every cycle            |
//! | `--radio-failures N`  | Reject the first N broadcasts                  |
//! | `--sensor-absent`     | No sensor on the bus                           |
//! | `--sensor-stuck`      | Sensor never reports data ready                |
//! | `--temperature-nack`  | Temperature reads are not acknowledged         |
//! | `--adc-dead`          | Battery conversions never complete             |
//! | `--capture PATH`      | Write the readings to a postcard capture file  |

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use log::{error, info};

use stpms_core::advertising::find_manufacturer_data;
use stpms_core::build_info::{AppIdentity, BuildInfo};
use stpms_core::reading::decode_voltage;
use stpms_core::{Config, ResetReason};
use stpms_simulator::capture::{self, Capture};
use stpms_simulator::{Faults, SimulationOptions, retained_file, run};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_CYCLES: u32 = 5;
const DEFAULT_TIME_SCALE: f64 = 0.01;
const DEFAULT_RETAINED_PATH: &str = "stpms-retained.bin";

/// Boots allowed per run before giving up on a device that keeps failing.
const MAX_BOOTS: u32 = 8;

const BUILD: BuildInfo<'static> = BuildInfo {
    app: AppIdentity::Tagged {
        tag: "stpms",
        variant: "sim",
    },
    version: env!("CARGO_PKG_VERSION"),
    hardware_revision: "host",
    flags: "",
};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

struct Args {
    cycles: u32,
    time_scale: f64,
    period: Option<u16>,
    retained: PathBuf,
    power_cycle: bool,
    debug: bool,
    capture: Option<PathBuf>,
    faults: Faults,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args {
        cycles: DEFAULT_CYCLES,
        time_scale: DEFAULT_TIME_SCALE,
        period: None,
        retained: PathBuf::from(DEFAULT_RETAINED_PATH),
        power_cycle: false,
        debug: false,
        capture: None,
        faults: Faults::default(),
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--cycles" => parsed.cycles = value(&arg, args.next())?,
            "--time-scale" => parsed.time_scale = value(&arg, args.next())?,
            "--period" => parsed.period = Some(value(&arg, args.next())?),
            "--retained" => parsed.retained = value(&arg, args.next())?,
            "--power-cycle" => parsed.power_cycle = true,
            "--debug" => parsed.debug = true,
            "--radio-failures" => parsed.faults.radio_failures = value(&arg, args.next())?,
            "--sensor-absent" => parsed.faults.sensor_absent = true,
            "--sensor-stuck" => parsed.faults.sensor_never_ready = true,
            "--temperature-nack" => parsed.faults.temperature_nack = true,
            "--adc-dead" => parsed.faults.adc_dead = true,
            "--capture" => parsed.capture = Some(value(&arg, args.next())?),
            other => return Err(format!("unknown option {other}")),
        }
    }
    Ok(parsed)
}

fn value<T: FromStr>(option: &str, raw: Option<String>) -> Result<T, String> {
    let raw = raw.ok_or_else(|| format!("{option} needs a value"))?;
    raw.parse()
        .map_err(|_| format!("invalid value {raw:?} for {option}"))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut config = Config::DEFAULT;
    if let Some(period) = args.period {
        config.measure_period_secs = period;
    }
    config.debug_build = args.debug;
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let (mut retained, hardware_cause) = if args.power_cycle {
        (retained_file::power_cycled(), ResetReason::Powerup)
    } else {
        match retained_file::load(&args.retained) {
            Ok(state) => (state, ResetReason::SoftReset),
            Err(e) => {
                error!("Reading {}: {}", args.retained.display(), e);
                return ExitCode::FAILURE;
            }
        }
    };

    info!("Starting {} simulator", BUILD);
    let options = SimulationOptions {
        config,
        build: BUILD,
        cycles: args.cycles,
        time_scale: args.time_scale,
        hardware_cause,
        max_boots: MAX_BOOTS,
        faults: args.faults,
    };
    let report = run(&options, &mut retained);

    for frame in &report.frames {
        if let Some((company, data)) = find_manufacturer_data(&frame.advertisement) {
            info!("Frame {:#06x}: {:02x?}", company, data);
        }
    }
    if let Some(last) = report.readings.last() {
        info!(
            "Last reading: {} mbar, {} cC, {} mV, uptime {} h, reset {:?} x{}",
            last.pressure,
            last.temperature,
            decode_voltage(last.voltage),
            last.uptime_hours,
            last.reset_reason,
            last.reset_count
        );
    }
    info!(
        "{} cycles over {} boots, {} fatal errors",
        report.cycles,
        report.boots.len(),
        report.fatals.len()
    );

    if let Err(e) = retained_file::save(&args.retained, &retained) {
        error!("Writing {}: {}", args.retained.display(), e);
        return ExitCode::FAILURE;
    }

    if let Some(path) = &args.capture {
        let captured = Capture {
            config,
            readings: report.readings.clone(),
        };
        if let Err(e) = capture::save(path, &captured) {
            error!("Writing {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
        info!("Captured {} readings to {}", captured.readings.len(), path.display());
    }

    if report.cycles < args.cycles {
        error!("Gave up after {} boots", report.boots.len());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
