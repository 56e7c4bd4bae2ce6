//! Readings of a run written to disk with postcard, for offline decoding.

use std::fs;
use std::io;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use stpms_core::{Config, Reading};

/// A run as a receiver would have seen it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Capture<'a> {
    #[serde(borrow)]
    pub config: Config<'a>,
    pub readings: Vec<Reading>,
}

pub fn encode(capture: &Capture<'_>) -> Result<Vec<u8>, postcard::Error> {
    postcard::to_stdvec(capture)
}

pub fn decode(bytes: &[u8]) -> Result<Capture<'_>, postcard::Error> {
    postcard::from_bytes(bytes)
}

pub fn save(path: &Path, capture: &Capture<'_>) -> io::Result<()> {
    let bytes = encode(capture).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, &bytes)?;
    debug!(
        "{} readings captured to {} ({} bytes)",
        capture.readings.len(),
        path.display(),
        bytes.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{Faults, SimulationOptions, run};
    use crate::retained_file;
    use stpms_core::build_info::{AppIdentity, BuildInfo};
    use stpms_core::{ErrorFlags, ResetReason};

    fn captured_run() -> Capture<'static> {
        let mut config = Config::DEFAULT;
        config.measure_period_secs = 5;
        config.device_name = "Tire-RR";
        let options = SimulationOptions {
            config,
            build: BuildInfo {
                app: AppIdentity::Name("stpms-test"),
                version: "v0.3.1",
                hardware_revision: "host",
                flags: "",
            },
            cycles: 2,
            time_scale: 0.001,
            hardware_cause: ResetReason::Powerup,
            max_boots: 2,
            faults: Faults {
                adc_dead: true,
                ..Faults::default()
            },
        };
        let mut retained = retained_file::power_cycled();
        let report = run(&options, &mut retained);
        Capture {
            config,
            readings: report.readings,
        }
    }

    #[test]
    fn saved_capture_decodes_to_the_run() {
        let capture = captured_run();
        let path = std::env::temp_dir().join(format!("stpms-capture-{}.bin", std::process::id()));
        save(&path, &capture).unwrap();
        let bytes = fs::read(&path).unwrap();
        let _ = fs::remove_file(&path);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.config.device_name, "Tire-RR");
        assert_eq!(decoded.readings.len(), 2);
        assert_eq!(decoded, capture);
        assert!(
            decoded.readings[0]
                .error_flags
                .contains(ErrorFlags::VOLTAGE_TIMEOUT)
        );
        assert_eq!(decoded.readings[0].reset_reason, ResetReason::Powerup);
    }

    #[test]
    fn truncated_capture_is_rejected() {
        let bytes = encode(&captured_run()).unwrap();
        assert!(decode(&bytes[..bytes.len() / 2]).is_err());
    }
}
